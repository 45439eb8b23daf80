//! Vultr provider implementation

use crate::client::{CreateInstanceRequest, VULTR_API_BASE, VultrClient, VultrInstance};
use async_trait::async_trait;
use machine_cloud::{
    AddressType, CloudProviderError, Instance, InstanceStatus, MachineErrorReason, MetricsLabels,
    Provider, ProviderData, Result, TerminalError, decode_provider_config,
};
use machine_config::ConfigVarResolver;
use machine_core::{ConfigVarBool, ConfigVarString, Machine, MachineSpec, OperatingSystem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment variable consulted when `apiKey` is empty
pub const API_KEY_ENV: &str = "VULTR_API_KEY";

/// `cloudProviderSpec` for `cloudProvider: vultr`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VultrProviderSpec {
    #[serde(default)]
    pub api_key: ConfigVarString,
    #[serde(default)]
    pub region: ConfigVarString,
    #[serde(default)]
    pub plan: ConfigVarString,
    /// Numeric OS id; looked up from `operatingSystem` when empty
    #[serde(default, rename = "osId")]
    pub os_id: ConfigVarString,
    #[serde(default, rename = "enableIPv6")]
    pub enable_ipv6: ConfigVarBool,
    #[serde(default, rename = "vpcId", skip_serializing_if = "Vec::is_empty")]
    pub vpc_ids: Vec<ConfigVarString>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug)]
struct Config {
    api_key: String,
    region: String,
    plan: String,
    os_id: String,
    enable_ipv6: bool,
    vpc_ids: Vec<String>,
    tags: Vec<String>,
    operating_system: OperatingSystem,
}

/// Vultr provider
#[derive(Debug, Clone)]
pub struct VultrProvider {
    resolver: ConfigVarResolver,
    endpoint: String,
}

impl VultrProvider {
    pub fn new(resolver: ConfigVarResolver) -> Self {
        Self::with_endpoint(resolver, VULTR_API_BASE)
    }

    pub fn with_endpoint(resolver: ConfigVarResolver, endpoint: impl Into<String>) -> Self {
        Self {
            resolver,
            endpoint: endpoint.into(),
        }
    }

    fn raw_spec(spec: &MachineSpec) -> Result<VultrProviderSpec> {
        decode_provider_config(spec)?
            .cloud_provider_spec()
            .map_err(|e| {
                TerminalError::invalid_configuration(format!("failed to parse vultr spec: {e}"))
                    .into()
            })
    }

    async fn get_config(&self, spec: &MachineSpec) -> Result<Config> {
        let envelope = decode_provider_config(spec)?;
        let raw = Self::raw_spec(spec)?;
        let r = &self.resolver;

        let mut vpc_ids = Vec::with_capacity(raw.vpc_ids.len());
        for vpc in &raw.vpc_ids {
            vpc_ids.push(r.get_string_value(vpc).await?);
        }

        Ok(Config {
            api_key: r.get_string_value_or_env(&raw.api_key, API_KEY_ENV).await?,
            region: r.get_string_value(&raw.region).await?,
            plan: r.get_string_value(&raw.plan).await?,
            os_id: r.get_string_value(&raw.os_id).await?,
            enable_ipv6: r.get_bool_value(&raw.enable_ipv6).await?,
            vpc_ids,
            tags: raw.tags,
            operating_system: envelope.operating_system,
        })
    }

    fn client(&self, config: &Config) -> VultrClient {
        VultrClient::with_base_url(&config.api_key, &self.endpoint)
    }

    async fn find_instance(&self, client: &VultrClient, uid: &str) -> Result<VultrInstance> {
        client
            .list_instances_by_tag(uid)
            .await?
            .into_iter()
            .next()
            .ok_or(CloudProviderError::InstanceNotFound)
    }

    /// Explicit `osId`, else the first x64 image of the machine's OS family
    async fn resolve_os_id(&self, client: &VultrClient, config: &Config) -> Result<u64> {
        if !config.os_id.is_empty() {
            return config.os_id.parse().map_err(|_| {
                CloudProviderError::terminal(
                    MachineErrorReason::InvalidConfiguration,
                    format!("osId '{}' is not a number", config.os_id),
                )
            });
        }
        let family = os_family(&config.operating_system)?;
        client
            .list_os()
            .await?
            .into_iter()
            .find(|os| os.family == family && os.arch == "x64")
            .map(|os| os.id)
            .ok_or_else(|| {
                CloudProviderError::terminal(
                    MachineErrorReason::InvalidConfiguration,
                    format!("no vultr image found for operating system '{}'", config.operating_system),
                )
            })
    }
}

fn os_family(os: &OperatingSystem) -> Result<&'static str> {
    match os {
        OperatingSystem::Ubuntu => Ok("ubuntu"),
        OperatingSystem::CentOS => Ok("centos"),
        OperatingSystem::RockyLinux => Ok("rockylinux"),
        OperatingSystem::Flatcar => Ok("flatcar"),
        other => Err(CloudProviderError::terminal(
            MachineErrorReason::InvalidConfiguration,
            format!("operating system '{other}' is not supported on vultr"),
        )),
    }
}

fn missing(field: &str) -> CloudProviderError {
    CloudProviderError::terminal(
        MachineErrorReason::InvalidConfiguration,
        format!("{field} is missing"),
    )
}

/// Maps Vultr `status` / `power_status` into the closed status set
pub fn map_status(status: &str, power_status: &str) -> InstanceStatus {
    match (status, power_status) {
        ("pending", _) => InstanceStatus::Creating,
        ("active", "running") => InstanceStatus::Running,
        ("active", "stopped") => InstanceStatus::Stopped,
        ("suspended", _) => InstanceStatus::Paused,
        _ => InstanceStatus::Unknown,
    }
}

/// A Vultr instance as seen by the controller
#[derive(Debug, Clone)]
pub struct VultrServer(VultrInstance);

impl VultrServer {
    pub fn new(instance: VultrInstance) -> Self {
        Self(instance)
    }
}

fn is_unset_ip(ip: &str) -> bool {
    ip.is_empty() || ip == "0.0.0.0" || ip == "::"
}

impl Instance for VultrServer {
    fn name(&self) -> &str {
        &self.0.label
    }

    fn id(&self) -> &str {
        &self.0.id
    }

    fn provider_id(&self) -> String {
        format!("vultr://{}", self.0.id)
    }

    fn addresses(&self) -> HashMap<String, AddressType> {
        let mut addresses = HashMap::new();
        if !is_unset_ip(&self.0.main_ip) {
            addresses.insert(self.0.main_ip.clone(), AddressType::ExternalIP);
        }
        if !is_unset_ip(&self.0.v6_main_ip) {
            addresses.insert(self.0.v6_main_ip.clone(), AddressType::ExternalIP);
        }
        if !is_unset_ip(&self.0.internal_ip) {
            addresses.insert(self.0.internal_ip.clone(), AddressType::InternalIP);
        }
        if !self.0.hostname.is_empty() {
            addresses.insert(self.0.hostname.clone(), AddressType::Hostname);
        }
        addresses
    }

    fn status(&self) -> InstanceStatus {
        map_status(&self.0.status, &self.0.power_status)
    }
}

#[async_trait]
impl Provider for VultrProvider {
    fn add_defaults(&self, spec: MachineSpec) -> Result<MachineSpec> {
        Ok(spec)
    }

    async fn validate(&self, spec: &MachineSpec) -> Result<()> {
        let config = self.get_config(spec).await?;

        if config.api_key.is_empty() {
            return Err(missing("apiKey"));
        }
        if config.region.is_empty() {
            return Err(missing("region"));
        }
        if config.plan.is_empty() {
            return Err(missing("plan"));
        }

        let client = self.client(&config);
        if !client.list_regions().await?.iter().any(|r| r.id == config.region) {
            return Err(CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                format!("region '{}' not found", config.region),
            ));
        }
        let plans = client.list_plans().await?;
        let plan = plans.iter().find(|p| p.id == config.plan).ok_or_else(|| {
            CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                format!("plan '{}' not found", config.plan),
            )
        })?;
        if !plan.locations.is_empty() && !plan.locations.contains(&config.region) {
            return Err(CloudProviderError::terminal(
                MachineErrorReason::InsufficientResources,
                format!("plan '{}' is not available in region '{}'", config.plan, config.region),
            ));
        }
        self.resolve_os_id(&client, &config).await?;
        Ok(())
    }

    async fn get(&self, machine: &Machine, _data: &ProviderData) -> Result<Box<dyn Instance>> {
        let config = self.get_config(&machine.spec).await?;
        let instance = self.find_instance(&self.client(&config), machine.uid()).await?;
        Ok(Box::new(VultrServer::new(instance)))
    }

    async fn create(
        &self,
        machine: &Machine,
        _data: &ProviderData,
        userdata: &str,
    ) -> Result<Box<dyn Instance>> {
        let config = self.get_config(&machine.spec).await?;
        let client = self.client(&config);

        match self.find_instance(&client, machine.uid()).await {
            Ok(existing) => return Ok(Box::new(VultrServer::new(existing))),
            Err(CloudProviderError::InstanceNotFound) => {}
            Err(e) => return Err(e),
        }

        let mut tags = config.tags.clone();
        tags.push(machine.uid().to_string());

        let request = CreateInstanceRequest {
            region: config.region.clone(),
            plan: config.plan.clone(),
            os_id: self.resolve_os_id(&client, &config).await?,
            label: machine.name().to_string(),
            hostname: machine.name().to_string(),
            user_data: userdata.to_string(),
            tags,
            enable_ipv6: config.enable_ipv6,
            attach_vpc: config.vpc_ids.clone(),
        };
        let instance = client.create_instance(&request).await?;
        tracing::info!(machine = %machine.name(), id = %instance.id, "Created vultr instance");
        Ok(Box::new(VultrServer::new(instance)))
    }

    async fn cleanup(&self, machine: &Machine, _data: &ProviderData) -> Result<bool> {
        let config = self.get_config(&machine.spec).await?;
        let client = self.client(&config);

        let instance = match self.find_instance(&client, machine.uid()).await {
            Ok(instance) => instance,
            Err(CloudProviderError::InstanceNotFound) => return Ok(true),
            Err(e) => return Err(e),
        };
        match client.delete_instance(&instance.id).await {
            Ok(()) => {
                tracing::info!(machine = %machine.name(), id = %instance.id, "Deleting vultr instance");
                Ok(false)
            }
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn migrate_uid(&self, machine: &Machine, new_uid: &str) -> Result<()> {
        let config = self.get_config(&machine.spec).await?;
        let client = self.client(&config);

        let instance = match self.find_instance(&client, machine.uid()).await {
            Ok(instance) => instance,
            Err(CloudProviderError::InstanceNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut tags: Vec<String> = instance
            .tags
            .iter()
            .filter(|t| t.as_str() != machine.uid())
            .cloned()
            .collect();
        tags.push(new_uid.to_string());
        client.set_instance_tags(&instance.id, &tags).await?;
        Ok(())
    }

    async fn get_cloud_config(&self, _spec: &MachineSpec) -> Result<(String, String)> {
        Ok((String::new(), String::new()))
    }

    fn machine_metrics_labels(&self, machine: &Machine) -> Result<MetricsLabels> {
        let raw = Self::raw_spec(&machine.spec)?;
        Ok(MetricsLabels::from([
            ("size".to_string(), raw.plan.value),
            ("region".to_string(), raw.region.value),
        ]))
    }

    fn set_metrics_for_machines(&self, _machines: &[Machine]) -> Result<()> {
        Ok(())
    }
}
