//! Hetzner Cloud provider implementation

use crate::client::{CreatePublicNet, CreateServerRequest, HCLOUD_API_BASE, HcloudClient, Server};
use async_trait::async_trait;
use machine_cloud::{
    AddressType, CloudProviderError, Instance, InstanceStatus, MachineErrorReason, MetricsLabels,
    Provider, ProviderData, Result, TerminalError, decode_provider_config,
};
use machine_config::ConfigVarResolver;
use machine_core::{ConfigVarBool, ConfigVarString, Machine, MachineSpec, OperatingSystem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Environment variable consulted when `token` is empty
pub const TOKEN_ENV: &str = "HZ_TOKEN";

/// Server label holding the owning Machine's UID
pub const MACHINE_UID_LABEL: &str = "machine-uid";

const DEFAULT_LOCATION: &str = "fsn1";

/// `cloudProviderSpec` for `cloudProvider: hetzner`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HetznerProviderSpec {
    #[serde(default)]
    pub token: ConfigVarString,
    #[serde(default)]
    pub server_type: ConfigVarString,
    #[serde(default)]
    pub datacenter: ConfigVarString,
    #[serde(default)]
    pub location: ConfigVarString,
    #[serde(default)]
    pub image: ConfigVarString,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<ConfigVarString>,
    #[serde(default)]
    pub assign_public_ipv4: ConfigVarBool,
    #[serde(default)]
    pub assign_public_ipv6: ConfigVarBool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Resolved configuration
#[derive(Debug)]
struct Config {
    token: String,
    server_type: String,
    datacenter: String,
    location: String,
    image: String,
    networks: Vec<String>,
    assign_public_ipv4: bool,
    assign_public_ipv6: bool,
    labels: BTreeMap<String, String>,
    ssh_public_keys: Vec<String>,
}

/// Hetzner Cloud provider
#[derive(Debug, Clone)]
pub struct HetznerProvider {
    resolver: ConfigVarResolver,
    endpoint: String,
}

impl HetznerProvider {
    pub fn new(resolver: ConfigVarResolver) -> Self {
        Self::with_endpoint(resolver, HCLOUD_API_BASE)
    }

    pub fn with_endpoint(resolver: ConfigVarResolver, endpoint: impl Into<String>) -> Self {
        Self {
            resolver,
            endpoint: endpoint.into(),
        }
    }

    fn raw_spec(spec: &MachineSpec) -> Result<HetznerProviderSpec> {
        let envelope = decode_provider_config(spec)?;
        envelope.cloud_provider_spec().map_err(|e| {
            TerminalError::invalid_configuration(format!("failed to parse hetzner spec: {e}"))
                .into()
        })
    }

    async fn get_config(&self, spec: &MachineSpec) -> Result<Config> {
        let envelope = decode_provider_config(spec)?;
        let raw = Self::raw_spec(spec)?;
        let r = &self.resolver;

        let token = r.get_string_value_or_env(&raw.token, TOKEN_ENV).await?;
        let image = match r.get_string_value(&raw.image).await? {
            image if !image.is_empty() => image,
            _ => default_image(&envelope.operating_system)?.to_string(),
        };

        let mut networks = Vec::with_capacity(raw.networks.len());
        for network in &raw.networks {
            networks.push(r.get_string_value(network).await?);
        }

        let (assign_public_ipv4, found_v4) = r.get_bool_value_found(&raw.assign_public_ipv4).await?;
        let (assign_public_ipv6, found_v6) = r.get_bool_value_found(&raw.assign_public_ipv6).await?;

        Ok(Config {
            token,
            server_type: r.get_string_value(&raw.server_type).await?,
            datacenter: r.get_string_value(&raw.datacenter).await?,
            location: r.get_string_value(&raw.location).await?,
            image,
            networks,
            assign_public_ipv4: assign_public_ipv4 || !found_v4,
            assign_public_ipv6: assign_public_ipv6 || !found_v6,
            labels: raw.labels,
            ssh_public_keys: envelope.ssh_public_keys,
        })
    }

    fn client(&self, config: &Config) -> HcloudClient {
        HcloudClient::with_base_url(&config.token, &self.endpoint)
    }

    async fn find_server(&self, client: &HcloudClient, uid: &str) -> Result<Server> {
        let selector = format!("{MACHINE_UID_LABEL}={uid}");
        client
            .list_servers(&selector)
            .await?
            .into_iter()
            .next()
            .ok_or(CloudProviderError::InstanceNotFound)
    }

    async fn require(&self, client: &HcloudClient, collection: &str, kind: &str, name: &str) -> Result<u64> {
        match client.find_by_name(collection, name).await? {
            Some(resource) => Ok(resource.id),
            None => Err(CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                format!("{kind} '{name}' not found"),
            )),
        }
    }
}

fn default_image(os: &OperatingSystem) -> Result<&'static str> {
    match os {
        OperatingSystem::Ubuntu => Ok("ubuntu-24.04"),
        OperatingSystem::CentOS => Ok("centos-stream-9"),
        OperatingSystem::RockyLinux => Ok("rocky-9"),
        other => Err(CloudProviderError::terminal(
            MachineErrorReason::InvalidConfiguration,
            format!("operating system '{other}' is not supported on hetzner"),
        )),
    }
}

fn missing(field: &str) -> CloudProviderError {
    CloudProviderError::terminal(
        MachineErrorReason::InvalidConfiguration,
        format!("{field} is missing"),
    )
}

/// Maps an hcloud server status into the closed status set
pub fn map_status(status: &str) -> InstanceStatus {
    match status {
        "initializing" | "starting" => InstanceStatus::Creating,
        "running" => InstanceStatus::Running,
        "stopping" => InstanceStatus::Stopping,
        "off" => InstanceStatus::Stopped,
        "deleting" => InstanceStatus::Deleting,
        _ => InstanceStatus::Unknown,
    }
}

/// A Hetzner server as seen by the controller
#[derive(Debug, Clone)]
pub struct HetznerServer {
    server: Server,
    id: String,
}

impl HetznerServer {
    pub fn new(server: Server) -> Self {
        let id = server.id.to_string();
        Self { server, id }
    }
}

impl Instance for HetznerServer {
    fn name(&self) -> &str {
        &self.server.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn provider_id(&self) -> String {
        format!("hcloud://{}", self.id)
    }

    fn addresses(&self) -> HashMap<String, AddressType> {
        let mut addresses = HashMap::new();
        if let Some(v4) = &self.server.public_net.ipv4
            && !v4.ip.is_empty()
        {
            addresses.insert(v4.ip.clone(), AddressType::ExternalIP);
        }
        // hcloud reports the routed /64; the server itself holds ::1
        if let Some(v6) = &self.server.public_net.ipv6
            && let Some(prefix) = v6.ip.split('/').next()
            && !prefix.is_empty()
        {
            addresses.insert(format!("{prefix}1"), AddressType::ExternalIP);
        }
        for private in &self.server.private_net {
            addresses.insert(private.ip.clone(), AddressType::InternalIP);
        }
        addresses
    }

    fn status(&self) -> InstanceStatus {
        map_status(&self.server.status)
    }
}

#[async_trait]
impl Provider for HetznerProvider {
    fn add_defaults(&self, spec: MachineSpec) -> Result<MachineSpec> {
        let mut raw = Self::raw_spec(&spec)?;
        if raw.datacenter.is_empty() && raw.location.is_empty() {
            raw.location = ConfigVarString::literal(DEFAULT_LOCATION);
        }
        let mut envelope = decode_provider_config(&spec)?;
        envelope.set_cloud_provider_spec(&raw)?;
        Ok(envelope.apply_to(&spec)?)
    }

    async fn validate(&self, spec: &MachineSpec) -> Result<()> {
        let config = self.get_config(spec).await?;

        if config.token.is_empty() {
            return Err(missing("token"));
        }
        if config.server_type.is_empty() {
            return Err(missing("serverType"));
        }
        if !config.location.is_empty() && !config.datacenter.is_empty() {
            return Err(CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                "location and datacenter must not be set at the same time",
            ));
        }

        let client = self.client(&config);
        if !config.location.is_empty() {
            self.require(&client, "locations", "location", &config.location).await?;
        }
        if !config.datacenter.is_empty() {
            self.require(&client, "datacenters", "datacenter", &config.datacenter).await?;
        }
        self.require(&client, "server_types", "server type", &config.server_type).await?;
        self.require(&client, "images", "image", &config.image).await?;
        for network in &config.networks {
            self.require(&client, "networks", "network", network).await?;
        }
        Ok(())
    }

    async fn get(&self, machine: &Machine, _data: &ProviderData) -> Result<Box<dyn Instance>> {
        let config = self.get_config(&machine.spec).await?;
        let server = self.find_server(&self.client(&config), machine.uid()).await?;
        Ok(Box::new(HetznerServer::new(server)))
    }

    async fn create(
        &self,
        machine: &Machine,
        _data: &ProviderData,
        userdata: &str,
    ) -> Result<Box<dyn Instance>> {
        let config = self.get_config(&machine.spec).await?;
        let client = self.client(&config);

        match self.find_server(&client, machine.uid()).await {
            Ok(existing) => {
                tracing::debug!(machine = %machine.name(), id = existing.id, "Server already exists");
                return Ok(Box::new(HetznerServer::new(existing)));
            }
            Err(CloudProviderError::InstanceNotFound) => {}
            Err(e) => return Err(e),
        }

        let mut networks = Vec::with_capacity(config.networks.len());
        for network in &config.networks {
            networks.push(self.require(&client, "networks", "network", network).await?);
        }

        let mut ssh_keys = Vec::with_capacity(config.ssh_public_keys.len());
        for (i, key) in config.ssh_public_keys.iter().enumerate() {
            let created = client
                .create_ssh_key(&format!("{}-{}", machine.uid(), i), key)
                .await?;
            ssh_keys.push(created.id);
        }

        let mut labels: HashMap<String, String> = config.labels.clone().into_iter().collect();
        labels.insert(MACHINE_UID_LABEL.to_string(), machine.uid().to_string());

        let request = CreateServerRequest {
            name: machine.name().to_string(),
            server_type: config.server_type.clone(),
            image: config.image.clone(),
            location: Some(config.location.clone()).filter(|s| !s.is_empty()),
            datacenter: Some(config.datacenter.clone()).filter(|s| !s.is_empty()),
            user_data: userdata.to_string(),
            ssh_keys: ssh_keys.clone(),
            labels,
            networks,
            public_net: CreatePublicNet {
                enable_ipv4: config.assign_public_ipv4,
                enable_ipv6: config.assign_public_ipv6,
            },
        };
        let created = client.create_server(&request).await;

        // keys are only needed while the server is being created
        for id in ssh_keys {
            if let Err(e) = client.delete_ssh_key(id).await {
                tracing::warn!(id, error = %e, "Failed to delete temporary ssh key");
            }
        }

        let server = created?;
        tracing::info!(machine = %machine.name(), id = server.id, "Created hetzner server");
        Ok(Box::new(HetznerServer::new(server)))
    }

    async fn cleanup(&self, machine: &Machine, _data: &ProviderData) -> Result<bool> {
        let config = self.get_config(&machine.spec).await?;
        let client = self.client(&config);

        let server = match self.find_server(&client, machine.uid()).await {
            Ok(server) => server,
            Err(CloudProviderError::InstanceNotFound) => return Ok(true),
            Err(e) => return Err(e),
        };
        if map_status(&server.status) == InstanceStatus::Deleting {
            return Ok(false);
        }

        match client.delete_server(server.id).await {
            Ok(()) => {
                tracing::info!(machine = %machine.name(), id = server.id, "Deleting hetzner server");
                Ok(false)
            }
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn migrate_uid(&self, machine: &Machine, new_uid: &str) -> Result<()> {
        let config = self.get_config(&machine.spec).await?;
        let client = self.client(&config);

        let server = match self.find_server(&client, machine.uid()).await {
            Ok(server) => server,
            Err(CloudProviderError::InstanceNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut labels = server.labels.clone();
        labels.insert(MACHINE_UID_LABEL.to_string(), new_uid.to_string());
        client.update_server_labels(server.id, &labels).await?;
        tracing::info!(machine = %machine.name(), id = server.id, new_uid, "Migrated server UID label");
        Ok(())
    }

    async fn get_cloud_config(&self, _spec: &MachineSpec) -> Result<(String, String)> {
        Ok((String::new(), String::new()))
    }

    fn machine_metrics_labels(&self, machine: &Machine) -> Result<MetricsLabels> {
        let raw = Self::raw_spec(&machine.spec)?;
        let location = if raw.location.value.is_empty() {
            raw.datacenter.value
        } else {
            raw.location.value
        };
        Ok(MetricsLabels::from([
            ("size".to_string(), raw.server_type.value),
            ("location".to_string(), location),
            ("image".to_string(), raw.image.value),
        ]))
    }

    fn set_metrics_for_machines(&self, _machines: &[Machine]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_cloud::ErrorClass;
    use machine_core::ProviderSpec;
    use serde_json::{Value, json};
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec(cloud: Value) -> MachineSpec {
        MachineSpec {
            provider_spec: ProviderSpec {
                value: Some(json!({
                    "cloudProvider": "hetzner",
                    "cloudProviderSpec": cloud,
                    "operatingSystem": "ubuntu",
                    "sshPublicKeys": []
                })),
            },
            ..Default::default()
        }
    }

    fn machine(cloud: Value) -> Machine {
        Machine::new("worker-1", spec(cloud)).with_uid("uid-1")
    }

    fn base_spec() -> Value {
        json!({"token": "secret-token", "serverType": "cx22", "location": "fsn1"})
    }

    fn server_json(status: &str) -> Value {
        json!({
            "id": 42,
            "name": "worker-1",
            "status": status,
            "public_net": {
                "ipv4": {"ip": "203.0.113.10"},
                "ipv6": {"ip": "2001:db8:1::/64"}
            },
            "private_net": [{"network": 7, "ip": "10.0.0.2"}],
            "labels": {"machine-uid": "uid-1", "team": "infra"}
        })
    }

    async fn provider() -> (HetznerProvider, MockServer) {
        let server = MockServer::start().await;
        let provider = HetznerProvider::with_endpoint(ConfigVarResolver::without_store(), server.uri());
        (provider, server)
    }

    async fn mount_lookup(server: &MockServer, collection: &str, name: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{collection}")))
            .and(query_param("name", name))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ collection: [{"id": 1, "name": name}] })),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_add_defaults_sets_location_once() {
        let provider = HetznerProvider::new(ConfigVarResolver::without_store());
        let once = provider
            .add_defaults(spec(json!({"serverType": "cx22"})))
            .unwrap();
        let twice = provider.add_defaults(once.clone()).unwrap();
        assert_eq!(once, twice);
        let raw = HetznerProvider::raw_spec(&once).unwrap();
        assert_eq!(raw.location.value, "fsn1");

        let with_dc = provider
            .add_defaults(spec(json!({"datacenter": "nbg1-dc3"})))
            .unwrap();
        let raw = HetznerProvider::raw_spec(&with_dc).unwrap();
        assert!(raw.location.is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("running"), InstanceStatus::Running);
        assert_eq!(map_status("initializing"), InstanceStatus::Creating);
        assert_eq!(map_status("off"), InstanceStatus::Stopped);
        assert_eq!(map_status("rebuilding"), InstanceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_get_by_uid_label() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("label_selector", "machine-uid=uid-1"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"servers": [server_json("running")]})),
            )
            .mount(&server)
            .await;

        let instance = provider
            .get(&machine(base_spec()), &ProviderData::new())
            .await
            .unwrap();
        assert_eq!(instance.provider_id(), "hcloud://42");
        assert_eq!(instance.status(), InstanceStatus::Running);
        let addresses = instance.addresses();
        assert_eq!(addresses.get("203.0.113.10"), Some(&AddressType::ExternalIP));
        assert_eq!(addresses.get("2001:db8:1::1"), Some(&AddressType::ExternalIP));
        assert_eq!(addresses.get("10.0.0.2"), Some(&AddressType::InternalIP));
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .mount(&server)
            .await;

        let err = provider
            .get(&machine(base_spec()), &ProviderData::new())
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn test_create_labels_server_with_uid() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .and(body_partial_json(json!({
                "name": "worker-1",
                "server_type": "cx22",
                "image": "ubuntu-24.04",
                "location": "fsn1",
                "user_data": "#!/bin/bash",
                "labels": {"machine-uid": "uid-1"}
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"server": server_json("initializing")})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let instance = provider
            .create(&machine(base_spec()), &ProviderData::new(), "#!/bin/bash")
            .await
            .unwrap();
        assert_eq!(instance.id(), "42");
        assert_eq!(instance.status(), InstanceStatus::Creating);
    }

    #[tokio::test]
    async fn test_create_reuses_existing_server() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"servers": [server_json("running")]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let instance = provider
            .create(&machine(base_spec()), &ProviderData::new(), "")
            .await
            .unwrap();
        assert_eq!(instance.id(), "42");
    }

    #[tokio::test]
    async fn test_create_out_of_capacity_is_terminal() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(412).set_body_json(json!({
                "error": {"code": "resource_unavailable", "message": "server type unavailable"}
            })))
            .mount(&server)
            .await;

        let err = provider
            .create(&machine(base_spec()), &ProviderData::new(), "")
            .await
            .unwrap_err();
        let terminal = err.as_terminal().unwrap();
        assert_eq!(terminal.reason, MachineErrorReason::InsufficientResources);
        assert_eq!(terminal.message, "server type unavailable");
    }

    #[tokio::test]
    async fn test_validate_invalid_credentials() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/locations"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "unauthorized", "message": "unable to authenticate"}
            })))
            .mount(&server)
            .await;

        let err = provider.validate(&spec(base_spec())).await.unwrap_err();
        let terminal = err.as_terminal().unwrap();
        assert_eq!(terminal.reason, MachineErrorReason::InvalidConfiguration);
        assert!(terminal.message.contains("invalid credentials"));
    }

    #[tokio::test]
    async fn test_validate_unknown_server_type() {
        let (provider, server) = provider().await;
        mount_lookup(&server, "locations", "fsn1").await;
        Mock::given(method("GET"))
            .and(path("/server_types"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"server_types": []})))
            .mount(&server)
            .await;

        let err = provider.validate(&spec(base_spec())).await.unwrap_err();
        assert!(err.as_terminal().unwrap().message.contains("cx22"));
    }

    #[tokio::test]
    #[serial]
    async fn test_validate_token_from_env() {
        let (provider, server) = provider().await;
        for (collection, name) in [
            ("locations", "fsn1"),
            ("server_types", "cx22"),
            ("images", "ubuntu-24.04"),
        ] {
            mount_lookup(&server, collection, name).await;
        }

        temp_env::async_with_vars([(TOKEN_ENV, Some("env-token"))], async {
            provider
                .validate(&spec(json!({"serverType": "cx22", "location": "fsn1"})))
                .await
                .unwrap();
        })
        .await;
    }

    #[tokio::test]
    #[serial]
    async fn test_validate_missing_token() {
        let (provider, _server) = provider().await;
        temp_env::async_with_vars([(TOKEN_ENV, None::<&str>)], async {
            let err = provider
                .validate(&spec(json!({"serverType": "cx22"})))
                .await
                .unwrap_err();
            assert!(err.as_terminal().unwrap().message.contains("token"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_validate_rejects_unsupported_os_without_image() {
        let provider = HetznerProvider::new(ConfigVarResolver::without_store());
        let mut s = spec(base_spec());
        if let Some(Value::Object(map)) = s.provider_spec.value.as_mut() {
            map.insert("operatingSystem".into(), json!("flatcar"));
        }
        let err = provider.validate(&s).await.unwrap_err();
        assert!(err.as_terminal().unwrap().message.contains("flatcar"));
    }

    #[tokio::test]
    async fn test_cleanup() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"servers": [server_json("running")]})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/servers/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"action": {"id": 1}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .mount(&server)
            .await;

        let m = machine(base_spec());
        assert!(!provider.cleanup(&m, &ProviderData::new()).await.unwrap());
        assert!(provider.cleanup(&m, &ProviderData::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_server_gone_during_delete() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"servers": [server_json("running")]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/servers/42"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "not_found", "message": "server not found"}
            })))
            .mount(&server)
            .await;

        assert!(provider
            .cleanup(&machine(base_spec()), &ProviderData::new())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_validate_malformed_lookup_is_transient() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/locations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"locations": [{"id": "x"}]})),
            )
            .mount(&server)
            .await;

        let err = provider.validate(&spec(base_spec())).await.unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Transient);
        assert!(err.as_terminal().is_none());
    }

    fn machine_with_ssh_key() -> Machine {
        let mut m = machine(base_spec());
        if let Some(Value::Object(map)) = m.spec.provider_spec.value.as_mut() {
            map.insert("sshPublicKeys".into(), json!(["ssh-ed25519 AAAA test"]));
        }
        m
    }

    async fn mount_no_servers(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_ssh_key_404_is_not_instance_not_found() {
        let (provider, server) = provider().await;
        mount_no_servers(&server).await;
        Mock::given(method("POST"))
            .and(path("/ssh_keys"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "not_found", "message": "project not found"}
            })))
            .mount(&server)
            .await;

        let err = provider
            .create(&machine_with_ssh_key(), &ProviderData::new(), "")
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_create_server_404_is_not_instance_not_found() {
        let (provider, server) = provider().await;
        mount_no_servers(&server).await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "not_found", "message": "image not found"}
            })))
            .mount(&server)
            .await;

        let err = provider
            .create(&machine(base_spec()), &ProviderData::new(), "")
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_migrate_uid_relabels() {
        let (provider, server) = provider().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("label_selector", "machine-uid=uid-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"servers": [server_json("running")]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/servers/42"))
            .and(body_partial_json(json!({
                "labels": {"machine-uid": "uid-2", "team": "infra"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"server": server_json("running")})),
            )
            .expect(1)
            .mount(&server)
            .await;

        provider
            .migrate_uid(&machine(base_spec()), "uid-2")
            .await
            .unwrap();
    }

    #[test]
    fn test_metrics_labels() {
        let provider = HetznerProvider::new(ConfigVarResolver::without_store());
        let labels = provider
            .machine_metrics_labels(&machine(base_spec()))
            .unwrap();
        assert_eq!(labels["size"], "cx22");
        assert_eq!(labels["location"], "fsn1");
    }
}
