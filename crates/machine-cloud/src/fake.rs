//! In-memory provider
//!
//! Backs tests and dry runs. Nothing leaves the process.

use crate::error::{CloudProviderError, MachineErrorReason, Result, TerminalError};
use crate::instance::{AddressType, Instance, InstanceStatus, StaticInstance};
use crate::provider::{MetricsLabels, Provider, ProviderData, decode_provider_config};
use async_trait::async_trait;
use machine_config::ConfigVarResolver;
use machine_core::{ConfigVarBool, Machine, MachineSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const FAKE_FINALIZER: &str = "fake.machine-controller.k8c.io/instance";

/// `cloudProviderSpec` of the fake provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeProviderSpec {
    /// Defaults to `true` when unset
    #[serde(default)]
    pub pass_validation: ConfigVarBool,

    /// Number of `get` calls before the instance reports addresses
    #[serde(default)]
    pub address_after_polls: u32,

    /// Makes `create` fail terminally with this reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_error: Option<MachineErrorReason>,
}

#[derive(Debug, Clone)]
struct FakeServer {
    id: String,
    name: String,
    ordinal: u32,
    polls: u32,
    address_after_polls: u32,
}

impl FakeServer {
    fn snapshot(&self) -> StaticInstance {
        let mut addresses = HashMap::new();
        let status = if self.polls >= self.address_after_polls {
            addresses.insert(
                format!("192.0.2.{}", self.ordinal % 254 + 1),
                AddressType::ExternalIP,
            );
            addresses.insert(self.name.clone(), AddressType::Hostname);
            InstanceStatus::Running
        } else {
            InstanceStatus::Creating
        };
        StaticInstance {
            name: self.name.clone(),
            id: self.id.clone(),
            provider_id: format!("fake://{}", self.id),
            addresses,
            status,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    servers: HashMap<String, FakeServer>,
    next_ordinal: u32,
    validate_calls: usize,
    fail_next_validation: bool,
}

/// Provider keeping its instances in memory, keyed by Machine UID
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    resolver: ConfigVarResolver,
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: ConfigVarResolver) -> Self {
        Self {
            resolver,
            state: Arc::default(),
        }
    }

    pub fn validate_calls(&self) -> usize {
        self.lock().map(|s| s.validate_calls).unwrap_or_default()
    }

    /// Makes the next `validate` fail with a transient error
    pub fn fail_next_validation_transiently(&self) {
        if let Ok(mut state) = self.lock() {
            state.fail_next_validation = true;
        }
    }

    pub fn instance_count(&self) -> usize {
        self.lock().map(|s| s.servers.len()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, FakeState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("fake provider state poisoned").into())
    }

    fn config(&self, spec: &MachineSpec) -> Result<FakeProviderSpec> {
        let config = decode_provider_config(spec)?;
        config.cloud_provider_spec::<FakeProviderSpec>().map_err(|e| {
            TerminalError::invalid_configuration(format!("failed to parse fake spec: {e}")).into()
        })
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn add_defaults(&self, spec: MachineSpec) -> Result<MachineSpec> {
        let fake_spec = self.config(&spec)?;
        let mut config = decode_provider_config(&spec)?;
        config.set_cloud_provider_spec(&fake_spec)?;
        Ok(config.apply_to(&spec)?)
    }

    async fn validate(&self, spec: &MachineSpec) -> Result<()> {
        {
            let mut state = self.lock()?;
            state.validate_calls += 1;
            if std::mem::take(&mut state.fail_next_validation) {
                return Err(anyhow::anyhow!("simulated API outage").into());
            }
        }

        let config = decode_provider_config(spec)?;
        if !config.operating_system.is_supported() {
            return Err(CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                format!("unsupported operating system '{}'", config.operating_system),
            ));
        }

        let fake_spec = self.config(spec)?;
        let (pass, found) = self
            .resolver
            .get_bool_value_found(&fake_spec.pass_validation)
            .await?;
        if found && !pass {
            return Err(CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                "failing validation as requested",
            ));
        }
        Ok(())
    }

    async fn get(&self, machine: &Machine, _data: &ProviderData) -> Result<Box<dyn Instance>> {
        let mut state = self.lock()?;
        let server = state
            .servers
            .get_mut(machine.uid())
            .ok_or(CloudProviderError::InstanceNotFound)?;
        server.polls += 1;
        Ok(Box::new(server.snapshot()))
    }

    async fn create(
        &self,
        machine: &Machine,
        data: &ProviderData,
        _userdata: &str,
    ) -> Result<Box<dyn Instance>> {
        let fake_spec = self.config(&machine.spec)?;
        if let Some(reason) = fake_spec.create_error {
            return Err(CloudProviderError::terminal(
                reason,
                "failing create as requested",
            ));
        }

        data.update(machine, |m| m.add_finalizer(FAKE_FINALIZER))?;

        let mut state = self.lock()?;
        if let Some(existing) = state.servers.get(machine.uid()) {
            return Ok(Box::new(existing.snapshot()));
        }

        state.next_ordinal += 1;
        let ordinal = state.next_ordinal;
        let server = FakeServer {
            id: format!("fake-{ordinal}"),
            name: machine.name().to_string(),
            ordinal,
            polls: 0,
            address_after_polls: fake_spec.address_after_polls,
        };
        tracing::info!(machine = %machine.name(), id = %server.id, "Created fake instance");
        let snapshot = server.snapshot();
        state.servers.insert(machine.uid().to_string(), server);
        Ok(Box::new(snapshot))
    }

    async fn cleanup(&self, machine: &Machine, data: &ProviderData) -> Result<bool> {
        let removed = self.lock()?.servers.remove(machine.uid());
        if let Some(server) = removed {
            tracing::info!(machine = %machine.name(), id = %server.id, "Deleted fake instance");
        }
        data.update(machine, |m| m.remove_finalizer(FAKE_FINALIZER))?;
        Ok(true)
    }

    async fn migrate_uid(&self, machine: &Machine, new_uid: &str) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(server) = state.servers.remove(machine.uid()) {
            state.servers.insert(new_uid.to_string(), server);
        }
        Ok(())
    }

    async fn get_cloud_config(&self, _spec: &MachineSpec) -> Result<(String, String)> {
        Ok((String::new(), String::new()))
    }

    fn machine_metrics_labels(&self, _machine: &Machine) -> Result<MetricsLabels> {
        Ok(MetricsLabels::new())
    }

    fn set_metrics_for_machines(&self, _machines: &[Machine]) -> Result<()> {
        Ok(())
    }
}
