//! Provider trait definition

use crate::error::{CloudProviderError, Result, TerminalError};
use crate::instance::Instance;
use async_trait::async_trait;
use machine_core::{Machine, MachineSpec, ProviderConfig};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Labels attached to per-machine metrics
pub type MetricsLabels = BTreeMap<String, String>;

type UpdateFn = Arc<dyn Fn(Machine) -> Result<Machine> + Send + Sync>;

/// Per-call data handed to providers
///
/// Carries the callback a provider uses to persist Machine changes such as
/// finalizers before it creates or after it removes cloud resources.
#[derive(Clone, Default)]
pub struct ProviderData {
    update: Option<UpdateFn>,
}

impl fmt::Debug for ProviderData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderData")
            .field("has_update", &self.update.is_some())
            .finish()
    }
}

impl ProviderData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update<F>(update: F) -> Self
    where
        F: Fn(Machine) -> Result<Machine> + Send + Sync + 'static,
    {
        Self {
            update: Some(Arc::new(update)),
        }
    }

    /// Applies `modify` to a copy of `machine` and persists it
    ///
    /// Without a callback the modified copy is returned unpersisted.
    pub fn update(&self, machine: &Machine, modify: impl FnOnce(&mut Machine)) -> Result<Machine> {
        let mut updated = machine.clone();
        modify(&mut updated);
        match &self.update {
            Some(update) => update(updated),
            None => Ok(updated),
        }
    }
}

/// Cloud backend abstraction
///
/// One implementation per cloud. Implementations hold only their
/// [`machine_config::ConfigVarResolver`] and derive everything else per call.
/// Every vendor error must already be classified when it leaves a method.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Injects provider-specific defaults. Must be idempotent.
    fn add_defaults(&self, spec: MachineSpec) -> Result<MachineSpec>;

    /// Side-effect-free pre-flight check; read-only cloud calls are allowed
    async fn validate(&self, spec: &MachineSpec) -> Result<()>;

    /// Looks up the machine's instance
    ///
    /// Returns [`CloudProviderError::InstanceNotFound`] when the cloud has none.
    async fn get(&self, machine: &Machine, data: &ProviderData) -> Result<Box<dyn Instance>>;

    /// Creates the instance; safe to call again after a partial failure
    async fn create(
        &self,
        machine: &Machine,
        data: &ProviderData,
        userdata: &str,
    ) -> Result<Box<dyn Instance>>;

    /// Deletes the instance
    ///
    /// `Ok(true)` once the instance is confirmed gone, `Ok(false)` while
    /// deletion is still in progress.
    async fn cleanup(&self, machine: &Machine, data: &ProviderData) -> Result<bool>;

    /// Re-tags the instance after the owning Machine's UID changed
    async fn migrate_uid(&self, machine: &Machine, new_uid: &str) -> Result<()>;

    /// Returns `(config, cloud provider name)` for the cloud-controller-manager
    async fn get_cloud_config(&self, spec: &MachineSpec) -> Result<(String, String)>;

    fn machine_metrics_labels(&self, machine: &Machine) -> Result<MetricsLabels>;

    fn set_metrics_for_machines(&self, machines: &[Machine]) -> Result<()>;
}

/// Decodes the envelope, reporting malformed specs as terminal
pub fn decode_provider_config(spec: &MachineSpec) -> Result<ProviderConfig> {
    ProviderConfig::from_machine_spec(spec).map_err(|e| {
        CloudProviderError::Terminal(TerminalError::invalid_configuration(format!(
            "failed to parse provider config: {e}"
        )))
    })
}

/// Cloud config for a machine, honouring `overwriteCloudConfig`
pub async fn resolve_cloud_config(
    provider: &dyn Provider,
    spec: &MachineSpec,
) -> Result<(String, String)> {
    let config = decode_provider_config(spec)?;
    let (generated, name) = provider.get_cloud_config(spec).await?;
    match config.overwrite_cloud_config {
        Some(overwrite) if !overwrite.is_empty() => Ok((overwrite, name)),
        _ => Ok((generated, name)),
    }
}
