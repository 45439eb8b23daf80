//! One-shot provisioning of a batch of Machines
//!
//! For every Machine the provisioner decodes the envelope, selects the
//! provider, validates, and then reuses or creates the instance. After that it
//! polls `get` until the instance reports addresses. Machines are processed
//! one after another and never share state; a failure on one does not stop
//! the others.

use crate::error::{ProvisionError, Result};
use crate::registry::ProviderSource;
use crate::userdata::build_userdata;
use machine_cloud::{
    AddressType, ErrorClass, Instance, InstanceStatus, Provider, ProviderData,
    decode_provider_config,
};
use machine_container::RuntimeConfig;
use machine_core::Machine;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const ADDRESS_POLL_ATTEMPTS: u32 = 5;

/// What a provisioned instance looked like at the end of the run
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedInstance {
    pub provider_id: String,
    pub status: InstanceStatus,
    pub addresses: BTreeMap<String, AddressType>,
    /// `false` when an existing instance was reused
    pub created: bool,
}

/// Result for one Machine
///
/// `machine` carries the updated status: addresses and provider ID on success,
/// reason and message on a terminal failure.
#[derive(Debug)]
pub struct MachineReport {
    pub machine: Machine,
    pub result: Result<ProvisionedInstance>,
}

impl MachineReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Provisioner<S> {
    providers: S,
    runtime: RuntimeConfig,
    extra_userdata: Option<String>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl<S: ProviderSource> Provisioner<S> {
    pub fn new(providers: S, runtime: RuntimeConfig) -> Self {
        Self {
            providers,
            runtime,
            extra_userdata: None,
            poll_interval: ADDRESS_POLL_INTERVAL,
            poll_attempts: ADDRESS_POLL_ATTEMPTS,
        }
    }

    /// Operator userdata appended after the runtime bootstrap
    pub fn with_extra_userdata(mut self, userdata: impl Into<String>) -> Self {
        self.extra_userdata = Some(userdata.into());
        self
    }

    pub fn with_address_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Provisions every machine and reports each outcome
    pub async fn create_machines(&self, machines: Vec<Machine>) -> Vec<MachineReport> {
        let mut reports = Vec::with_capacity(machines.len());
        for machine in machines {
            reports.push(self.create_machine(machine).await);
        }
        reports
    }

    pub async fn create_machine(&self, mut machine: Machine) -> MachineReport {
        let persisted: Arc<Mutex<Option<Machine>>> = Arc::default();
        let sink = Arc::clone(&persisted);
        let data = ProviderData::with_update(move |updated| {
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(updated.clone());
            }
            Ok(updated)
        });

        let result = self.provision(&mut machine, &data).await;

        // プロバイダが ProviderData 経由で保存した finalizer を反映
        if let Some(updated) = persisted.lock().ok().and_then(|mut slot| slot.take()) {
            machine.metadata.finalizers = updated.metadata.finalizers;
        }

        match &result {
            Ok(instance) => {
                machine.spec.provider_id = Some(instance.provider_id.clone());
                let status = machine.status_mut();
                status.clear_error();
                status.set_addresses(
                    instance
                        .addresses
                        .iter()
                        .map(|(address, kind)| (address.as_str(), kind.as_str())),
                );
                info!(
                    machine = %machine.name(),
                    provider_id = %instance.provider_id,
                    created = instance.created,
                    "Machine provisioned"
                );
            }
            Err(err) => match err.as_terminal() {
                Some(terminal) => {
                    warn!(
                        machine = %machine.name(),
                        reason = %terminal.reason,
                        "Machine failed terminally: {}",
                        terminal.message
                    );
                    machine
                        .status_mut()
                        .set_terminal_error(terminal.reason.as_str(), terminal.message);
                }
                None => {
                    warn!(machine = %machine.name(), "Machine provisioning will need a retry: {}", err);
                }
            },
        }

        MachineReport { machine, result }
    }

    async fn provision(&self, machine: &mut Machine, data: &ProviderData) -> Result<ProvisionedInstance> {
        let config = decode_provider_config(&machine.spec)?;
        let provider = self.providers.provider(config.cloud_provider)?;
        debug!(machine = %machine.name(), provider = %config.cloud_provider, "Selected provider");

        machine.spec = provider.add_defaults(machine.spec.clone())?;
        provider.validate(&machine.spec).await?;

        let (instance, created) = match provider.get(machine, data).await {
            Ok(instance) => {
                info!(machine = %machine.name(), provider_id = %instance.provider_id(), "Reusing existing instance");
                (instance, false)
            }
            Err(err) if err.classify() == ErrorClass::NotFound => {
                let engine = self.runtime.engine(&machine.spec.versions.kubelet)?;
                let userdata = build_userdata(
                    &engine,
                    &config.operating_system,
                    self.extra_userdata.as_deref(),
                )?;
                info!(machine = %machine.name(), engine = engine.name(), "Creating instance");
                (provider.create(machine, data, &userdata).await?, true)
            }
            Err(err) => return Err(err.into()),
        };

        let instance = self.wait_for_addresses(provider.as_ref(), machine, data, instance).await?;
        Ok(ProvisionedInstance {
            provider_id: instance.provider_id(),
            status: instance.status(),
            addresses: instance.addresses().into_iter().collect(),
            created,
        })
    }

    async fn wait_for_addresses(
        &self,
        provider: &dyn Provider,
        machine: &Machine,
        data: &ProviderData,
        mut instance: Box<dyn Instance>,
    ) -> Result<Box<dyn Instance>> {
        for attempt in 1..=self.poll_attempts {
            if !instance.addresses().is_empty() {
                return Ok(instance);
            }
            debug!(machine = %machine.name(), attempt, "Waiting for instance addresses");
            tokio::time::sleep(self.poll_interval).await;
            instance = provider.get(machine, data).await?;
        }
        if instance.addresses().is_empty() {
            return Err(ProvisionError::NoAddresses {
                provider_id: instance.provider_id(),
                attempts: self.poll_attempts,
            });
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_cloud::{FAKE_FINALIZER, FakeProvider, MachineErrorReason};
    use machine_core::{CloudProvider, MachineSpec, ProviderSpec};
    use serde_json::json;

    /// Hands out clones of one fake provider so state survives between calls
    struct SharedFake(FakeProvider);

    impl ProviderSource for SharedFake {
        fn provider(&self, cloud: CloudProvider) -> machine_cloud::Result<Box<dyn Provider>> {
            match cloud {
                CloudProvider::Fake => Ok(Box::new(self.0.clone())),
                other => crate::registry::for_provider(other, Default::default()),
            }
        }
    }

    fn machine(name: &str, cloud: &str, cloud_spec: serde_json::Value, os: &str) -> Machine {
        let spec = MachineSpec {
            provider_spec: ProviderSpec {
                value: Some(json!({
                    "cloudProvider": cloud,
                    "cloudProviderSpec": cloud_spec,
                    "operatingSystem": os
                })),
            },
            versions: machine_core::MachineVersionInfo {
                kubelet: "1.30.2".to_string(),
            },
            ..Default::default()
        };
        Machine::new(name, spec).with_uid(format!("uid-{name}"))
    }

    fn provisioner(fake: &FakeProvider) -> Provisioner<SharedFake> {
        Provisioner::new(SharedFake(fake.clone()), RuntimeConfig::default())
    }

    #[tokio::test]
    async fn test_creates_and_reports_addresses() {
        let fake = FakeProvider::new();
        let report = provisioner(&fake)
            .create_machine(machine("worker-1", "fake", json!({}), "ubuntu"))
            .await;

        let instance = report.result.as_ref().unwrap();
        assert!(instance.created);
        assert_eq!(instance.provider_id, "fake://fake-1");
        assert_eq!(report.machine.spec.provider_id.as_deref(), Some("fake://fake-1"));

        let status = report.machine.status.as_ref().unwrap();
        assert!(status.error_reason.is_none());
        assert!(status.addresses.iter().any(|a| a.type_ == "ExternalIP"));
        assert!(report.machine.has_finalizer(FAKE_FINALIZER));
        assert_eq!(fake.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_reuses_existing_instance() {
        let fake = FakeProvider::new();
        let provisioner = provisioner(&fake);
        let m = machine("worker-1", "fake", json!({}), "ubuntu");

        assert!(provisioner.create_machine(m.clone()).await.result.unwrap().created);
        let second = provisioner.create_machine(m).await.result.unwrap();
        assert!(!second.created);
        assert_eq!(fake.instance_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_addresses_appear() {
        let fake = FakeProvider::new();
        let start = tokio::time::Instant::now();
        let report = provisioner(&fake)
            .create_machine(machine("worker-1", "fake", json!({"addressAfterPolls": 3}), "ubuntu"))
            .await;

        assert!(report.is_success());
        assert_eq!(start.elapsed(), ADDRESS_POLL_INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts() {
        let fake = FakeProvider::new();
        let report = provisioner(&fake)
            .with_address_polling(Duration::from_secs(1), 2)
            .create_machine(machine("worker-1", "fake", json!({"addressAfterPolls": 10}), "ubuntu"))
            .await;

        let err = report.result.unwrap_err();
        assert!(matches!(err, ProvisionError::NoAddresses { attempts: 2, .. }));
        assert_eq!(err.classify(), ErrorClass::Transient);
        // 一時的な失敗はステータスに書かない
        assert!(report.machine.status.is_none());
    }

    #[tokio::test]
    async fn test_terminal_failures_land_on_status() {
        let fake = FakeProvider::new();
        let provisioner = provisioner(&fake);

        let rejected = provisioner
            .create_machine(machine("bad", "fake", json!({"passValidation": false}), "ubuntu"))
            .await;
        let status = rejected.machine.status.as_ref().unwrap();
        assert_eq!(status.error_reason.as_deref(), Some("InvalidConfiguration"));
        assert_eq!(status.error_message.as_deref(), Some("failing validation as requested"));

        let out_of_stock = provisioner
            .create_machine(machine(
                "full",
                "fake",
                json!({"createError": "InsufficientResources"}),
                "ubuntu",
            ))
            .await;
        let status = out_of_stock.machine.status.as_ref().unwrap();
        assert_eq!(
            status.error_reason.as_deref(),
            Some(MachineErrorReason::InsufficientResources.as_str())
        );

        let unknown = provisioner
            .create_machine(machine("aws", "aws", json!({}), "ubuntu"))
            .await;
        let status = unknown.machine.status.as_ref().unwrap();
        assert_eq!(status.error_reason.as_deref(), Some("InvalidConfiguration"));
        assert!(status.error_message.as_deref().unwrap().contains("aws"));
        assert_eq!(fake.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_batch() {
        let fake = FakeProvider::new();
        let reports = provisioner(&fake)
            .create_machines(vec![
                machine("bad", "fake", json!({"passValidation": false}), "ubuntu"),
                machine("good", "fake", json!({}), "ubuntu"),
            ])
            .await;

        assert_eq!(reports.len(), 2);
        assert!(!reports[0].is_success());
        assert!(reports[1].is_success());
        assert_eq!(reports[1].machine.name(), "good");
    }

    #[tokio::test]
    async fn test_preinstalled_engine_os_with_extra_userdata() {
        let fake = FakeProvider::new();
        let report = provisioner(&fake)
            .with_extra_userdata("echo hello")
            .create_machine(machine("worker-1", "fake", json!({}), "flatcar"))
            .await;
        assert!(report.is_success());
    }
}
