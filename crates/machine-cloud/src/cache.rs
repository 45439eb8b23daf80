//! Validation result cache
//!
//! Validating a spec may cost several cloud API calls. Results are keyed by
//! the SHA-256 of the canonical JSON of `spec.providerSpec`, so machines that
//! differ only in name, taints or kubelet version share an entry.
//! Transient failures are never cached.

use crate::error::{ErrorClass, Result, TerminalError};
use crate::instance::Instance;
use crate::provider::{MetricsLabels, Provider, ProviderData};
use async_trait::async_trait;
use machine_core::{Machine, MachineSpec};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_VALIDATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached result of a validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Passed,
    Rejected(TerminalError),
}

#[derive(Debug)]
struct Entry {
    stored_at: Instant,
    outcome: ValidationOutcome,
}

/// Content-addressed TTL cache of validation outcomes
#[derive(Debug)]
pub struct ValidationCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATION_TTL)
    }
}

impl ValidationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache key for a spec; only `providerSpec` contributes
    pub fn key(spec: &MachineSpec) -> String {
        let value = spec.provider_spec.value.as_ref().map(canonical);
        let mut hasher = Sha256::new();
        match value {
            Some(value) => hasher.update(value.to_string().as_bytes()),
            None => hasher.update(b"null"),
        }
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, spec: &MachineSpec) -> Option<ValidationOutcome> {
        let key = Self::key(spec);
        let mut entries = self.entries.lock().ok()?;
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.outcome.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, spec: &MachineSpec, outcome: ValidationOutcome) {
        let key = Self::key(spec);
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
            entries.insert(
                key,
                Entry {
                    stored_at: Instant::now(),
                    outcome,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Re-orders object keys so equal documents hash equally
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Wraps a provider so `validate` consults a [`ValidationCache`]
pub struct ValidationCachingProvider {
    inner: Box<dyn Provider>,
    cache: Arc<ValidationCache>,
}

impl ValidationCachingProvider {
    pub fn new(inner: Box<dyn Provider>, cache: Arc<ValidationCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }
}

#[async_trait]
impl Provider for ValidationCachingProvider {
    fn add_defaults(&self, spec: MachineSpec) -> Result<MachineSpec> {
        self.inner.add_defaults(spec)
    }

    async fn validate(&self, spec: &MachineSpec) -> Result<()> {
        if let Some(outcome) = self.cache.get(spec) {
            tracing::debug!("Validation cache hit");
            return match outcome {
                ValidationOutcome::Passed => Ok(()),
                ValidationOutcome::Rejected(terminal) => Err(terminal.into()),
            };
        }

        match self.inner.validate(spec).await {
            Ok(()) => {
                self.cache.set(spec, ValidationOutcome::Passed);
                Ok(())
            }
            Err(err) => {
                if err.classify() == ErrorClass::Terminal
                    && let Some(terminal) = err.as_terminal()
                {
                    self.cache.set(spec, ValidationOutcome::Rejected(terminal));
                }
                Err(err)
            }
        }
    }

    async fn get(&self, machine: &Machine, data: &ProviderData) -> Result<Box<dyn Instance>> {
        self.inner.get(machine, data).await
    }

    async fn create(
        &self,
        machine: &Machine,
        data: &ProviderData,
        userdata: &str,
    ) -> Result<Box<dyn Instance>> {
        self.inner.create(machine, data, userdata).await
    }

    async fn cleanup(&self, machine: &Machine, data: &ProviderData) -> Result<bool> {
        self.inner.cleanup(machine, data).await
    }

    async fn migrate_uid(&self, machine: &Machine, new_uid: &str) -> Result<()> {
        self.inner.migrate_uid(machine, new_uid).await
    }

    async fn get_cloud_config(&self, spec: &MachineSpec) -> Result<(String, String)> {
        self.inner.get_cloud_config(spec).await
    }

    fn machine_metrics_labels(&self, machine: &Machine) -> Result<MetricsLabels> {
        self.inner.machine_metrics_labels(machine)
    }

    fn set_metrics_for_machines(&self, machines: &[Machine]) -> Result<()> {
        self.inner.set_metrics_for_machines(machines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MachineErrorReason;
    use crate::fake::FakeProvider;
    use k8s_openapi::api::core::v1::Taint;
    use machine_core::ProviderSpec;
    use serde_json::json;

    fn spec_with(value: Value) -> MachineSpec {
        MachineSpec {
            provider_spec: ProviderSpec { value: Some(value) },
            ..Default::default()
        }
    }

    #[test]
    fn test_key_ignores_everything_but_provider_spec() {
        let cache = ValidationCache::default();
        let mut m1 = spec_with(json!({"key": "m1"}));
        cache.set(&m1, ValidationOutcome::Passed);

        m1.metadata.name = Some("wurst".to_string());
        m1.taints.push(Taint {
            key: "dedicated".to_string(),
            effect: "NoSchedule".to_string(),
            ..Default::default()
        });
        m1.versions.kubelet = "1.30.2".to_string();
        assert_eq!(cache.get(&m1), Some(ValidationOutcome::Passed));

        let m2 = spec_with(json!({"key": "m2"}));
        assert_eq!(cache.get(&m2), None);
    }

    #[test]
    fn test_key_is_independent_of_key_order() {
        let a = spec_with(json!({"a": 1, "b": {"x": true, "y": [1, 2]}}));
        let b = spec_with(serde_json::from_str(r#"{"b": {"y": [1, 2], "x": true}, "a": 1}"#).unwrap());
        assert_eq!(ValidationCache::key(&a), ValidationCache::key(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ValidationCache::new(Duration::from_secs(60));
        let spec = spec_with(json!({"key": "m1"}));
        cache.set(&spec, ValidationOutcome::Passed);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(&spec).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&spec).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_purges_expired_entries() {
        let cache = ValidationCache::new(Duration::from_secs(10));
        for i in 0..100 {
            cache.set(&spec_with(json!({"key": i})), ValidationOutcome::Passed);
        }
        assert_eq!(cache.len(), 100);

        tokio::time::advance(Duration::from_secs(60)).await;
        cache.set(&spec_with(json!({"key": "fresh"})), ValidationOutcome::Passed);
        assert_eq!(cache.len(), 1);
    }

    fn fake_spec(pass_validation: bool) -> MachineSpec {
        spec_with(json!({
            "cloudProvider": "fake",
            "cloudProviderSpec": {"passValidation": pass_validation},
            "operatingSystem": "ubuntu",
            "operatingSystemSpec": {}
        }))
    }

    #[tokio::test]
    async fn test_caching_provider_caches_pass_and_terminal_rejection() {
        let fake = FakeProvider::new();
        let cache = Arc::new(ValidationCache::default());
        let provider = ValidationCachingProvider::new(Box::new(fake.clone()), Arc::clone(&cache));

        provider.validate(&fake_spec(true)).await.unwrap();
        provider.validate(&fake_spec(true)).await.unwrap();
        assert_eq!(fake.validate_calls(), 1);

        let err = provider.validate(&fake_spec(false)).await.unwrap_err();
        assert_eq!(
            err.as_terminal().unwrap().reason,
            MachineErrorReason::InvalidConfiguration
        );
        let err = provider.validate(&fake_spec(false)).await.unwrap_err();
        assert!(err.as_terminal().is_some());
        assert_eq!(fake.validate_calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_caching_provider_skips_transient_failures() {
        let fake = FakeProvider::new();
        fake.fail_next_validation_transiently();
        let cache = Arc::new(ValidationCache::default());
        let provider = ValidationCachingProvider::new(Box::new(fake.clone()), Arc::clone(&cache));

        assert!(provider.validate(&fake_spec(true)).await.is_err());
        assert!(cache.is_empty());

        provider.validate(&fake_spec(true)).await.unwrap();
        assert_eq!(fake.validate_calls(), 2);
        assert_eq!(cache.len(), 1);
    }
}
