//! Cloud provider registry

use machine_cloud::{
    CloudProviderError, FakeProvider, Provider, Result, ValidationCache, ValidationCachingProvider,
};
use machine_cloud_hetzner::HetznerProvider;
use machine_cloud_vultr::VultrProvider;
use machine_config::ConfigVarResolver;
use machine_core::CloudProvider;
use std::sync::Arc;

/// Providers built into this controller
pub const BUILTIN_PROVIDERS: [CloudProvider; 3] =
    [CloudProvider::Fake, CloudProvider::Hetzner, CloudProvider::Vultr];

/// Constructs the provider for `cloud`
///
/// Each call returns a fresh value that holds only `resolver`. Identifiers the
/// envelope knows but this controller does not ship fail with
/// [`CloudProviderError::ProviderNotFound`].
pub fn for_provider(cloud: CloudProvider, resolver: ConfigVarResolver) -> Result<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match cloud {
        CloudProvider::Fake => Box::new(FakeProvider::with_resolver(resolver)),
        CloudProvider::Hetzner => Box::new(HetznerProvider::new(resolver)),
        CloudProvider::Vultr => Box::new(VultrProvider::new(resolver)),
        other => return Err(CloudProviderError::ProviderNotFound(other.to_string())),
    };
    Ok(provider)
}

/// Where the provisioner gets its providers from
pub trait ProviderSource: Send + Sync {
    fn provider(&self, cloud: CloudProvider) -> Result<Box<dyn Provider>>;
}

/// [`ProviderSource`] over [`for_provider`], optionally sharing a validation cache
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    resolver: ConfigVarResolver,
    validation_cache: Option<Arc<ValidationCache>>,
}

impl ProviderRegistry {
    pub fn new(resolver: ConfigVarResolver) -> Self {
        Self {
            resolver,
            validation_cache: None,
        }
    }

    pub fn with_validation_cache(mut self, cache: Arc<ValidationCache>) -> Self {
        self.validation_cache = Some(cache);
        self
    }

    pub fn resolver(&self) -> &ConfigVarResolver {
        &self.resolver
    }
}

impl ProviderSource for ProviderRegistry {
    fn provider(&self, cloud: CloudProvider) -> Result<Box<dyn Provider>> {
        let provider = for_provider(cloud, self.resolver.clone())?;
        Ok(match &self.validation_cache {
            Some(cache) => Box::new(ValidationCachingProvider::new(provider, Arc::clone(cache))),
            None => provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_cloud::{ErrorClass, MachineErrorReason};
    use machine_core::{MachineSpec, ProviderSpec};
    use serde_json::json;

    #[test]
    fn test_builtin_providers_resolve() {
        for cloud in BUILTIN_PROVIDERS {
            assert!(
                for_provider(cloud, ConfigVarResolver::without_store()).is_ok(),
                "{cloud} should be built in"
            );
        }
    }

    #[test]
    fn test_other_providers_are_terminal_misses() {
        for cloud in CloudProvider::ALL
            .into_iter()
            .filter(|c| !BUILTIN_PROVIDERS.contains(c))
        {
            let err = for_provider(cloud, ConfigVarResolver::without_store())
                .err()
                .unwrap();
            assert!(matches!(err, CloudProviderError::ProviderNotFound(ref name) if name == cloud.as_str()));
            assert_eq!(err.classify(), ErrorClass::Terminal);
            assert_eq!(
                err.as_terminal().unwrap().reason,
                MachineErrorReason::InvalidConfiguration
            );
        }
    }

    #[tokio::test]
    async fn test_registry_shares_validation_cache() {
        let cache = Arc::new(ValidationCache::default());
        let registry = ProviderRegistry::new(ConfigVarResolver::without_store())
            .with_validation_cache(Arc::clone(&cache));

        let spec = MachineSpec {
            provider_spec: ProviderSpec {
                value: Some(json!({
                    "cloudProvider": "fake",
                    "cloudProviderSpec": {},
                    "operatingSystem": "ubuntu"
                })),
            },
            ..Default::default()
        };

        let first = registry.provider(CloudProvider::Fake).unwrap();
        first.validate(&spec).await.unwrap();
        assert_eq!(cache.len(), 1);

        let second = registry.provider(CloudProvider::Fake).unwrap();
        second.validate(&spec).await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
