//! メモリ上の ObjectStore（テスト・ドライラン用）

use crate::error::{ConfigError, Result};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    secrets: BTreeMap<(String, String), Secret>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
}

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque Secret を登録
    pub fn with_secret<'a>(
        self,
        namespace: &str,
        name: &str,
        data: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        self.with_typed_secret(namespace, name, "Opaque", data)
    }

    /// type 付きの Secret を登録（例: `kubernetes.io/dockerconfigjson`）
    pub fn with_typed_secret<'a>(
        mut self,
        namespace: &str,
        name: &str,
        secret_type: &str,
        data: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let data: BTreeMap<String, ByteString> = data
            .into_iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        let secret = Secret {
            metadata: meta(namespace, name),
            type_: Some(secret_type.to_string()),
            data: Some(data),
            ..Default::default()
        };
        self.secrets
            .insert((namespace.to_string(), name.to_string()), secret);
        self
    }

    pub fn with_config_map<'a>(
        mut self,
        namespace: &str,
        name: &str,
        data: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let data: BTreeMap<String, String> = data
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config_map = ConfigMap {
            metadata: meta(namespace, name),
            data: Some(data),
            ..Default::default()
        };
        self.config_maps
            .insert((namespace.to_string(), name.to_string()), config_map);
        self
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ConfigError::NotFound {
                kind: "secret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        self.config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ConfigError::NotFound {
                kind: "configmap",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
