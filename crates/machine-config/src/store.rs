//! Secret / ConfigMap の取得口

use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Api;

/// Secret と ConfigMap を名前で取得する
///
/// 見つからない場合は [`ConfigError::NotFound`] を返すこと。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    async fn config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap>;
}

/// kube クライアントによる実装
#[derive(Clone)]
pub struct KubeObjectStore {
    client: kube::Client,
}

impl KubeObjectStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// kubeconfig もしくは in-cluster 設定からクライアントを作成
    pub async fn try_default() -> Result<Self> {
        let client = kube::Client::try_default().await?;
        Ok(Self::new(client))
    }
}

fn map_not_found(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> ConfigError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ConfigError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => ConfigError::Kube(other),
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        tracing::debug!(namespace, name, "Fetching secret");
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .get(name)
            .await
            .map_err(|e| map_not_found(e, "secret", namespace, name))
    }

    async fn config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        tracing::debug!(namespace, name, "Fetching config map");
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        config_maps
            .get(name)
            .await
            .map_err(|e| map_not_found(e, "configmap", namespace, name))
    }
}
