//! ConfigVarResolver
//!
//! 取得結果はキャッシュしません。Secret / ConfigMap は呼び出しごとに取得します。

use crate::error::{ConfigError, Result};
use crate::store::ObjectStore;
use machine_core::{
    ConfigVarBool, ConfigVarString, GlobalConfigMapKeySelector, GlobalSecretKeySelector,
};
use std::sync::Arc;

/// `ConfigVarString` / `ConfigVarBool` を値に解決する
#[derive(Clone, Default)]
pub struct ConfigVarResolver {
    store: Option<Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for ConfigVarResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigVarResolver")
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl ConfigVarResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Kubernetes クライアントなしで作成（参照を含む値は解決できない）
    pub fn without_store() -> Self {
        Self { store: None }
    }

    pub fn store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.store.as_ref()
    }

    /// 値を解決する
    ///
    /// 空文字列はエラーにしない。必須かどうかの判断は呼び出し側で行う。
    pub async fn get_string_value(&self, var: &ConfigVarString) -> Result<String> {
        if !var.value.is_empty() {
            return Ok(var.value.clone());
        }
        if let Some(selector) = &var.secret_key_ref {
            return self.secret_value(selector).await;
        }
        if let Some(selector) = &var.config_map_key_ref {
            return self.config_map_value(selector).await;
        }
        Ok(String::new())
    }

    /// 値を解決し、空であれば環境変数 `env_name` にフォールバックする
    pub async fn get_string_value_or_env(
        &self,
        var: &ConfigVarString,
        env_name: &str,
    ) -> Result<String> {
        let value = self.get_string_value(var).await?;
        if !value.is_empty() {
            return Ok(value);
        }
        Ok(std::env::var(env_name).unwrap_or_default())
    }

    pub async fn get_bool_value(&self, var: &ConfigVarBool) -> Result<bool> {
        let (value, _) = self.get_bool_value_found(var).await?;
        Ok(value)
    }

    /// `(値, 明示的に設定されていたか)` を返す
    pub async fn get_bool_value_found(&self, var: &ConfigVarBool) -> Result<(bool, bool)> {
        if let Some(value) = var.value {
            return Ok((value, true));
        }
        if let Some(selector) = &var.secret_key_ref {
            let raw = self.secret_value(selector).await?;
            return Ok((parse_bool(&raw)?, true));
        }
        if let Some(selector) = &var.config_map_key_ref {
            let raw = self.config_map_value(selector).await?;
            return Ok((parse_bool(&raw)?, true));
        }
        Ok((false, false))
    }

    pub async fn get_bool_value_or_env(&self, var: &ConfigVarBool, env_name: &str) -> Result<bool> {
        let (value, _) = self.get_bool_value_or_env_found(var, env_name).await?;
        Ok(value)
    }

    pub async fn get_bool_value_or_env_found(
        &self,
        var: &ConfigVarBool,
        env_name: &str,
    ) -> Result<(bool, bool)> {
        let (value, found) = self.get_bool_value_found(var).await?;
        if found {
            return Ok((value, true));
        }
        match std::env::var(env_name) {
            Ok(raw) if !raw.is_empty() => {
                let value = parse_bool(&raw).map_err(|_| ConfigError::InvalidEnvBool {
                    name: env_name.to_string(),
                    value: raw.clone(),
                })?;
                Ok((value, true))
            }
            _ => Ok((false, false)),
        }
    }

    async fn secret_value(&self, selector: &GlobalSecretKeySelector) -> Result<String> {
        let store = self.store.as_ref().ok_or_else(|| ConfigError::NoObjectStore {
            kind: "secret",
            namespace: selector.namespace.clone(),
            name: selector.name.clone(),
        })?;
        let secret = store.secret(&selector.namespace, &selector.name).await?;

        let missing = || ConfigError::KeyMissing {
            kind: "secret",
            namespace: selector.namespace.clone(),
            name: selector.name.clone(),
            key: selector.key.clone(),
        };

        if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(&selector.key)) {
            return String::from_utf8(bytes.0.clone()).map_err(|_| ConfigError::InvalidUtf8 {
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
                key: selector.key.clone(),
            });
        }
        secret
            .string_data
            .as_ref()
            .and_then(|d| d.get(&selector.key))
            .cloned()
            .ok_or_else(missing)
    }

    async fn config_map_value(&self, selector: &GlobalConfigMapKeySelector) -> Result<String> {
        let store = self.store.as_ref().ok_or_else(|| ConfigError::NoObjectStore {
            kind: "configmap",
            namespace: selector.namespace.clone(),
            name: selector.name.clone(),
        })?;
        let config_map = store.config_map(&selector.namespace, &selector.name).await?;
        config_map
            .data
            .as_ref()
            .and_then(|d| d.get(&selector.key))
            .cloned()
            .ok_or_else(|| ConfigError::KeyMissing {
                kind: "configmap",
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
                key: selector.key.clone(),
            })
    }
}

/// Go の `strconv.ParseBool` と同じ表記を受け付ける
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(ConfigError::InvalidBool(other.to_string())),
    }
}
