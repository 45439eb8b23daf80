//! Registry credentials from a Kubernetes Secret
//!
//! Two secret layouts are accepted:
//!
//! 1. `kubernetes.io/dockerconfigjson`: the `.dockerconfigjson` key holds a
//!    Docker `config.json`; its `auths` map is used.
//! 2. Flat: every key is a registry name, every value a JSON [`AuthConfig`].
//!
//! Any malformed entry fails the whole lookup.

use crate::error::{Result, RuntimeError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use machine_config::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Credentials for one registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Base64 of `username:password`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,
    #[serde(default, rename = "identitytoken", skip_serializing_if = "String::is_empty")]
    pub identity_token: String,
    #[serde(default, rename = "registrytoken", skip_serializing_if = "String::is_empty")]
    pub registry_token: String,
}

impl AuthConfig {
    /// Fills `username` / `password` from `auth` when they are empty
    fn expand(mut self, registry: &str, secret: &str) -> Result<Self> {
        if self.auth.is_empty() || !(self.username.is_empty() && self.password.is_empty()) {
            return Ok(self);
        }
        let invalid = |message: String| RuntimeError::InvalidCredentials {
            secret: secret.to_string(),
            message,
        };
        let decoded = STANDARD
            .decode(self.auth.trim())
            .map_err(|e| invalid(format!("{registry}: failed to decode auth: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| invalid(format!("{registry}: auth is not valid UTF-8")))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| invalid(format!("{registry}: auth is not 'username:password'")))?;
        self.username = username.to_string();
        self.password = password.to_string();
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct DockerConfigJson {
    #[serde(default)]
    auths: BTreeMap<String, AuthConfig>,
}

/// Parses `namespace/name`
pub fn parse_secret_ref(input: &str) -> Result<(String, String)> {
    match input.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => Err(RuntimeError::InvalidCredentialsSecretRef(input.to_string())),
    }
}

/// Loads registry credentials from `namespace/name`
pub async fn load_registry_credentials(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
) -> Result<BTreeMap<String, AuthConfig>> {
    let secret_name = format!("{namespace}/{name}");
    let secret = store.secret(namespace, name).await?;
    let data = secret.data.unwrap_or_default();

    let invalid = |message: String| RuntimeError::InvalidCredentials {
        secret: secret_name.clone(),
        message,
    };

    let is_docker_config = secret.type_.as_deref() == Some(DOCKER_CONFIG_JSON_TYPE)
        || data.contains_key(DOCKER_CONFIG_JSON_KEY);

    let raw: BTreeMap<String, AuthConfig> = if is_docker_config {
        let bytes = data
            .get(DOCKER_CONFIG_JSON_KEY)
            .ok_or_else(|| invalid(format!("missing key {DOCKER_CONFIG_JSON_KEY}")))?;
        let config: DockerConfigJson = serde_json::from_slice(&bytes.0)
            .map_err(|e| invalid(format!("{DOCKER_CONFIG_JSON_KEY}: {e}")))?;
        config.auths
    } else {
        let mut auths = BTreeMap::new();
        for (registry, bytes) in &data {
            let auth: AuthConfig = serde_json::from_slice(&bytes.0)
                .map_err(|e| invalid(format!("{registry}: {e}")))?;
            auths.insert(registry.clone(), auth);
        }
        auths
    };

    let mut credentials = BTreeMap::new();
    for (registry, auth) in raw {
        let auth = auth.expand(&registry, &secret_name)?;
        credentials.insert(registry, auth);
    }
    tracing::debug!(secret = %secret_name, registries = credentials.len(), "Loaded registry credentials");
    Ok(credentials)
}
