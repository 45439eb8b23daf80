use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot resolve {kind} {namespace}/{name}: no Kubernetes client configured")]
    NoObjectStore {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("key '{key}' missing in {kind} {namespace}/{name}")]
    KeyMissing {
        kind: &'static str,
        namespace: String,
        name: String,
        key: String,
    },

    #[error("key '{key}' in secret {namespace}/{name} is not valid UTF-8")]
    InvalidUtf8 {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("invalid boolean value '{0}'")]
    InvalidBool(String),

    #[error("environment variable {name} holds an invalid boolean: '{value}'")]
    InvalidEnvBool { name: String, value: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
