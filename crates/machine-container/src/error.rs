//! Container runtime configuration errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("unsupported container runtime '{0}' (expected docker or containerd)")]
    UnsupportedRuntime(String),

    #[error("invalid registry mirror '{mirror}': {reason}")]
    InvalidMirror { mirror: String, reason: String },

    #[error("registry credentials secret must be '<namespace>/<name>', got '{0}'")]
    InvalidCredentialsSecretRef(String),

    #[error("malformed registry credentials in secret {secret}: {message}")]
    InvalidCredentials { secret: String, message: String },

    #[error(transparent)]
    Config(#[from] machine_config::ConfigError),

    #[error("invalid kubelet version '{version}': {source}")]
    InvalidKubeletVersion {
        version: String,
        source: semver::Error,
    },

    #[error("unknown operating system '{0}'")]
    UnknownOperatingSystem(String),

    #[error("failed to render bootstrap script: {0}")]
    Template(#[from] tera::Error),

    #[error("failed to encode containerd config: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
