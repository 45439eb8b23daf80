//! Machine spec error types

use thiserror::Error;

/// Errors raised while reading or rewriting a machine's provider spec
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("machine {0} has no providerSpec.value")]
    MissingProviderSpec(String),

    #[error("failed to decode providerSpec: {0}")]
    InvalidProviderSpec(#[source] serde_json::Error),

    #[error("failed to decode cloudProviderSpec for {provider}: {source}")]
    InvalidCloudProviderSpec {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode operatingSystemSpec for {os}: {source}")]
    InvalidOperatingSystemSpec {
        os: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode providerSpec: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unknown cloud provider: {0}")]
    UnknownCloudProvider(String),
}

pub type Result<T> = std::result::Result<T, SpecError>;
