use machine_cloud::{CloudProviderError, ErrorClass, TerminalError};
use machine_container::RuntimeError;
use thiserror::Error;

/// Failure provisioning a single machine
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Cloud(#[from] CloudProviderError),

    #[error("failed to render userdata: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("instance {provider_id} has no addresses after {attempts} attempts")]
    NoAddresses { provider_id: String, attempts: u32 },
}

impl ProvisionError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Cloud(err) => err.classify(),
            Self::Runtime(RuntimeError::Config(_)) => ErrorClass::Transient,
            Self::Runtime(_) => ErrorClass::Terminal,
            Self::NoAddresses { .. } => ErrorClass::Transient,
        }
    }

    /// Reason and message to record on the Machine status
    pub fn as_terminal(&self) -> Option<TerminalError> {
        match self {
            Self::Cloud(err) => err.as_terminal(),
            Self::Runtime(RuntimeError::Config(_)) | Self::NoAddresses { .. } => None,
            Self::Runtime(err) => Some(TerminalError::invalid_configuration(err.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
