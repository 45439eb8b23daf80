//! Vultr provider error types

use machine_cloud::{CloudProviderError, MachineErrorReason};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VultrError {
    #[error("Vultr API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VultrError>;

impl VultrError {
    /// The addressed resource does not exist; callers decide whether that
    /// resource was the instance
    pub fn is_not_found(&self) -> bool {
        matches!(self, VultrError::Api { status: 404, .. })
    }
}

/// Vultr reports capacity problems only in the message text
fn is_capacity_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["out of stock", "not available", "maximum", "limit"]
        .iter()
        .any(|needle| message.contains(needle))
}

impl From<VultrError> for CloudProviderError {
    fn from(err: VultrError) -> Self {
        match err {
            VultrError::Api {
                status: 401 | 403,
                message,
            } => CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                format!("invalid credentials: {message}"),
            ),
            VultrError::Api { status, message } if status < 500 && status != 429 && is_capacity_message(&message) => {
                CloudProviderError::terminal(MachineErrorReason::InsufficientResources, message)
            }
            VultrError::Api { status, message } => CloudProviderError::Api { status, message },
            VultrError::Http(e) => CloudProviderError::Transient(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_cloud::ErrorClass;

    fn api(status: u16, message: &str) -> CloudProviderError {
        VultrError::Api {
            status,
            message: message.to_string(),
        }
        .into()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            api(401, "Invalid API token.").as_terminal().unwrap().reason,
            MachineErrorReason::InvalidConfiguration
        );
        assert_eq!(api(404, "Invalid instance-id.").classify(), ErrorClass::Transient);
        assert_eq!(
            api(400, "Plan is out of stock in this region").as_terminal().unwrap().reason,
            MachineErrorReason::InsufficientResources
        );
        assert_eq!(api(503, "Service Unavailable").classify(), ErrorClass::Transient);
        assert_eq!(api(429, "Rate limit reached").classify(), ErrorClass::Transient);
    }
}
