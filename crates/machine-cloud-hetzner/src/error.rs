//! Hetzner provider error types

use machine_cloud::{CloudProviderError, MachineErrorReason};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HetznerError {
    #[error("hcloud API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected hcloud response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HetznerError {
    /// The addressed resource does not exist
    ///
    /// Only the caller knows whether that resource is the instance, so a 404
    /// is not mapped to `InstanceNotFound` here.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HetznerError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, HetznerError>;

/// hcloud error codes that mean the project or location is out of capacity
const CAPACITY_CODES: &[&str] = &[
    "resource_unavailable",
    "resource_limit_exceeded",
    "placement_error",
];

impl From<HetznerError> for CloudProviderError {
    fn from(err: HetznerError) -> Self {
        match err {
            HetznerError::Api {
                status: 401 | 403,
                message,
                ..
            } => CloudProviderError::terminal(
                MachineErrorReason::InvalidConfiguration,
                format!("invalid credentials: {message}"),
            ),
            HetznerError::Api { code, message, .. } if CAPACITY_CODES.contains(&code.as_str()) => {
                CloudProviderError::terminal(MachineErrorReason::InsufficientResources, message)
            }
            HetznerError::Api {
                status, message, ..
            } => CloudProviderError::Api { status, message },
            HetznerError::Http(e) => CloudProviderError::Transient(e.into()),
            HetznerError::Decode(e) => CloudProviderError::Transient(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_cloud::ErrorClass;

    fn api(status: u16, code: &str) -> HetznerError {
        HetznerError::Api {
            status,
            code: code.to_string(),
            message: "nope".to_string(),
        }
    }

    #[test]
    fn test_classification() {
        let err = CloudProviderError::from(api(401, "unauthorized"));
        assert_eq!(
            err.as_terminal().unwrap().reason,
            MachineErrorReason::InvalidConfiguration
        );

        let not_found = api(404, "not_found");
        assert!(not_found.is_not_found());
        let err = CloudProviderError::from(not_found);
        assert_eq!(err.classify(), ErrorClass::Transient);

        let err = CloudProviderError::from(api(412, "resource_unavailable"));
        assert_eq!(
            err.as_terminal().unwrap().reason,
            MachineErrorReason::InsufficientResources
        );

        let err = CloudProviderError::from(api(429, "rate_limit_exceeded"));
        assert_eq!(err.classify(), ErrorClass::Transient);
    }
}
