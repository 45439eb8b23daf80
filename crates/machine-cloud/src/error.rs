//! Error taxonomy shared by every provider
//!
//! Three classes matter to callers:
//!
//! - **Terminal**: retrying cannot help until an operator changes something.
//!   The reason and message are surfaced verbatim on the Machine status.
//! - **NotFound**: the cloud has no matching resource. Drives create-vs-reuse.
//! - **Transient**: anything else. The caller retries with its own backoff.

use machine_config::ConfigError;
use machine_core::SpecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed vocabulary of terminal failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineErrorReason {
    #[serde(rename = "InvalidConfiguration")]
    InvalidConfiguration,
    #[serde(rename = "UnsupportedChange")]
    Unsupported,
    #[serde(rename = "InsufficientResources")]
    InsufficientResources,
    #[serde(rename = "CreateError")]
    CreateMachine,
    #[serde(rename = "UpdateError")]
    UpdateMachine,
    #[serde(rename = "DeleteError")]
    DeleteMachine,
    #[serde(rename = "JoinClusterTimeoutError")]
    JoinCluster,
}

impl MachineErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::Unsupported => "UnsupportedChange",
            Self::InsufficientResources => "InsufficientResources",
            Self::CreateMachine => "CreateError",
            Self::UpdateMachine => "UpdateError",
            Self::DeleteMachine => "DeleteError",
            Self::JoinCluster => "JoinClusterTimeoutError",
        }
    }
}

impl fmt::Display for MachineErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that needs operator intervention
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}, reason: {reason}")]
pub struct TerminalError {
    pub reason: MachineErrorReason,
    pub message: String,
}

impl TerminalError {
    pub fn new(reason: MachineErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(MachineErrorReason::InvalidConfiguration, message)
    }

    pub fn insufficient_resources(message: impl Into<String>) -> Self {
        Self::new(MachineErrorReason::InsufficientResources, message)
    }
}

/// Errors returned by [`crate::Provider`] operations
#[derive(Error, Debug)]
pub enum CloudProviderError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error("instance not found")]
    InstanceNotFound,

    #[error("cloud provider '{0}' is not built into this controller")]
    ProviderNotFound(String),

    #[error("failed to resolve config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid provider spec: {0}")]
    Spec(#[from] SpecError),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Terminal,
    Transient,
    NotFound,
}

impl CloudProviderError {
    pub fn terminal(reason: MachineErrorReason, message: impl Into<String>) -> Self {
        Self::Terminal(TerminalError::new(reason, message))
    }

    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Terminal(_) | Self::ProviderNotFound(_) => ErrorClass::Terminal,
            Self::InstanceNotFound => ErrorClass::NotFound,
            Self::Config(_) | Self::Spec(_) | Self::Api { .. } => ErrorClass::Transient,
            Self::Transient(err) => {
                if terminal_in_chain(err).is_some() {
                    ErrorClass::Terminal
                } else {
                    ErrorClass::Transient
                }
            }
        }
    }

    pub fn is_instance_not_found(&self) -> bool {
        self.classify() == ErrorClass::NotFound
    }

    /// The terminal payload, if any
    ///
    /// `ProviderNotFound` is reported as an invalid configuration so it can be
    /// written onto the Machine status like any other terminal failure.
    pub fn as_terminal(&self) -> Option<TerminalError> {
        match self {
            Self::Terminal(t) => Some(t.clone()),
            Self::ProviderNotFound(_) => {
                Some(TerminalError::invalid_configuration(self.to_string()))
            }
            Self::Transient(err) => terminal_in_chain(err).cloned(),
            _ => None,
        }
    }
}

/// Finds a [`TerminalError`] anywhere in an error's source chain
pub fn is_terminal_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a TerminalError> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(terminal) = e.downcast_ref::<TerminalError>() {
            return Some(terminal);
        }
        if let Some(CloudProviderError::Terminal(terminal)) = e.downcast_ref::<CloudProviderError>() {
            return Some(terminal);
        }
        current = e.source();
    }
    None
}

fn terminal_in_chain(err: &anyhow::Error) -> Option<&TerminalError> {
    err.chain().find_map(is_terminal_error)
}

pub type Result<T> = std::result::Result<T, CloudProviderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_terminal_error_message() {
        let err = TerminalError::new(MachineErrorReason::InvalidConfiguration, "token missing");
        assert_eq!(err.to_string(), "token missing, reason: InvalidConfiguration");
    }

    #[test]
    fn test_is_terminal_error() {
        let err = TerminalError::new(MachineErrorReason::CreateMachine, "Y");
        let found = is_terminal_error(&err).unwrap();
        assert_eq!(found.reason, MachineErrorReason::CreateMachine);
        assert_eq!(found.message, "Y");

        let plain = std::io::Error::other("boom");
        assert!(is_terminal_error(&plain).is_none());
    }

    #[test]
    fn test_is_terminal_error_through_context() {
        let wrapped: anyhow::Error = Err::<(), _>(TerminalError::insufficient_resources("no stock"))
            .context("creating server")
            .unwrap_err();
        let err = CloudProviderError::from(wrapped);
        assert_eq!(err.classify(), ErrorClass::Terminal);
        assert_eq!(
            err.as_terminal().unwrap().reason,
            MachineErrorReason::InsufficientResources
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            CloudProviderError::InstanceNotFound.classify(),
            ErrorClass::NotFound
        );
        assert!(CloudProviderError::InstanceNotFound.is_instance_not_found());
        assert_eq!(
            CloudProviderError::Api {
                status: 503,
                message: "unavailable".into()
            }
            .classify(),
            ErrorClass::Transient
        );
        assert_eq!(
            CloudProviderError::from(anyhow::anyhow!("boom")).classify(),
            ErrorClass::Transient
        );
        assert_eq!(
            CloudProviderError::ProviderNotFound("aws".into()).classify(),
            ErrorClass::Terminal
        );
    }

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&MachineErrorReason::DeleteMachine).unwrap(),
            "\"DeleteError\""
        );
        let reason: MachineErrorReason =
            serde_json::from_str("\"InsufficientResources\"").unwrap();
        assert_eq!(reason, MachineErrorReason::InsufficientResources);
        assert_eq!(MachineErrorReason::Unsupported.to_string(), "UnsupportedChange");
    }
}
