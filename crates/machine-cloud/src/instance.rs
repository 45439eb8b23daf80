//! Instance snapshot contract

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of a reported address, matching Kubernetes `NodeAddressType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressType {
    ExternalIP,
    InternalIP,
    ExternalDNS,
    InternalDNS,
    Hostname,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalIP => "ExternalIP",
            Self::InternalIP => "InternalIP",
            Self::ExternalDNS => "ExternalDNS",
            Self::InternalDNS => "InternalDNS",
            Self::Hostname => "Hostname",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a cloud instance
///
/// Vendor states that have no counterpart here map to `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Unknown,
    Creating,
    Running,
    Deleting,
    Deleted,
    Paused,
    Saved,
    Stopped,
    Stopping,
    Error,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Paused => "paused",
            Self::Saved => "saved",
            Self::Stopped => "stopped",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot of a cloud resource
///
/// Accessors read from the data captured at fetch time. Re-fetch through
/// [`crate::Provider::get`] to observe changes.
pub trait Instance: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn id(&self) -> &str;

    /// Provider-qualified ID, e.g. `hcloud://1234`
    fn provider_id(&self) -> String;

    fn addresses(&self) -> HashMap<String, AddressType>;

    fn status(&self) -> InstanceStatus;
}

/// Plain-data [`Instance`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInstance {
    pub name: String,
    pub id: String,
    pub provider_id: String,
    pub addresses: HashMap<String, AddressType>,
    pub status: InstanceStatus,
}

impl Instance for StaticInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn provider_id(&self) -> String {
        self.provider_id.clone()
    }

    fn addresses(&self) -> HashMap<String, AddressType> {
        self.addresses.clone()
    }

    fn status(&self) -> InstanceStatus {
        self.status
    }
}
