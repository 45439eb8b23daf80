//! Provider config envelope
//!
//! `spec.providerSpec.value` of every Machine holds a [`ProviderConfig`]. The
//! envelope is decoded first; the `cloudProviderSpec` payload stays raw JSON
//! until the provider selected by `cloudProvider` decodes it with
//! [`ProviderConfig::cloud_provider_spec`].

use crate::error::{Result, SpecError};
use crate::machine::MachineSpec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generic wrapper persisted inside a Machine's opaque spec field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,

    pub cloud_provider: CloudProvider,

    #[serde(default)]
    pub cloud_provider_spec: serde_json::Value,

    pub operating_system: OperatingSystem,

    #[serde(default)]
    pub operating_system_spec: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_cloud_config: Option<String>,
}

impl ProviderConfig {
    /// Decodes the envelope from a machine spec
    pub fn from_machine_spec(spec: &MachineSpec) -> Result<Self> {
        let value = spec
            .provider_spec
            .value
            .as_ref()
            .ok_or_else(|| SpecError::MissingProviderSpec(spec_name(spec)))?;
        serde_json::from_value(value.clone()).map_err(SpecError::InvalidProviderSpec)
    }

    /// Decodes the provider-specific payload into the provider's own schema
    pub fn cloud_provider_spec<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = if self.cloud_provider_spec.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.cloud_provider_spec.clone()
        };
        serde_json::from_value(payload).map_err(|source| SpecError::InvalidCloudProviderSpec {
            provider: self.cloud_provider.to_string(),
            source,
        })
    }

    pub fn operating_system_spec<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = if self.operating_system_spec.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.operating_system_spec.clone()
        };
        serde_json::from_value(payload).map_err(|source| SpecError::InvalidOperatingSystemSpec {
            os: self.operating_system.to_string(),
            source,
        })
    }

    /// Replaces the provider payload with a re-encoded provider spec
    pub fn set_cloud_provider_spec<T: Serialize>(&mut self, spec: &T) -> Result<()> {
        self.cloud_provider_spec = serde_json::to_value(spec).map_err(SpecError::Encode)?;
        Ok(())
    }

    /// Returns a copy of `spec` carrying this envelope as its provider spec
    pub fn apply_to(&self, spec: &MachineSpec) -> Result<MachineSpec> {
        let mut spec = spec.clone();
        spec.provider_spec.value = Some(serde_json::to_value(self).map_err(SpecError::Encode)?);
        Ok(spec)
    }
}

fn spec_name(spec: &MachineSpec) -> String {
    spec.metadata
        .name
        .clone()
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Cloud backends understood by the envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CloudProvider {
    #[serde(rename = "alibaba")]
    Alibaba,
    #[serde(rename = "anexia")]
    Anexia,
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "baremetal")]
    Baremetal,
    #[serde(rename = "cherryservers")]
    CherryServers,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
    #[serde(rename = "edge")]
    Edge,
    #[serde(rename = "equinixmetal", alias = "packet")]
    EquinixMetal,
    #[default]
    #[serde(rename = "fake")]
    Fake,
    #[serde(rename = "gce")]
    Gce,
    #[serde(rename = "hetzner")]
    Hetzner,
    #[serde(rename = "kubevirt")]
    KubeVirt,
    #[serde(rename = "linode")]
    Linode,
    #[serde(rename = "nutanix")]
    Nutanix,
    #[serde(rename = "opennebula")]
    OpenNebula,
    #[serde(rename = "openstack")]
    OpenStack,
    #[serde(rename = "scaleway")]
    Scaleway,
    #[serde(rename = "vmware-cloud-director")]
    VmwareCloudDirector,
    #[serde(rename = "vsphere")]
    VSphere,
    #[serde(rename = "vultr")]
    Vultr,
}

impl CloudProvider {
    pub const ALL: [CloudProvider; 21] = [
        CloudProvider::Alibaba,
        CloudProvider::Anexia,
        CloudProvider::Aws,
        CloudProvider::Azure,
        CloudProvider::Baremetal,
        CloudProvider::CherryServers,
        CloudProvider::DigitalOcean,
        CloudProvider::Edge,
        CloudProvider::EquinixMetal,
        CloudProvider::Fake,
        CloudProvider::Gce,
        CloudProvider::Hetzner,
        CloudProvider::KubeVirt,
        CloudProvider::Linode,
        CloudProvider::Nutanix,
        CloudProvider::OpenNebula,
        CloudProvider::OpenStack,
        CloudProvider::Scaleway,
        CloudProvider::VmwareCloudDirector,
        CloudProvider::VSphere,
        CloudProvider::Vultr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Alibaba => "alibaba",
            CloudProvider::Anexia => "anexia",
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Baremetal => "baremetal",
            CloudProvider::CherryServers => "cherryservers",
            CloudProvider::DigitalOcean => "digitalocean",
            CloudProvider::Edge => "edge",
            CloudProvider::EquinixMetal => "equinixmetal",
            CloudProvider::Fake => "fake",
            CloudProvider::Gce => "gce",
            CloudProvider::Hetzner => "hetzner",
            CloudProvider::KubeVirt => "kubevirt",
            CloudProvider::Linode => "linode",
            CloudProvider::Nutanix => "nutanix",
            CloudProvider::OpenNebula => "opennebula",
            CloudProvider::OpenStack => "openstack",
            CloudProvider::Scaleway => "scaleway",
            CloudProvider::VmwareCloudDirector => "vmware-cloud-director",
            CloudProvider::VSphere => "vsphere",
            CloudProvider::Vultr => "vultr",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "packet" {
            return Ok(CloudProvider::EquinixMetal);
        }
        CloudProvider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SpecError::UnknownCloudProvider(s.to_string()))
    }
}

/// Operating system of the provisioned node
///
/// Values outside the supported set are preserved in [`OperatingSystem::Other`]
/// so that consumers can reject them with a message naming the OS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatingSystem {
    #[default]
    Ubuntu,
    CentOS,
    Rhel,
    Sles,
    Flatcar,
    AmazonLinux2,
    RockyLinux,
    Other(String),
}

impl OperatingSystem {
    pub const SUPPORTED: [OperatingSystem; 7] = [
        OperatingSystem::Ubuntu,
        OperatingSystem::CentOS,
        OperatingSystem::Rhel,
        OperatingSystem::Sles,
        OperatingSystem::Flatcar,
        OperatingSystem::AmazonLinux2,
        OperatingSystem::RockyLinux,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            OperatingSystem::Ubuntu => "ubuntu",
            OperatingSystem::CentOS => "centos",
            OperatingSystem::Rhel => "rhel",
            OperatingSystem::Sles => "sles",
            OperatingSystem::Flatcar => "flatcar",
            OperatingSystem::AmazonLinux2 => "amzn2",
            OperatingSystem::RockyLinux => "rockylinux",
            OperatingSystem::Other(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, OperatingSystem::Other(_))
    }
}

impl From<String> for OperatingSystem {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ubuntu" => OperatingSystem::Ubuntu,
            "centos" => OperatingSystem::CentOS,
            "rhel" => OperatingSystem::Rhel,
            "sles" => OperatingSystem::Sles,
            "flatcar" => OperatingSystem::Flatcar,
            "amzn2" => OperatingSystem::AmazonLinux2,
            "rockylinux" => OperatingSystem::RockyLinux,
            _ => OperatingSystem::Other(value),
        }
    }
}

impl From<OperatingSystem> for String {
    fn from(value: OperatingSystem) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for OperatingSystem {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(OperatingSystem::from(s.to_string()))
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static network configuration for providers without DHCP
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub cidr: String,

    #[serde(default)]
    pub gateway: String,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_family: Option<IpFamily>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpFamily {
    #[serde(rename = "IPv4")]
    IPv4,
    #[serde(rename = "IPv6")]
    IPv6,
    #[serde(rename = "IPv4+IPv6")]
    DualStack,
}
