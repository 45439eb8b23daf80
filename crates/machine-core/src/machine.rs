//! Machine custom resource (`cluster.k8s.io/v1alpha1`)

use k8s_openapi::api::core::v1::{NodeAddress, Taint};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub const MACHINE_API_VERSION: &str = "cluster.k8s.io/v1alpha1";
pub const MACHINE_KIND: &str = "Machine";

fn default_api_version() -> String {
    MACHINE_API_VERSION.to_string()
}

fn default_kind() -> String {
    MACHINE_KIND.to_string()
}

/// A declared compute instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: MachineSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineStatus>,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::default(),
            spec: MachineSpec::default(),
            status: None,
        }
    }
}

impl Machine {
    pub fn new(name: impl Into<String>, spec: MachineSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec,
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.metadata.uid = Some(uid.into());
        self
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// Kubernetes UID; providers that tag instances by UID key off this value
    pub fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut MachineStatus {
        self.status.get_or_insert_with(MachineStatus::default)
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.metadata
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(finalizer.to_string());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        if let Some(finalizers) = self.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
    }
}

/// Desired state of a machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Metadata propagated to the resulting node
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,

    #[serde(default)]
    pub provider_spec: ProviderSpec,

    #[serde(default)]
    pub versions: MachineVersionInfo,

    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Opaque provider configuration; see [`crate::ProviderConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineVersionInfo {
    #[serde(default)]
    pub kubelet: String,
}

/// Observed state of a machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<NodeAddress>,
}

impl MachineStatus {
    /// Records a terminal failure verbatim so an operator can act on it
    pub fn set_terminal_error(&mut self, reason: impl Into<String>, message: impl Into<String>) {
        self.error_reason = Some(reason.into());
        self.error_message = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error_reason = None;
        self.error_message = None;
    }

    /// Replaces the recorded addresses; input pairs are `(address, type)`
    pub fn set_addresses<I, A, T>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = (A, T)>,
        A: Into<String>,
        T: Into<String>,
    {
        let mut addresses: Vec<NodeAddress> = addresses
            .into_iter()
            .map(|(address, type_)| NodeAddress {
                address: address.into(),
                type_: type_.into(),
            })
            .collect();
        addresses.sort_by(|a, b| (&a.type_, &a.address).cmp(&(&b.type_, &b.address)));
        self.addresses = addresses;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MACHINE_YAML: &str = r#"
apiVersion: cluster.k8s.io/v1alpha1
kind: Machine
metadata:
  name: worker-1
  namespace: kube-system
  uid: 4f1c1a4e-0d59-4c43-9f2b-7b3c7d0b8f10
spec:
  providerSpec:
    value:
      cloudProvider: hetzner
      cloudProviderSpec:
        serverType: cx22
        location: fsn1
      operatingSystem: ubuntu
      operatingSystemSpec: {}
      sshPublicKeys:
        - ssh-ed25519 AAAA
  versions:
    kubelet: 1.30.2
"#;

    #[test]
    fn test_machine_from_yaml() {
        let machine: Machine = serde_yaml::from_str(MACHINE_YAML).unwrap();
        assert_eq!(machine.name(), "worker-1");
        assert_eq!(machine.namespace(), Some("kube-system"));
        assert_eq!(machine.uid(), "4f1c1a4e-0d59-4c43-9f2b-7b3c7d0b8f10");
        assert_eq!(machine.spec.versions.kubelet, "1.30.2");
        assert!(machine.spec.provider_spec.value.is_some());
        assert!(machine.status.is_none());
    }

    #[test]
    fn test_finalizers() {
        let mut machine = Machine::new("m", MachineSpec::default());
        machine.add_finalizer("machine-delete-finalizer");
        machine.add_finalizer("machine-delete-finalizer");
        assert_eq!(machine.metadata.finalizers.as_ref().unwrap().len(), 1);
        assert!(machine.has_finalizer("machine-delete-finalizer"));

        machine.remove_finalizer("machine-delete-finalizer");
        assert!(!machine.has_finalizer("machine-delete-finalizer"));
    }

    #[test]
    fn test_status_terminal_error_and_addresses() {
        let mut machine = Machine::new("m", MachineSpec::default());
        machine
            .status_mut()
            .set_terminal_error("InvalidConfiguration", "token is empty");
        machine.status_mut().set_addresses([
            ("10.0.0.2", "InternalIP"),
            ("203.0.113.7", "ExternalIP"),
        ]);

        let status = machine.status.as_ref().unwrap();
        assert_eq!(status.error_reason.as_deref(), Some("InvalidConfiguration"));
        assert_eq!(status.error_message.as_deref(), Some("token is empty"));
        assert_eq!(status.addresses[0].type_, "ExternalIP");
        assert_eq!(status.addresses[1].address, "10.0.0.2");
    }
}
