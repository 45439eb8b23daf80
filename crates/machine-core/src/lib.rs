//! Machine resource model for machine-controller
//!
//! This crate holds the types shared by every other crate in the workspace:
//!
//! - [`Machine`] and [`MachineSpec`], the Kubernetes custom resource a
//!   provider turns into a cloud instance
//! - [`ProviderConfig`], the provider-agnostic envelope stored in
//!   `spec.providerSpec.value`
//! - [`ConfigVarString`] / [`ConfigVarBool`], scalar config fields that may be
//!   literals or references to Secrets and ConfigMaps
//!
//! The `cloudProviderSpec` and `operatingSystemSpec` payloads are kept as raw
//! JSON at this layer; only the provider selected by `cloudProvider` decodes
//! its own payload.

pub mod configvar;
pub mod error;
pub mod machine;
pub mod providerconfig;

pub use configvar::{
    ConfigVarBool, ConfigVarString, GlobalConfigMapKeySelector, GlobalSecretKeySelector,
};
pub use error::{Result, SpecError};
pub use machine::{Machine, MachineSpec, MachineStatus, MachineVersionInfo, ProviderSpec};
pub use providerconfig::{
    CloudProvider, DnsConfig, IpFamily, NetworkConfig, OperatingSystem, ProviderConfig,
};
