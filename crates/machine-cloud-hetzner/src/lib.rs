//! Hetzner Cloud provider for machine-controller
//!
//! Talks to the hcloud REST API directly. Servers are found through the
//! `machine-uid` label, so lookups survive controller restarts and renames.
//!
//! # Requirements
//!
//! - An API token, either in `cloudProviderSpec.token` (literal or
//!   `secretKeyRef`) or in the controller's `HZ_TOKEN` environment variable
//!
//! # Example
//!
//! ```ignore
//! use machine_cloud::{Provider, ProviderData};
//! use machine_cloud_hetzner::HetznerProvider;
//! use machine_config::ConfigVarResolver;
//!
//! let provider = HetznerProvider::new(ConfigVarResolver::without_store());
//! provider.validate(&machine.spec).await?;
//! let instance = provider.create(&machine, &ProviderData::new(), userdata).await?;
//! println!("{}", instance.provider_id()); // hcloud://4711
//! ```

pub mod client;
pub mod error;
pub mod provider;

pub use client::{HCLOUD_API_BASE, HcloudClient, Server};
pub use error::{HetznerError, Result};
pub use provider::{HetznerProvider, HetznerProviderSpec, HetznerServer, TOKEN_ENV};
