//! Vultr provider for machine-controller
//!
//! Uses the Vultr v2 REST API. Each instance is tagged with the owning
//! Machine's UID; `get` filters instances by that tag.
//!
//! The API key comes from `cloudProviderSpec.apiKey` or the controller's
//! `VULTR_API_KEY` environment variable.

pub mod client;
pub mod error;
pub mod provider;

pub use client::{VULTR_API_BASE, VultrClient, VultrInstance};
pub use error::{Result, VultrError};
pub use provider::{API_KEY_ENV, VultrProvider, VultrProviderSpec, VultrServer};
