//! Cloud provider abstraction for machine-controller
//!
//! Every cloud backend implements [`Provider`]; the instances it reports
//! implement [`Instance`]. Errors crossing this boundary are already
//! classified into the taxonomy in [`error`], so callers only branch on
//! terminal / transient / not-found.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │             machine-controller                   │
//! │       (registry / provisioner / CLI)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               machine-cloud                      │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Provider / trait Instance          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ error classes│  │ validation   │            │
//! │  │              │  │ cache        │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬──────────────┬────────┘
//!         │                 │              │
//! ┌───────▼───────┐ ┌───────▼───────┐ ┌────▼────┐
//! │    hetzner    │ │     vultr     │ │  fake   │
//! └───────────────┘ └───────────────┘ └─────────┘
//! ```

pub mod cache;
pub mod error;
pub mod fake;
pub mod instance;
pub mod provider;

// Re-exports
pub use cache::{
    DEFAULT_VALIDATION_TTL, ValidationCache, ValidationCachingProvider, ValidationOutcome,
};
pub use error::{
    CloudProviderError, ErrorClass, MachineErrorReason, Result, TerminalError, is_terminal_error,
};
pub use fake::{FAKE_FINALIZER, FakeProvider, FakeProviderSpec};
pub use instance::{AddressType, Instance, InstanceStatus, StaticInstance};
pub use provider::{
    MetricsLabels, Provider, ProviderData, decode_provider_config, resolve_cloud_config,
};
