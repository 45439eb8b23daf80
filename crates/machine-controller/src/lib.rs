//! machine-controller
//!
//! Wires the provider registry, the container runtime configuration and the
//! provisioner together. The binary in `main.rs` is a thin CLI over this
//! library.
//!
//! ```ignore
//! let registry = ProviderRegistry::new(resolver);
//! let runtime = machine_container::build_config(&opts, store).await?;
//! let reports = Provisioner::new(registry, runtime)
//!     .create_machines(machines)
//!     .await;
//! ```

pub mod error;
pub mod provisioner;
pub mod registry;
pub mod userdata;

pub use error::{ProvisionError, Result};
pub use provisioner::{
    ADDRESS_POLL_ATTEMPTS, ADDRESS_POLL_INTERVAL, MachineReport, ProvisionedInstance, Provisioner,
};
pub use registry::{BUILTIN_PROVIDERS, ProviderRegistry, ProviderSource, for_provider};
pub use userdata::build_userdata;
