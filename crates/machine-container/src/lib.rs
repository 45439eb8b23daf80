//! Container runtime configuration for machine-controller nodes
//!
//! Turns operator options into the engine a node bootstraps with:
//!
//! 1. [`build_config`] validates mirrors and insecure registries and resolves
//!    registry credentials from a Secret.
//! 2. [`RuntimeConfig::engine`] picks docker or containerd for a kubelet
//!    version. From 1.24.0 on it is always containerd.
//! 3. [`Engine`] renders the daemon config, the credentials file and the OS
//!    install script.
//!
//! ```ignore
//! let config = build_config(&opts, resolver.store().map(|s| s.as_ref())).await?;
//! let engine = config.engine("1.30.2")?;
//! let toml = engine.config()?;
//! let script = engine.script_for(&OperatingSystem::Ubuntu)?;
//! ```

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod mirrors;
pub mod scripts;

pub use config::{
    CONTAINER_RUNTIME_FLAG_REMOVED_IN, DEFAULT_CONTAINERD_VERSION, DEFAULT_SANDBOX_IMAGE,
    DOCKERSHIM_REMOVED_IN, EngineKind, Opts, RuntimeConfig, build_config, parse_kubelet_version,
    select_engine,
};
pub use credentials::{AuthConfig, load_registry_credentials, parse_secret_ref};
pub use engine::{ContainerdConfig, DockerConfig, Engine, RuntimeEngine};
pub use error::{Result, RuntimeError};
pub use mirrors::{DEFAULT_REGISTRY, parse_insecure_registries, parse_registry_mirrors};
