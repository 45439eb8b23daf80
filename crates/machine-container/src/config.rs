//! Runtime options and engine selection

use crate::credentials::{AuthConfig, load_registry_credentials, parse_secret_ref};
use crate::engine::{ContainerdConfig, DockerConfig, Engine};
use crate::error::{Result, RuntimeError};
use crate::mirrors::{DEFAULT_REGISTRY, parse_insecure_registries, parse_registry_mirrors};
use machine_config::{ConfigError, ObjectStore};
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// First kubelet release without dockershim
pub const DOCKERSHIM_REMOVED_IN: Version = Version::new(1, 24, 0);

/// First kubelet release that rejects `--container-runtime`
pub const CONTAINER_RUNTIME_FLAG_REMOVED_IN: Version = Version::new(1, 27, 0);

pub const DEFAULT_SANDBOX_IMAGE: &str = "registry.k8s.io/pause:3.9";
pub const DEFAULT_CONTAINERD_VERSION: &str = "1.7*";
pub const DEFAULT_DOCKER_VERSION: &str = "20.10";

/// Container engine kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Docker,
    #[default]
    Containerd,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Containerd => "containerd",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "containerd" => Ok(Self::Containerd),
            _ => Err(RuntimeError::UnsupportedRuntime(s.to_string())),
        }
    }
}

/// Operator-facing runtime options, as they arrive from flags
#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// `docker`, `containerd` or empty
    pub container_runtime: String,
    pub containerd_version: String,
    /// Comma-separated
    pub insecure_registries: String,
    /// Comma-separated `[registry=]mirror`
    pub registry_mirrors: String,
    /// `namespace/name`
    pub registry_credentials_secret: String,
    pub pause_image: String,
    /// Engine used below the dockershim cutoff when nothing is requested
    pub default_runtime: EngineKind,
}

/// Validated runtime settings; the engine is chosen per kubelet version
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub requested: Option<EngineKind>,
    pub default_engine: EngineKind,
    pub insecure_registries: Vec<String>,
    pub registry_mirrors: BTreeMap<String, Vec<String>>,
    pub registry_credentials: BTreeMap<String, AuthConfig>,
    pub sandbox_image: String,
    pub containerd_version: String,
}

/// Builds the runtime settings from options
///
/// Mirrors are validated and credentials resolved here, so a bad option fails
/// before anything is rendered.
pub async fn build_config(opts: &Opts, store: Option<&dyn ObjectStore>) -> Result<RuntimeConfig> {
    let requested = match opts.container_runtime.trim() {
        "" => None,
        other => Some(other.parse()?),
    };

    let registry_credentials = match opts.registry_credentials_secret.trim() {
        "" => BTreeMap::new(),
        secret_ref => {
            let (namespace, name) = parse_secret_ref(secret_ref)?;
            let store = store.ok_or_else(|| ConfigError::NoObjectStore {
                kind: "secret",
                namespace: namespace.clone(),
                name: name.clone(),
            })?;
            load_registry_credentials(store, &namespace, &name).await?
        }
    };

    Ok(RuntimeConfig {
        requested,
        default_engine: opts.default_runtime,
        insecure_registries: parse_insecure_registries(&opts.insecure_registries),
        registry_mirrors: parse_registry_mirrors(&opts.registry_mirrors)?,
        registry_credentials,
        sandbox_image: non_empty_or(&opts.pause_image, DEFAULT_SANDBOX_IMAGE),
        containerd_version: non_empty_or(&opts.containerd_version, DEFAULT_CONTAINERD_VERSION),
    })
}

fn non_empty_or(value: &str, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        value => value.to_string(),
    }
}

/// Parses a kubelet version such as `v1.29.3`, `1.30` or `1.24.0-rc.1`
pub fn parse_kubelet_version(version: &str) -> Result<Version> {
    let trimmed = version.trim().trim_start_matches('v');
    let padded = match trimmed.split(['-', '+']).next().map(|core| core.matches('.').count()) {
        Some(1) => {
            let (core, rest) = trimmed.split_at(trimmed.find(['-', '+']).unwrap_or(trimmed.len()));
            format!("{core}.0{rest}")
        }
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).map_err(|source| RuntimeError::InvalidKubeletVersion {
        version: version.to_string(),
        source,
    })
}

/// Picks the engine for a kubelet version
///
/// Releases from [`DOCKERSHIM_REMOVED_IN`] on always get containerd; pre-releases
/// of those count as the release. Below it an explicit request wins, then the
/// configured default.
pub fn select_engine(
    kubelet_version: &str,
    requested: Option<EngineKind>,
    default_engine: EngineKind,
) -> Result<EngineKind> {
    let version = parse_kubelet_version(kubelet_version)?;
    let release = Version::new(version.major, version.minor, version.patch);
    if release >= DOCKERSHIM_REMOVED_IN {
        if requested == Some(EngineKind::Docker) {
            tracing::warn!(kubelet = %version, "Docker is not supported by this kubelet, using containerd");
        }
        return Ok(EngineKind::Containerd);
    }
    Ok(requested.unwrap_or(default_engine))
}

impl RuntimeConfig {
    pub fn engine_kind(&self, kubelet_version: &str) -> Result<EngineKind> {
        select_engine(kubelet_version, self.requested, self.default_engine)
    }

    /// The engine a node with `kubelet_version` bootstraps with
    pub fn engine(&self, kubelet_version: &str) -> Result<Engine> {
        let version = parse_kubelet_version(kubelet_version)?;
        let release = Version::new(version.major, version.minor, version.patch);
        let engine = match self.engine_kind(kubelet_version)? {
            EngineKind::Docker => Engine::Docker(DockerConfig {
                insecure_registries: self.insecure_registries.clone(),
                registry_mirrors: self
                    .registry_mirrors
                    .get(DEFAULT_REGISTRY)
                    .cloned()
                    .unwrap_or_default(),
                registry_credentials: self.registry_credentials.clone(),
                containerd_version: self.containerd_version.clone(),
                docker_version: DEFAULT_DOCKER_VERSION.to_string(),
            }),
            EngineKind::Containerd => Engine::Containerd(ContainerdConfig {
                insecure_registries: self.insecure_registries.clone(),
                registry_mirrors: self.registry_mirrors.clone(),
                registry_credentials: self.registry_credentials.clone(),
                sandbox_image: self.sandbox_image.clone(),
                version: self.containerd_version.clone(),
                remote_runtime_flag: release < CONTAINER_RUNTIME_FLAG_REMOVED_IN,
            }),
        };
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_config::InMemoryObjectStore;

    #[test]
    fn test_selection_boundary() {
        use EngineKind::*;
        assert_eq!(select_engine("1.23.9", None, Docker).unwrap(), Docker);
        assert_eq!(select_engine("1.23.9", None, Containerd).unwrap(), Containerd);
        assert_eq!(select_engine("v1.23.9", Some(Docker), Containerd).unwrap(), Docker);
        assert_eq!(select_engine("1.23.9", Some(Containerd), Docker).unwrap(), Containerd);

        assert_eq!(select_engine("1.24.0", Some(Docker), Docker).unwrap(), Containerd);
        assert_eq!(select_engine("1.31.2", Some(Docker), Docker).unwrap(), Containerd);
        assert_eq!(select_engine("1.24.0-rc.1", Some(Docker), Docker).unwrap(), Containerd);
    }

    #[test]
    fn test_remote_runtime_flag_follows_kubelet_version() {
        let config = RuntimeConfig::default();
        let flagged = |version: &str| match config.engine(version).unwrap() {
            Engine::Containerd(containerd) => containerd.remote_runtime_flag,
            other => panic!("expected containerd, got {other:?}"),
        };
        assert!(flagged("1.26.9"));
        assert!(!flagged("1.27.0"));
        assert!(!flagged("1.30.2"));
    }

    #[test]
    fn test_parse_kubelet_version() {
        assert_eq!(parse_kubelet_version("v1.29").unwrap(), Version::new(1, 29, 0));
        assert_eq!(parse_kubelet_version("1.30.1").unwrap(), Version::new(1, 30, 1));
        assert_eq!(
            parse_kubelet_version("1.24-rc.1").unwrap().pre.as_str(),
            "rc.1"
        );
        assert!(matches!(
            parse_kubelet_version("latest").unwrap_err(),
            RuntimeError::InvalidKubeletVersion { .. }
        ));
        assert!(parse_kubelet_version("").is_err());
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("Docker".parse::<EngineKind>().unwrap(), EngineKind::Docker);
        assert!(matches!(
            "cri-o".parse::<EngineKind>().unwrap_err(),
            RuntimeError::UnsupportedRuntime(_)
        ));
    }

    #[tokio::test]
    async fn test_build_config_defaults() {
        let config = build_config(&Opts::default(), None).await.unwrap();
        assert_eq!(config.requested, None);
        assert_eq!(config.default_engine, EngineKind::Containerd);
        assert_eq!(config.sandbox_image, DEFAULT_SANDBOX_IMAGE);
        assert!(config.registry_mirrors.is_empty());
        assert!(config.registry_credentials.is_empty());
    }

    #[tokio::test]
    async fn test_build_config_fails_fast_on_bad_mirror() {
        let opts = Opts {
            registry_mirrors: "docker.io=ftp://mirror".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_config(&opts, None).await.unwrap_err(),
            RuntimeError::InvalidMirror { .. }
        ));
    }

    #[tokio::test]
    async fn test_build_config_credentials_need_store() {
        let opts = Opts {
            registry_credentials_secret: "kube-system/regcred".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_config(&opts, None).await.unwrap_err(),
            RuntimeError::Config(ConfigError::NoObjectStore { .. })
        ));

        let store = InMemoryObjectStore::new().with_secret(
            "kube-system",
            "regcred",
            [("quay.io", r#"{"username":"bob","password":"pw"}"#)],
        );
        let config = build_config(&opts, Some(&store as &dyn ObjectStore)).await.unwrap();
        assert_eq!(config.registry_credentials["quay.io"].username, "bob");
    }

    #[tokio::test]
    async fn test_engine_variant_carries_settings() {
        let opts = Opts {
            container_runtime: "docker".to_string(),
            registry_mirrors: "mirror.gcr.io,quay.io=quay-mirror.local".to_string(),
            ..Default::default()
        };
        let config = build_config(&opts, None).await.unwrap();

        match config.engine("1.23.4").unwrap() {
            Engine::Docker(docker) => {
                assert_eq!(docker.registry_mirrors, vec!["https://mirror.gcr.io"]);
            }
            other => panic!("expected docker, got {other:?}"),
        }
        match config.engine("1.28.0").unwrap() {
            Engine::Containerd(containerd) => {
                assert_eq!(containerd.registry_mirrors.len(), 2);
                assert_eq!(containerd.sandbox_image, DEFAULT_SANDBOX_IMAGE);
            }
            other => panic!("expected containerd, got {other:?}"),
        }
    }
}
