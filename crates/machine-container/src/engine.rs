//! Container engines and their rendered node files

use crate::credentials::AuthConfig;
use crate::error::{Result, RuntimeError};
use crate::scripts;
use machine_core::OperatingSystem;
use serde::Serialize;
use std::collections::BTreeMap;
use tera::Context;

pub const DOCKER_CONFIG_FILE: &str = "/etc/docker/daemon.json";
pub const DOCKER_AUTH_FILE: &str = "/root/.docker/config.json";
pub const CONTAINERD_CONFIG_FILE: &str = "/etc/containerd/config.toml";

const CRI_PLUGIN: &str = "io.containerd.grpc.v1.cri";

/// What every engine provides to the node bootstrap
pub trait RuntimeEngine {
    fn kubelet_flags(&self) -> Vec<String>;

    /// Install script for `os`
    ///
    /// Empty for images that ship the engine. Fails for unknown systems.
    fn script_for(&self, os: &OperatingSystem) -> Result<String>;

    fn config_file_name(&self) -> &'static str;

    fn config(&self) -> Result<String>;

    /// Registry credentials file, when the engine keeps them apart
    fn auth_config(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn auth_config_file_name(&self) -> Option<&'static str> {
        None
    }
}

/// The selected engine; exactly one variant exists per node
#[derive(Debug, Clone, PartialEq)]
pub enum Engine {
    Docker(DockerConfig),
    Containerd(ContainerdConfig),
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Docker(_) => "docker",
            Self::Containerd(_) => "containerd",
        }
    }

    fn inner(&self) -> &dyn RuntimeEngine {
        match self {
            Self::Docker(docker) => docker,
            Self::Containerd(containerd) => containerd,
        }
    }

    pub fn kubelet_flags(&self) -> Vec<String> {
        self.inner().kubelet_flags()
    }

    pub fn script_for(&self, os: &OperatingSystem) -> Result<String> {
        self.inner().script_for(os)
    }

    pub fn config_file_name(&self) -> &'static str {
        self.inner().config_file_name()
    }

    pub fn config(&self) -> Result<String> {
        self.inner().config()
    }

    pub fn auth_config(&self) -> Result<Option<String>> {
        self.inner().auth_config()
    }

    pub fn auth_config_file_name(&self) -> Option<&'static str> {
        self.inner().auth_config_file_name()
    }
}

fn render(os: &OperatingSystem, template: Option<&str>, context: &Context) -> Result<String> {
    match template {
        Some("") => Ok(String::new()),
        Some(template) => Ok(tera::Tera::one_off(template, context, false)?),
        None => Err(RuntimeError::UnknownOperatingSystem(os.to_string())),
    }
}

/// Docker daemon settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DockerConfig {
    pub insecure_registries: Vec<String>,
    /// Docker only mirrors Docker Hub
    pub registry_mirrors: Vec<String>,
    pub registry_credentials: BTreeMap<String, AuthConfig>,
    pub containerd_version: String,
    pub docker_version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct DaemonJson<'a> {
    exec_opts: [&'static str; 1],
    storage_driver: &'static str,
    log_driver: &'static str,
    log_opts: BTreeMap<&'static str, &'static str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    insecure_registries: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    registry_mirrors: &'a [String],
}

impl RuntimeEngine for DockerConfig {
    fn kubelet_flags(&self) -> Vec<String> {
        vec![
            "--container-runtime=docker".to_string(),
            "--container-runtime-endpoint=unix:///var/run/dockershim.sock".to_string(),
        ]
    }

    fn script_for(&self, os: &OperatingSystem) -> Result<String> {
        let mut context = Context::new();
        context.insert("docker_version", &self.docker_version);
        context.insert("containerd_version", &self.containerd_version);
        render(os, scripts::docker_template(os), &context)
    }

    fn config_file_name(&self) -> &'static str {
        DOCKER_CONFIG_FILE
    }

    fn config(&self) -> Result<String> {
        let daemon = DaemonJson {
            exec_opts: ["native.cgroupdriver=systemd"],
            storage_driver: "overlay2",
            log_driver: "json-file",
            log_opts: BTreeMap::from([("max-file", "5"), ("max-size", "100m")]),
            insecure_registries: &self.insecure_registries,
            registry_mirrors: &self.registry_mirrors,
        };
        Ok(serde_json::to_string_pretty(&daemon)?)
    }

    fn auth_config(&self) -> Result<Option<String>> {
        if self.registry_credentials.is_empty() {
            return Ok(None);
        }
        let auths = serde_json::json!({ "auths": &self.registry_credentials });
        Ok(Some(serde_json::to_string_pretty(&auths)?))
    }

    fn auth_config_file_name(&self) -> Option<&'static str> {
        Some(DOCKER_AUTH_FILE)
    }
}

/// containerd CRI settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerdConfig {
    pub insecure_registries: Vec<String>,
    pub registry_mirrors: BTreeMap<String, Vec<String>>,
    pub registry_credentials: BTreeMap<String, AuthConfig>,
    pub sandbox_image: String,
    pub version: String,
    /// Kubelet still expects `--container-runtime=remote`
    pub remote_runtime_flag: bool,
}

#[derive(Serialize)]
struct ContainerdToml<'a> {
    version: u32,
    metrics: Metrics,
    plugins: BTreeMap<&'static str, CriPlugin<'a>>,
}

#[derive(Serialize)]
struct Metrics {
    address: &'static str,
}

#[derive(Serialize)]
struct CriPlugin<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    sandbox_image: &'a str,
    containerd: CriContainerd,
    registry: CriRegistry<'a>,
}

#[derive(Serialize)]
struct CriContainerd {
    runtimes: BTreeMap<&'static str, CriRuntime>,
}

#[derive(Serialize)]
struct CriRuntime {
    runtime_type: &'static str,
    options: RuncOptions,
}

#[derive(Serialize)]
struct RuncOptions {
    #[serde(rename = "SystemdCgroup")]
    systemd_cgroup: bool,
}

#[derive(Serialize)]
struct CriRegistry<'a> {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    mirrors: BTreeMap<&'a str, RegistryMirror<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    configs: BTreeMap<&'a str, RegistryConfig<'a>>,
}

#[derive(Serialize)]
struct RegistryMirror<'a> {
    endpoint: &'a [String],
}

#[derive(Default, Serialize)]
struct RegistryConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tls: Option<RegistryTls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a AuthConfig>,
}

#[derive(Serialize)]
struct RegistryTls {
    insecure_skip_verify: bool,
}

impl RuntimeEngine for ContainerdConfig {
    fn kubelet_flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(2);
        if self.remote_runtime_flag {
            flags.push("--container-runtime=remote".to_string());
        }
        flags.push("--container-runtime-endpoint=unix:///run/containerd/containerd.sock".to_string());
        flags
    }

    fn script_for(&self, os: &OperatingSystem) -> Result<String> {
        let mut context = Context::new();
        context.insert("containerd_version", &self.version);
        render(os, scripts::containerd_template(os), &context)
    }

    fn config_file_name(&self) -> &'static str {
        CONTAINERD_CONFIG_FILE
    }

    fn config(&self) -> Result<String> {
        let mirrors = self
            .registry_mirrors
            .iter()
            .map(|(registry, endpoint)| (registry.as_str(), RegistryMirror { endpoint }))
            .collect();

        let mut configs: BTreeMap<&str, RegistryConfig<'_>> = BTreeMap::new();
        for registry in &self.insecure_registries {
            configs.entry(registry.as_str()).or_default().tls = Some(RegistryTls {
                insecure_skip_verify: true,
            });
        }
        for (registry, auth) in &self.registry_credentials {
            configs.entry(registry.as_str()).or_default().auth = Some(auth);
        }

        let document = ContainerdToml {
            version: 2,
            metrics: Metrics {
                address: "127.0.0.1:1338",
            },
            plugins: BTreeMap::from([(
                CRI_PLUGIN,
                CriPlugin {
                    sandbox_image: &self.sandbox_image,
                    containerd: CriContainerd {
                        runtimes: BTreeMap::from([(
                            "runc",
                            CriRuntime {
                                runtime_type: "io.containerd.runc.v2",
                                options: RuncOptions {
                                    systemd_cgroup: true,
                                },
                            },
                        )]),
                    },
                    registry: CriRegistry { mirrors, configs },
                },
            )]),
        };
        Ok(toml::to_string(&document)?)
    }
}
