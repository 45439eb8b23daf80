use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use machine_cloud::ValidationCache;
use machine_config::{ConfigVarResolver, KubeObjectStore, ObjectStore};
use machine_container::{EngineKind, Opts};
use machine_controller::{MachineReport, ProviderRegistry, Provisioner};
use machine_core::{Machine, OperatingSystem};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "machine-controller")]
#[command(about = "Provisions cloud instances for Kubernetes Machine resources", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Yaml,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuntimeKind {
    Docker,
    Containerd,
}

impl From<RuntimeKind> for EngineKind {
    fn from(kind: RuntimeKind) -> Self {
        match kind {
            RuntimeKind::Docker => EngineKind::Docker,
            RuntimeKind::Containerd => EngineKind::Containerd,
        }
    }
}

/// Container runtime options shared by every subcommand that renders a node
#[derive(Args)]
struct RuntimeArgs {
    /// Requested engine
    #[arg(long, value_enum, env = "MC_CONTAINER_RUNTIME")]
    container_runtime: Option<RuntimeKind>,

    /// Engine used below kubelet 1.24 when none is requested
    #[arg(long, value_enum, env = "MC_DEFAULT_CONTAINER_RUNTIME", default_value_t = RuntimeKind::Containerd)]
    default_container_runtime: RuntimeKind,

    /// Comma-separated `[registry=]mirror` list
    #[arg(long, env = "MC_REGISTRY_MIRRORS", default_value = "")]
    registry_mirrors: String,

    /// Comma-separated list of registries reachable without TLS verification
    #[arg(long, env = "MC_INSECURE_REGISTRIES", default_value = "")]
    insecure_registries: String,

    /// Secret holding registry credentials, as `namespace/name`
    #[arg(long, env = "MC_REGISTRY_CREDENTIALS_SECRET", default_value = "")]
    registry_credentials_secret: String,

    #[arg(long, env = "MC_PAUSE_IMAGE", default_value = "")]
    pause_image: String,

    #[arg(long, env = "MC_CONTAINERD_VERSION", default_value = "")]
    containerd_version: String,
}

impl RuntimeArgs {
    fn to_opts(&self) -> Opts {
        Opts {
            container_runtime: self
                .container_runtime
                .map(|kind| EngineKind::from(kind).to_string())
                .unwrap_or_default(),
            containerd_version: self.containerd_version.clone(),
            insecure_registries: self.insecure_registries.clone(),
            registry_mirrors: self.registry_mirrors.clone(),
            registry_credentials_secret: self.registry_credentials_secret.clone(),
            pause_image: self.pause_image.clone(),
            default_runtime: self.default_container_runtime.into(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or reuse) the instances for the Machines in a manifest
    Provision {
        /// YAML file with one or more Machine documents
        #[arg(short, long)]
        manifest: PathBuf,

        /// Script appended to the generated userdata
        #[arg(long)]
        userdata_file: Option<PathBuf>,

        /// Seconds between address polls after creation
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,

        /// Address polls before giving up
        #[arg(long, default_value_t = 5)]
        poll_attempts: u32,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Show the container engine a node would bootstrap with
    RuntimeConfig {
        /// Operating system of the node
        #[arg(long, default_value = "ubuntu")]
        os: String,

        /// Kubelet version of the node
        #[arg(long)]
        kubelet_version: String,

        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Show version information
    Version,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// kubeconfig / in-cluster 設定から Secret ストアを作成
///
/// クライアントが作れない場合は参照なしで続行する。
async fn object_store() -> Option<Arc<dyn ObjectStore>> {
    match KubeObjectStore::try_default().await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(
                "No Kubernetes client available, secret and config map references will fail: {}",
                e
            );
            None
        }
    }
}

fn read_machines(path: &Path) -> anyhow::Result<Vec<Machine>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;

    let mut machines = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&content) {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        if value.is_null() {
            continue;
        }
        let machine: Machine = serde_yaml::from_value(value)
            .with_context(|| format!("invalid Machine in {}", path.display()))?;
        machines.push(machine);
    }
    Ok(machines)
}

fn print_report(report: &MachineReport) {
    let name = report.machine.name();
    match &report.result {
        Ok(instance) => {
            let verb = if instance.created { "created" } else { "reused" };
            println!(
                "{} {} {} ({}, {})",
                "✓".green(),
                name.cyan(),
                instance.provider_id,
                verb,
                instance.status
            );
            for (address, kind) in &instance.addresses {
                println!("    {} {}", kind.to_string().dimmed(), address);
            }
        }
        Err(err) => match err.as_terminal() {
            Some(terminal) => println!(
                "{} {} {}: {}",
                "✗".red(),
                name.cyan(),
                terminal.reason.to_string().red().bold(),
                terminal.message
            ),
            None => println!("{} {} {} {}", "!".yellow(), name.cyan(), "retry:".yellow(), err),
        },
    }
}

async fn provision(
    manifest: &Path,
    userdata_file: Option<&Path>,
    poll_interval: u64,
    poll_attempts: u32,
    output: OutputFormat,
    runtime: &RuntimeArgs,
) -> anyhow::Result<()> {
    let machines = read_machines(manifest)?;
    if machines.is_empty() {
        anyhow::bail!("no Machine found in {}", manifest.display());
    }

    let store = object_store().await;
    let resolver = match &store {
        Some(store) => ConfigVarResolver::new(Arc::clone(store)),
        None => ConfigVarResolver::without_store(),
    };
    let runtime_config = machine_container::build_config(&runtime.to_opts(), store.as_deref())
        .await
        .context("invalid container runtime options")?;

    let registry =
        ProviderRegistry::new(resolver).with_validation_cache(Arc::new(ValidationCache::default()));
    let mut provisioner = Provisioner::new(registry, runtime_config)
        .with_address_polling(Duration::from_secs(poll_interval), poll_attempts);
    if let Some(path) = userdata_file {
        let extra = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read userdata {}", path.display()))?;
        provisioner = provisioner.with_extra_userdata(extra);
    }

    let total = machines.len();
    let reports = provisioner.create_machines(machines).await;
    let failed = reports.iter().filter(|r| !r.is_success()).count();

    match output {
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
        OutputFormat::Yaml => {
            for report in &reports {
                println!("---");
                print!("{}", serde_yaml::to_string(&report.machine)?);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} machines failed to provision", failed, total);
    }
    Ok(())
}

async fn runtime_config(os: &str, kubelet_version: &str, runtime: &RuntimeArgs) -> anyhow::Result<()> {
    let opts = runtime.to_opts();
    let store = if opts.registry_credentials_secret.trim().is_empty() {
        None
    } else {
        object_store().await
    };
    let config = machine_container::build_config(&opts, store.as_deref()).await?;
    let engine = config.engine(kubelet_version)?;
    let os = OperatingSystem::from(os.to_string());
    let script = engine.script_for(&os)?;

    println!("{} {}", "Engine:".bold(), engine.name().cyan());
    println!("{} {}", "Kubelet flags:".bold(), engine.kubelet_flags().join(" "));
    println!();
    println!("{} {}", "#".dimmed(), engine.config_file_name().cyan());
    println!("{}", engine.config()?.trim_end());
    if let (Some(path), Some(auth)) = (engine.auth_config_file_name(), engine.auth_config()?) {
        println!();
        println!("{} {}", "#".dimmed(), path.cyan());
        println!("{}", auth.trim_end());
    }
    println!();
    println!("{} {} {}", "#".dimmed(), "bootstrap script for".dimmed(), os.to_string().cyan());
    if script.trim().is_empty() {
        println!("{}", "(none, engine is preinstalled)".dimmed());
    } else {
        println!("{}", script.trim_end());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match &cli.command {
        Commands::Version => {
            println!("machine-controller {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Provision {
            manifest,
            userdata_file,
            poll_interval,
            poll_attempts,
            output,
            runtime,
        } => {
            provision(
                manifest,
                userdata_file.as_deref(),
                *poll_interval,
                *poll_attempts,
                *output,
                runtime,
            )
            .await
        }
        Commands::RuntimeConfig {
            os,
            kubelet_version,
            runtime,
        } => runtime_config(os, kubelet_version, runtime).await,
    }
}
