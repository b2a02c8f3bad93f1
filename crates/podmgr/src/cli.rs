//! Command-line dispatcher.
//!
//! Maps `podmgr <verb> <noun> <image>` onto [`PodContainerMutator`] calls and
//! renders the result. Usage problems are reported before any cluster
//! contact.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::client::{AttachedContainer, KubePodClient, PodClient};
use crate::config::{resolve_namespace, ConnectorConfig, ENV_RUNNER_POD_NAME};
use crate::connector::ClusterConnector;
use crate::container::{validate_image, ContainerKind};
use crate::error::PodmgrError;
use crate::mutator::{self, EnsureOutcome, MutationRequest, PodContainerMutator};
use crate::telemetry::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "podmgr")]
#[command(about = "Attach job and debug containers to a running runner pod")]
#[command(version)]
pub struct Cli {
    /// Target pod (defaults to the runner's own pod)
    #[arg(long, global = true, env = ENV_RUNNER_POD_NAME)]
    pub pod: Option<String>,

    /// Namespace of the target pod
    #[arg(short, long, global = true, env = "PODMGR_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Kubeconfig used outside the cluster (defaults to ~/.kube/config)
    #[arg(long, global = true, env = "PODMGR_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Deadline in seconds for each cluster request
    #[arg(
        long,
        global = true,
        env = "PODMGR_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Output format: text, json
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Log format: text, json
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attach a container to the pod (no-op if it is already attached)
    Add {
        /// Container to attach
        #[arg(value_enum)]
        kind: ContainerKind,

        /// Image reference to run
        image: String,
    },

    /// Remove a container (not supported by Kubernetes; always succeeds)
    Rm {
        /// Container to remove
        #[arg(value_enum)]
        kind: ContainerKind,

        /// Ignored; accepted for symmetry with `add`
        image: Option<String>,
    },

    /// List containers attached to the pod
    Ls,
}

/// Pod and namespace resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub pod: String,
    pub namespace: String,
}

impl Cli {
    /// Resolve the target pod before anything touches the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`PodmgrError::Validation`] when neither `--pod` nor the
    /// runner pod environment variable yields a name.
    pub fn target(&self) -> Result<Target, PodmgrError> {
        let pod = self
            .pod
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                PodmgrError::Validation(format!(
                    "no pod name given: pass --pod or set {ENV_RUNNER_POD_NAME}"
                ))
            })?;

        Ok(Target {
            pod: pod.to_string(),
            namespace: resolve_namespace(Some(self.namespace.as_str())).to_string(),
        })
    }

    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        let mut config =
            ConnectorConfig::default().with_request_timeout(Duration::from_secs(self.timeout));
        if let Some(path) = &self.kubeconfig {
            config = config.with_kubeconfig_path(path);
        }
        config
    }
}

/// Run the parsed command and print its output.
///
/// # Errors
///
/// Returns any validation, configuration, or cluster error; the binary maps
/// these to exit code 1.
#[allow(clippy::disallowed_macros)]
pub async fn run(cli: Cli) -> Result<()> {
    let target = cli.target()?;

    let output = match &cli.command {
        Command::Add { kind, image } => {
            validate_image(image)?;
            let client = connect(&cli).await?;
            run_add(&client, &target, *kind, image, cli.format).await?
        }
        Command::Rm { kind, .. } => run_rm(&target, *kind, cli.format)?,
        Command::Ls => {
            let client = connect(&cli).await?;
            run_ls(&client, &target, cli.format).await?
        }
    };

    println!("{output}");
    Ok(())
}

async fn connect(cli: &Cli) -> Result<KubePodClient> {
    ClusterConnector::new(cli.connector_config())
        .connect()
        .await
        .context("Failed to connect to the cluster")
}

/// `add`: attach the container unless it is already present.
///
/// # Errors
///
/// Propagates [`PodmgrError`] from the mutator unchanged.
pub async fn run_add<C: PodClient + ?Sized>(
    client: &C,
    target: &Target,
    kind: ContainerKind,
    image: &str,
    format: OutputFormat,
) -> Result<String, PodmgrError> {
    let request = MutationRequest::new(target.pod.clone(), kind, image)
        .in_namespace(target.namespace.clone());
    let outcome = PodContainerMutator::new(client).ensure(&request).await?;
    Ok(render_outcome(target, kind, &outcome, format))
}

/// `rm`: never contacts the cluster.
///
/// # Errors
///
/// Never fails.
pub fn run_rm(
    target: &Target,
    kind: ContainerKind,
    format: OutputFormat,
) -> Result<String, PodmgrError> {
    mutator::remove(Some(target.namespace.as_str()), &target.pod, kind)?;
    Ok(render_removed(target, kind, format))
}

/// `ls`: list attached ephemeral containers.
///
/// # Errors
///
/// Propagates [`PodmgrError`] from the mutator unchanged.
pub async fn run_ls<C: PodClient + ?Sized>(
    client: &C,
    target: &Target,
    format: OutputFormat,
) -> Result<String, PodmgrError> {
    let attached = PodContainerMutator::new(client)
        .inspect(Some(target.namespace.as_str()), &target.pod)
        .await?;
    Ok(render_attached(target, &attached, format))
}

fn render_outcome(
    target: &Target,
    kind: ContainerKind,
    outcome: &EnsureOutcome,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => {
            let status = match outcome {
                EnsureOutcome::Created { .. } => "created",
                EnsureOutcome::AlreadyPresent => "already_present",
            };
            json!({
                "namespace": target.namespace,
                "pod": target.pod,
                "container": kind.container_name(),
                "status": status,
            })
            .to_string()
        }
        OutputFormat::Text => match outcome {
            EnsureOutcome::Created { .. } => format!(
                "✅ Attached {kind} to {}/{}",
                target.namespace, target.pod
            ),
            EnsureOutcome::AlreadyPresent => format!(
                "{kind} is already attached to {}/{}",
                target.namespace, target.pod
            ),
        },
    }
}

fn render_removed(target: &Target, kind: ContainerKind, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "namespace": target.namespace,
            "pod": target.pod,
            "container": kind.container_name(),
            "status": "unsupported",
        })
        .to_string(),
        OutputFormat::Text => format!(
            "⚠️  {kind} was left on {}/{}: Kubernetes cannot remove ephemeral containers \
             from a running pod; recreate the pod to get rid of it",
            target.namespace, target.pod
        ),
    }
}

fn render_attached(
    target: &Target,
    attached: &[AttachedContainer],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => json!(attached).to_string(),
        OutputFormat::Text => {
            if attached.is_empty() {
                return format!(
                    "No ephemeral containers attached to {}/{}",
                    target.namespace, target.pod
                );
            }
            let mut lines = vec![format!(
                "Ephemeral containers on {}/{}:",
                target.namespace, target.pod
            )];
            for c in attached {
                let mode = if c.interactive { " (interactive)" } else { "" };
                lines.push(format!("  {} [{}]{mode}: {}", c.name, c.image, c.state));
            }
            lines.join("\n")
        }
    }
}
