/// kube-orchestrator - Kubernetes workload examples
///
/// Creates, lists, and deletes Deployments, Services, Jobs, and Pods through the
/// Kubernetes API, and prints the output of Jobs once they finish.
mod config;
mod error;
mod k8s;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::OrchestratorConfig;
use crate::k8s::{
    DeploymentOrchestrator, JobOrchestrator, JobOutcome, PodOrchestrator, ServiceOrchestrator,
};

#[derive(Parser, Debug)]
#[command(name = "kube-orchestrator")]
#[command(about = "Manage example Kubernetes workloads", long_about = None)]
struct Cli {
    /// Absolute path to the kubeconfig file
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Operation to perform
    #[arg(long, value_enum)]
    operation: Operation,

    /// Configuration file path (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Namespace override
    #[arg(short, long)]
    namespace: Option<String>,

    /// Print each pod's log (get-pods)
    #[arg(long)]
    logs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Operation {
    /// Create the example Deployment
    Create,
    /// List Deployments
    List,
    /// Delete the example Deployment
    Delete,
    /// Create or update the example Service
    CreateService,
    /// Delete the example Service
    DeleteService,
    /// List Services
    ListService,
    /// Run a Job and print its output
    CreateJob,
    /// List Jobs
    GetJobs,
    /// List Pods
    GetPods,
    /// Generate example configuration file
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("kube_orchestrator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(&cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    if cli.operation == Operation::Init {
        return init_config(cli).await;
    }

    let config = load_config(cli)?;
    let namespace = config.namespace.as_str();

    let kubeconfig = cli
        .kubeconfig
        .as_deref()
        .context("--kubeconfig not specified")?;
    let client = k8s::connect(kubeconfig)
        .await
        .context("Failed to create Kubernetes client")?;

    match cli.operation {
        Operation::Create => {
            DeploymentOrchestrator::new(client, namespace)
                .create(&config.deployment)
                .await
                .context("Failed to create deployment")?;
        }
        Operation::List => {
            DeploymentOrchestrator::new(client, namespace)
                .list()
                .await
                .context("Failed to list deployments")?;
        }
        Operation::Delete => {
            DeploymentOrchestrator::new(client, namespace)
                .delete(&config.deployment.name)
                .await
                .context("Error on delete deployment")?;
        }
        Operation::CreateService => {
            ServiceOrchestrator::new(client, namespace)
                .create(&config.service)
                .await
                .context("Failed to create or update service")?;
        }
        Operation::DeleteService => {
            ServiceOrchestrator::new(client, namespace)
                .delete(&config.service.name)
                .await
                .context("Error on delete service")?;
        }
        Operation::ListService => {
            ServiceOrchestrator::new(client, namespace)
                .list()
                .await
                .context("Error on list services")?;
        }
        Operation::CreateJob => run_job(client, namespace, &config).await?,
        Operation::GetJobs => {
            JobOrchestrator::new(client, namespace)
                .list()
                .await
                .context("Error on get jobs")?;
        }
        Operation::GetPods => {
            PodOrchestrator::new(client, namespace)
                .list(cli.logs)
                .await
                .context("Error on get pods")?;
        }
        // Written before connecting
        Operation::Init => {}
    }

    Ok(())
}

/// Load the configuration file, or the built-in defaults when none is given,
/// and apply the `--namespace` override
fn load_config(cli: &Cli) -> Result<OrchestratorConfig> {
    let mut config = match &cli.config {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => OrchestratorConfig::example(),
    };

    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
        config.validate().context("Invalid --namespace")?;
    }

    Ok(config)
}

/// Run a Job to completion and print what it wrote
async fn run_job(
    client: kube::Client,
    namespace: &str,
    config: &OrchestratorConfig,
) -> Result<()> {
    let run = JobOrchestrator::new(client, namespace)
        .create(&config.job)
        .await
        .context("Failed to run job")?;

    let status = match run.outcome {
        JobOutcome::Succeeded => "succeeded",
        JobOutcome::Failed => "failed",
    };
    info!(
        "Job {} {} in {}s",
        run.name,
        status,
        (run.finished_at - run.started_at).num_seconds()
    );
    info!("Job output: \n{}", run.output);

    Ok(())
}

/// Initialize example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("orchestrator.yaml"));

    if path.exists() {
        anyhow::bail!("Configuration file already exists: {}", path.display());
    }

    let example_config = OrchestratorConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&path, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", path.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the configuration file to match your workloads");
    info!("  2. Run an operation:");
    info!(
        "     kube-orchestrator --kubeconfig ~/.kube/config --config {} --operation create-job",
        path.display()
    );

    Ok(())
}
