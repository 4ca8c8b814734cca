/// Kubernetes API client construction
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Build a Kubernetes client from the current context of a kubeconfig file
pub async fn connect(kubeconfig_path: &Path) -> Result<Client> {
    let config = load_config(kubeconfig_path).await?;
    debug!("Connecting to cluster at {}", config.cluster_url);

    Ok(Client::try_from(config)?)
}

/// Read a kubeconfig file and resolve its current context
pub async fn load_config(kubeconfig_path: &Path) -> Result<Config> {
    let kubeconfig_error = |source| OrchestratorError::Kubeconfig {
        path: kubeconfig_path.display().to_string(),
        source,
    };

    let kubeconfig = Kubeconfig::read_from(kubeconfig_path).map_err(kubeconfig_error)?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(kubeconfig_error)
}
