/// Deployment operations
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::info;

use super::app_labels;
use crate::config::DeploymentSettings;
use crate::error::Result;

/// Name/replica pair reported by `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSummary {
    pub name: String,
    pub replicas: i32,
}

/// Deployment orchestrator for a single namespace
pub struct DeploymentOrchestrator {
    api: Api<Deployment>,
    namespace: String,
}

impl DeploymentOrchestrator {
    /// Create a new deployment orchestrator
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Create the Deployment described by the settings
    pub async fn create(&self, settings: &DeploymentSettings) -> Result<String> {
        let deployment = build_deployment(settings);

        info!("Creating deployment...");
        let result = self.api.create(&PostParams::default(), &deployment).await?;
        let name = result.name_any();
        info!("Created deployment {:?}.", name);

        Ok(name)
    }

    /// Delete a Deployment, waiting on its dependents through foreground propagation
    pub async fn delete(&self, name: &str) -> Result<()> {
        info!("Deleting deployment...");
        self.api.delete(name, &DeleteParams::foreground()).await?;
        info!("Deleted deployment.");

        Ok(())
    }

    /// List Deployments in the namespace
    pub async fn list(&self) -> Result<Vec<DeploymentSummary>> {
        info!("Listing deployments in namespace {:?}:", self.namespace);

        let list = self.api.list(&ListParams::default()).await?;
        let summaries: Vec<DeploymentSummary> = list.items.iter().map(summarize).collect();
        for d in &summaries {
            info!(" * {} ({} replicas)", d.name, d.replicas);
        }

        Ok(summaries)
    }
}

/// Build the Deployment object sent to the API server
pub fn build_deployment(settings: &DeploymentSettings) -> Deployment {
    let labels = app_labels(&settings.app_name);

    Deployment {
        metadata: ObjectMeta {
            name: Some(settings.name.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(settings.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: settings.app_name.clone(),
                        image: Some(settings.image.clone()),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            protocol: Some("TCP".to_string()),
                            container_port: i32::from(settings.port),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn summarize(deployment: &Deployment) -> DeploymentSummary {
    // The API server defaults replicas to 1 when unset
    let replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);

    DeploymentSummary {
        name: deployment.name_any(),
        replicas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_deployment() {
        let settings = DeploymentSettings::default();
        let deployment = build_deployment(&settings);

        assert_eq!(deployment.metadata.name.as_deref(), Some("example-michel"));

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));

        let template_labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(spec.selector.match_labels.unwrap(), template_labels);
        assert_eq!(template_labels.get("app").map(String::as_str), Some("web-nginx"));

        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "web-nginx");
        assert_eq!(containers[0].image.as_deref(), Some("nginx:1.13"));

        let port = &containers[0].ports.as_ref().unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("http"));
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
        assert_eq!(port.container_port, 8080);
    }

    #[test]
    fn test_build_deployment_custom_replicas() {
        let settings = DeploymentSettings {
            replicas: 3,
            port: 9000,
            ..Default::default()
        };
        let spec = build_deployment(&settings).spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers[0].ports.as_ref().unwrap()[0].container_port, 9000);
    }

    #[test]
    fn test_summarize_defaults_missing_replicas() {
        let mut deployment = build_deployment(&DeploymentSettings::default());
        deployment.spec.as_mut().unwrap().replicas = None;

        let summary = summarize(&deployment);
        assert_eq!(
            summary,
            DeploymentSummary {
                name: "example-michel".to_string(),
                replicas: 1,
            }
        );
    }

    #[tokio::test]
    #[ignore] // Requires a reachable cluster
    async fn test_deployment_lifecycle() {
        let path = std::env::var("KUBECONFIG").expect("KUBECONFIG not set");
        let client = crate::k8s::connect(std::path::Path::new(&path)).await.unwrap();
        let orchestrator = DeploymentOrchestrator::new(client, "default");

        let settings = DeploymentSettings::default();
        let name = orchestrator.create(&settings).await.unwrap();
        let listed = orchestrator.list().await.unwrap();
        assert!(listed.iter().any(|d| d.name == name));
        orchestrator.delete(&name).await.unwrap();
    }
}
