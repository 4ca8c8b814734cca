/// Service operations
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::info;

use super::app_labels;
use crate::config::ServiceSettings;
use crate::error::Result;

/// Result of an update-or-create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub name: String,
    pub cluster_ip: String,
}

/// Service orchestrator for a single namespace
pub struct ServiceOrchestrator {
    api: Api<Service>,
}

impl ServiceOrchestrator {
    /// Create a new service orchestrator
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    /// Update the Service if it exists, otherwise create it
    pub async fn create(&self, settings: &ServiceSettings) -> Result<UpsertOutcome> {
        let desired = build_service(settings);

        match self.api.get_opt(&settings.name).await? {
            Some(existing) => {
                let service = carry_over_allocated_fields(desired, &existing);
                self.api
                    .replace(&settings.name, &PostParams::default(), &service)
                    .await?;
                info!("service updated");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.api.create(&PostParams::default(), &desired).await?;
                info!("service created");
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Delete a Service by name
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(name, &DeleteParams::default()).await?;
        info!("Service deleted");

        Ok(())
    }

    /// List Services in the namespace
    pub async fn list(&self) -> Result<Vec<ServiceSummary>> {
        let list = self.api.list(&ListParams::default()).await?;

        let summaries: Vec<ServiceSummary> = list
            .items
            .iter()
            .map(|service| ServiceSummary {
                name: service.name_any(),
                cluster_ip: service
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.cluster_ip.clone())
                    .unwrap_or_default(),
            })
            .collect();

        for service in &summaries {
            info!("* {} (Cluster IP: {})", service.name, service.cluster_ip);
        }

        Ok(summaries)
    }
}

/// Build the ClusterIP Service object sent to the API server
pub fn build_service(settings: &ServiceSettings) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(settings.name.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(app_labels(&settings.app_name)),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: i32::from(settings.port),
                target_port: Some(IntOrString::Int(i32::from(settings.target_port))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the fields the API server owns on an existing Service into a replacement.
///
/// A replace must carry the current `resourceVersion`, and `clusterIP` is
/// immutable once allocated.
fn carry_over_allocated_fields(mut desired: Service, existing: &Service) -> Service {
    desired.metadata.resource_version = existing.resource_version();

    let cluster_ip = existing
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.clone());
    if let Some(spec) = desired.spec.as_mut() {
        spec.cluster_ip = cluster_ip;
    }

    desired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_service() {
        let service = build_service(&ServiceSettings::default());
        assert_eq!(service.metadata.name.as_deref(), Some("web-nginx"));

        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(
            spec.selector.unwrap().get("app").map(String::as_str),
            Some("web-nginx")
        );
        assert!(spec.cluster_ip.is_none());

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 8080);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8080)));
    }

    #[test]
    fn test_update_carries_resource_version_and_cluster_ip() {
        let settings = ServiceSettings::default();

        let mut existing = build_service(&settings);
        existing.metadata.resource_version = Some("4242".to_string());
        existing.spec.as_mut().unwrap().cluster_ip = Some("10.96.0.12".to_string());

        let mut desired_settings = settings.clone();
        desired_settings.target_port = 9090;
        let updated = carry_over_allocated_fields(build_service(&desired_settings), &existing);

        assert_eq!(updated.metadata.resource_version.as_deref(), Some("4242"));
        let spec = updated.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.96.0.12"));
        assert_eq!(
            spec.ports.unwrap()[0].target_port,
            Some(IntOrString::Int(9090))
        );
    }

    #[tokio::test]
    #[ignore] // Requires a reachable cluster
    async fn test_service_upsert() {
        let path = std::env::var("KUBECONFIG").expect("KUBECONFIG not set");
        let client = crate::k8s::connect(std::path::Path::new(&path)).await.unwrap();
        let orchestrator = ServiceOrchestrator::new(client, "default");

        let settings = ServiceSettings::default();
        assert_eq!(
            orchestrator.create(&settings).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            orchestrator.create(&settings).await.unwrap(),
            UpsertOutcome::Updated
        );
        orchestrator.delete(&settings.name).await.unwrap();
    }
}
