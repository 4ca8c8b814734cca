/// Pod operations
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub uid: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        Self {
            uid: pod.uid().unwrap_or_default(),
            name: pod.name_any(),
            labels: pod.labels().clone(),
        }
    }
}

/// Pod orchestrator for a single namespace
pub struct PodOrchestrator {
    api: Api<Pod>,
}

impl PodOrchestrator {
    /// Create a new pod orchestrator
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    /// List every Pod in the namespace, optionally printing each Pod's log
    pub async fn list(&self, with_logs: bool) -> Result<Vec<PodSummary>> {
        let pods = self.list_matching(&ListParams::default()).await?;

        for pod in &pods {
            info!("pod.UID: {}", pod.uid);
            info!("pod.Name: {}", pod.name);
            info!("pod.Labels: {}", format_labels(&pod.labels));

            if with_logs {
                // One unreadable log should not hide the rest of the listing
                match self.log(&pod.name).await {
                    Ok(log) => info!("pod.Log:\n{}", log),
                    Err(e) => warn!("Error on get logs for pod {}: {}", pod.name, e),
                }
            }
        }

        Ok(pods)
    }

    /// List Pods matching the given parameters
    pub async fn list_matching(&self, params: &ListParams) -> Result<Vec<PodSummary>> {
        let list = self.api.list(params).await?;
        Ok(list.items.iter().map(PodSummary::from).collect())
    }

    /// Fetch the full log of a Pod
    pub async fn log(&self, name: &str) -> Result<String> {
        Ok(self.api.logs(name, &LogParams::default()).await?)
    }
}

/// Render labels as `key=value` pairs in key order
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("[{}]", pairs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_pod_summary() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("hello-abc12".to_string()),
                uid: Some("3c1f1c5e-0000-4000-8000-000000000001".to_string()),
                labels: Some(
                    [
                        ("app".to_string(), "job-demo".to_string()),
                        ("job-name".to_string(), "hello".to_string()),
                    ]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };

        let summary = PodSummary::from(&pod);
        assert_eq!(summary.name, "hello-abc12");
        assert_eq!(summary.uid, "3c1f1c5e-0000-4000-8000-000000000001");
        assert_eq!(
            format_labels(&summary.labels),
            "[app=job-demo, job-name=hello]"
        );
    }

    #[test]
    fn test_pod_summary_without_metadata() {
        let summary = PodSummary::from(&Pod::default());
        assert!(summary.uid.is_empty());
        assert!(summary.labels.is_empty());
        assert_eq!(format_labels(&summary.labels), "[]");
    }

    #[tokio::test]
    #[ignore] // Requires a reachable cluster
    async fn test_list_pods() {
        let path = std::env::var("KUBECONFIG").expect("KUBECONFIG not set");
        let client = crate::k8s::connect(std::path::Path::new(&path)).await.unwrap();
        let orchestrator = PodOrchestrator::new(client, "kube-system");

        let pods = orchestrator.list(false).await.unwrap();
        assert!(!pods.is_empty());
    }
}
