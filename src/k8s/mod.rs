/// Kubernetes resource orchestrators
pub mod client;
pub mod deployment;
pub mod job;
pub mod pod;
pub mod service;

use std::collections::BTreeMap;

pub use client::connect;
pub use deployment::DeploymentOrchestrator;
pub use job::{JobOrchestrator, JobOutcome};
pub use pod::PodOrchestrator;
pub use service::ServiceOrchestrator;

/// Labels tying a workload's Pods to the Services that select them
pub fn app_labels(app_name: &str) -> BTreeMap<String, String> {
    [("app".to_string(), app_name.to_string())]
        .into_iter()
        .collect()
}
