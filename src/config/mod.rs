/// Configuration management for kube-orchestrator
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::k8s::job::JOB_ID_PREFIX_LEN;

/// Maximum length of a DNS-1123 label
const DNS_LABEL_MAX_LEN: usize = 63;

/// Main orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Namespace all resources are created in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deployment settings
    #[serde(default)]
    pub deployment: DeploymentSettings,

    /// Service settings
    #[serde(default)]
    pub service: ServiceSettings,

    /// Job settings
    #[serde(default)]
    pub job: JobSettings,
}

/// Settings used to build the example Deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSettings {
    /// Deployment name
    pub name: String,

    /// Container name, also used as the `app` label
    pub app_name: String,

    /// Container image (e.g., "nginx:1.13")
    pub image: String,

    /// Container port exposed as `http`
    pub port: u16,

    /// Number of replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

/// Settings used to build the example Service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name
    pub name: String,

    /// Value of the `app` label the Service selects
    pub app_name: String,

    /// Port the Service listens on
    pub port: u16,

    /// Container port traffic is forwarded to
    pub target_port: u16,
}

/// Settings used to build Jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Suffix of generated Job names
    pub base_name: String,

    /// Container name
    pub container_name: String,

    /// Container image
    pub image: String,

    /// Command run in the container (image entrypoint when empty)
    #[serde(default)]
    pub command: Vec<String>,

    /// Labels applied to the Job's pod template
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Give up waiting for the Job after this many seconds (waits forever if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<u64>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_replicas() -> i32 {
    1
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            name: "example-michel".to_string(),
            app_name: "web-nginx".to_string(),
            image: "nginx:1.13".to_string(),
            port: 8080,
            replicas: default_replicas(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "web-nginx".to_string(),
            app_name: "web-nginx".to_string(),
            port: 8080,
            target_port: 8080,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            base_name: "job-example".to_string(),
            container_name: "docker-hello-world-ubuntu".to_string(),
            image: "ubuntu:latest".to_string(),
            command: vec!["echo".to_string(), "Hello World!".to_string()],
            labels: [("app".to_string(), "job-demo".to_string())]
                .into_iter()
                .collect(),
            wait_timeout_secs: None,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::example()
    }
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_dns_label("namespace", &self.namespace)?;

        validate_dns_label("deployment.name", &self.deployment.name)?;
        validate_dns_label("deployment.app_name", &self.deployment.app_name)?;
        validate_image("deployment.image", &self.deployment.image)?;
        validate_port("deployment.port", self.deployment.port)?;
        if self.deployment.replicas < 1 {
            anyhow::bail!(
                "deployment.replicas must be at least 1, got {}",
                self.deployment.replicas
            );
        }

        validate_dns_label("service.name", &self.service.name)?;
        validate_dns_label("service.app_name", &self.service.app_name)?;
        validate_port("service.port", self.service.port)?;
        validate_port("service.target_port", self.service.target_port)?;

        validate_dns_label("job.base_name", &self.job.base_name)?;
        if self.job.base_name.len() > DNS_LABEL_MAX_LEN - JOB_ID_PREFIX_LEN {
            anyhow::bail!(
                "job.base_name must be at most {} characters, got {}",
                DNS_LABEL_MAX_LEN - JOB_ID_PREFIX_LEN,
                self.job.base_name.len()
            );
        }
        validate_dns_label("job.container_name", &self.job.container_name)?;
        validate_image("job.image", &self.job.image)?;
        if self.job.wait_timeout_secs == Some(0) {
            anyhow::bail!("job.wait_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            namespace: default_namespace(),
            deployment: DeploymentSettings::default(),
            service: ServiceSettings::default(),
            job: JobSettings::default(),
        }
    }
}

/// Check that a value is a valid DNS-1123 label (RFC 1123)
fn validate_dns_label(field: &str, value: &str) -> anyhow::Result<()> {
    if value.is_empty() {
        anyhow::bail!("{} cannot be empty", field);
    }
    if value.len() > DNS_LABEL_MAX_LEN {
        anyhow::bail!(
            "{} must be at most {} characters: {}",
            field,
            DNS_LABEL_MAX_LEN,
            value
        );
    }

    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || value.starts_with('-') || value.ends_with('-') {
        anyhow::bail!(
            "{} must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character: {}",
            field,
            value
        );
    }

    Ok(())
}

fn validate_image(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", field);
    }
    Ok(())
}

fn validate_port(field: &str, port: u16) -> anyhow::Result<()> {
    if port == 0 {
        anyhow::bail!("{} cannot be 0", field);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = OrchestratorConfig::example();
        assert!(config.validate().is_ok());

        config.deployment.name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_defaults() {
        let config = OrchestratorConfig::example();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.deployment.name, "example-michel");
        assert_eq!(config.deployment.replicas, 1);
        assert_eq!(config.service.app_name, config.deployment.app_name);
        assert_eq!(config.job.labels.get("app").map(String::as_str), Some("job-demo"));
        assert!(config.job.wait_timeout_secs.is_none());
    }

    #[test]
    fn test_dns_label_validation() {
        assert!(validate_dns_label("name", "web-nginx").is_ok());
        assert!(validate_dns_label("name", "a1").is_ok());
        assert!(validate_dns_label("name", "Web").is_err());
        assert!(validate_dns_label("name", "-web").is_err());
        assert!(validate_dns_label("name", "web-").is_err());
        assert!(validate_dns_label("name", "web_nginx").is_err());
        assert!(validate_dns_label("name", &"a".repeat(64)).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = OrchestratorConfig::example();
        config.service.port = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::example();
        config.deployment.replicas = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::example();
        config.job.image = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::example();
        config.job.wait_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_base_name_leaves_room_for_id() {
        let mut config = OrchestratorConfig::example();
        config.job.base_name = "a".repeat(30);
        assert!(config.validate().is_ok());

        config.job.base_name = "a".repeat(31);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("job.base_name"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
namespace: demo
job:
  base_name: nightly
  container_name: runner
  image: busybox:1.36
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespace, "demo");
        assert_eq!(config.deployment.image, "nginx:1.13");
        assert!(config.job.command.is_empty());
        assert!(config.job.labels.is_empty());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!(
            "kube-orchestrator-config-{}.yaml",
            std::process::id()
        ));
        let yaml = serde_yaml::to_string(&OrchestratorConfig::example()).unwrap();
        std::fs::write(&path, yaml).unwrap();

        let config = tokio_test::assert_ok!(OrchestratorConfig::from_file(&path));
        assert_eq!(config.service.name, "web-nginx");

        std::fs::remove_file(&path).unwrap();
    }
}
