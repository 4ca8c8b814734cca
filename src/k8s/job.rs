/// Job operations: create, wait for completion, and read the output
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStream, TryStreamExt};
use k8s_openapi::api::batch::v1::{Job, JobSpec, JobStatus};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pod::{PodOrchestrator, PodSummary};
use crate::config::JobSettings;
use crate::error::{OrchestratorError, Result};

/// Label the Job controller puts on the Pods it creates
const JOB_NAME_LABEL: &str = "job-name";

/// Length of the id `generate_job_name` puts in front of the base name (simple UUID plus `-`)
pub const JOB_ID_PREFIX_LEN: usize = 33;

const MAX_CONSECUTIVE_WATCH_ERRORS: u32 = 5;

/// Terminal state of a Job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// A finished Job and the log of the Pod it ran in
#[derive(Debug, Clone)]
pub struct JobRun {
    pub name: String,
    pub outcome: JobOutcome,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub name: String,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

/// Job orchestrator for a single namespace
pub struct JobOrchestrator {
    api: Api<Job>,
    pods: PodOrchestrator,
}

impl JobOrchestrator {
    /// Create a new job orchestrator
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client.clone(), namespace),
            pods: PodOrchestrator::new(client, namespace),
        }
    }

    /// Create a uniquely named Job, wait for it to finish, and return its output
    pub async fn create(&self, settings: &JobSettings) -> Result<JobRun> {
        let job = build_job(&generate_job_name(&settings.base_name), settings);

        let started_at = Utc::now();
        let created = self.api.create(&PostParams::default(), &job).await?;
        let name = created.name_any();
        info!("Job {} created with success", name);

        let outcome = self
            .wait_for_completion(&name, settings.wait_timeout_secs)
            .await?;
        let finished_at = Utc::now();

        let output = self.pod_output(&name).await?;

        Ok(JobRun {
            name,
            outcome,
            output,
            started_at,
            finished_at,
        })
    }

    /// Watch a Job until it reaches a terminal state.
    ///
    /// Without a timeout this waits for as long as the watch stays open.
    pub async fn wait_for_completion(
        &self,
        name: &str,
        timeout_secs: Option<u64>,
    ) -> Result<JobOutcome> {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
        let jobs = watcher(self.api.clone(), config)
            .default_backoff()
            .applied_objects();

        with_timeout(name, timeout_secs, await_job_outcome(name, jobs)).await
    }

    /// Return the log of the first Pod the Job ran in
    pub async fn pod_output(&self, name: &str) -> Result<String> {
        let params = ListParams::default().labels(&job_selector(name));
        let pods = self.pods.list_matching(&params).await?;

        let pod_name = first_pod_name(name, &pods)?;
        debug!("Reading output of job {} from pod {}", name, pod_name);

        self.pods.log(pod_name).await
    }

    /// List Jobs in the namespace
    pub async fn list(&self) -> Result<Vec<JobSummary>> {
        let list = self.api.list(&ListParams::default()).await?;
        let summaries: Vec<JobSummary> = list.items.iter().map(summarize).collect();

        for job in &summaries {
            info!(
                "Job: {} (active: {}, succeeded: {}, failed: {})",
                job.name, job.active, job.succeeded, job.failed
            );
        }

        Ok(summaries)
    }
}

/// Bound a Job wait by `timeout_secs`, or leave it unbounded
async fn with_timeout<F>(name: &str, timeout_secs: Option<u64>, wait: F) -> Result<JobOutcome>
where
    F: Future<Output = Result<JobOutcome>>,
{
    match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                job: name.to_string(),
                timeout_secs: secs,
            })?,
        None => wait.await,
    }
}

/// Consume Job events until one carries a terminal status.
///
/// Watch errors are retried by the watcher's backoff; only a run of
/// `MAX_CONSECUTIVE_WATCH_ERRORS` failures without an event in between ends the wait.
async fn await_job_outcome<S>(name: &str, jobs: S) -> Result<JobOutcome>
where
    S: TryStream<Ok = Job, Error = watcher::Error>,
{
    let mut jobs = pin!(jobs.into_stream());
    let mut consecutive_errors = 0;

    while let Some(event) = jobs.next().await {
        let job = match event {
            Ok(job) => {
                consecutive_errors = 0;
                job
            }
            Err(source) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_WATCH_ERRORS {
                    return Err(OrchestratorError::Watch {
                        job: name.to_string(),
                        source,
                    });
                }
                warn!("Watch on job {} failed, retrying: {}", name, source);
                continue;
            }
        };

        let Some(status) = job.status.as_ref() else {
            info!("Job not finished yet!");
            continue;
        };
        debug!(
            "Job {} status: {}",
            name,
            serde_json::to_string(status).unwrap_or_default()
        );

        match job_outcome(status) {
            Some(JobOutcome::Succeeded) => {
                info!("Job succeeded!");
                return Ok(JobOutcome::Succeeded);
            }
            Some(JobOutcome::Failed) => {
                info!("Job failed!");
                return Ok(JobOutcome::Failed);
            }
            None => info!("Job not finished yet!"),
        }
    }

    Err(OrchestratorError::WatchClosed {
        job: name.to_string(),
    })
}

/// Pick the Pod whose log stands for the Job's output
fn first_pod_name<'a>(job_name: &str, pods: &'a [PodSummary]) -> Result<&'a str> {
    pods.first()
        .map(|pod| pod.name.as_str())
        .ok_or_else(|| OrchestratorError::PodNotFound {
            job: job_name.to_string(),
        })
}

/// Generate a unique, time-ordered Job name ending in `base_name`
pub fn generate_job_name(base_name: &str) -> String {
    format!("{}-{}", Uuid::now_v7().simple(), base_name).to_lowercase()
}

/// Label selector matching the Pods of a Job
pub fn job_selector(job_name: &str) -> String {
    format!("{}={}", JOB_NAME_LABEL, job_name)
}

/// Build the Job object sent to the API server
pub fn build_job(name: &str, settings: &JobSettings) -> Job {
    let command = if settings.command.is_empty() {
        None
    } else {
        Some(settings.command.clone())
    };
    let labels = if settings.labels.is_empty() {
        None
    } else {
        Some(settings.labels.clone())
    };

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: settings.container_name.clone(),
                        image: Some(settings.image.clone()),
                        command,
                        ..Default::default()
                    }],
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Classify a Job status, returning `None` while the Job is still running
pub fn job_outcome(status: &JobStatus) -> Option<JobOutcome> {
    let finished_condition = status
        .conditions
        .iter()
        .flatten()
        .any(|c| (c.type_ == "Complete" || c.type_ == "Failed") && c.status == "True");

    if status.completion_time.is_none() && !finished_condition {
        return None;
    }

    let failed_condition = status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Failed" && c.status == "True");
    if failed_condition {
        return Some(JobOutcome::Failed);
    }

    if status.succeeded.unwrap_or(0) >= 1 {
        Some(JobOutcome::Succeeded)
    } else {
        Some(JobOutcome::Failed)
    }
}

fn summarize(job: &Job) -> JobSummary {
    let status = job.status.as_ref();
    JobSummary {
        name: job.name_any(),
        active: status.and_then(|s| s.active).unwrap_or(0),
        succeeded: status.and_then(|s| s.succeeded).unwrap_or(0),
        failed: status.and_then(|s| s.failed).unwrap_or(0),
    }
}
