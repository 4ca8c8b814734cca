/// Errors raised by the resource orchestrators
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The Kubernetes API rejected or failed a request
    #[error("Kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch on job {job} failed: {source}")]
    Watch {
        job: String,
        #[source]
        source: kube::runtime::watcher::Error,
    },

    #[error("watch on job {job} ended before the job finished")]
    WatchClosed { job: String },

    #[error("job {job} did not finish within {timeout_secs} seconds")]
    Timeout { job: String, timeout_secs: u64 },

    #[error("no pod found for job {job}")]
    PodNotFound { job: String },

    #[error("failed to load kubeconfig {path}: {source}")]
    Kubeconfig {
        path: String,
        #[source]
        source: kube::config::KubeconfigError,
    },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
