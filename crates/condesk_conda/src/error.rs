use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// The target environment cannot be used at all. Unlike every other failure
/// this is fatal for the current pass: reconciliation must not silently
/// substitute another environment.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("no such environment prefix: {0}")]
    Unreadable(PathBuf),

    #[error("failed to read environment metadata")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for EnvironmentError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[derive(Debug, Clone, Error)]
pub enum CondaError {
    /// The binary exited unsuccessfully or wrote diagnostics; `stderr` is
    /// surfaced to the user verbatim.
    #[error("conda {operation} failed: {stderr}")]
    Failed { operation: String, stderr: String },

    #[error("conda produced invalid JSON for {operation}")]
    Parse {
        operation: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("could not locate the conda executable")]
    ExecutableNotFound,

    /// The operation needs an environment by name or prefix and cannot run
    /// against "whatever is current".
    #[error("conda {0} requires an explicit environment name or prefix")]
    EnvironmentRequired(String),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("the conda invocation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for CondaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
