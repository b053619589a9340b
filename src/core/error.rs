//! Error types for throttle operations.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type produced by job thunks; errors are captured into outcomes.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// An error returned by a job thunk, captured once and shared with every
/// observer of that job's outcome.
///
/// The original `anyhow::Error` sits behind an `Arc` so clones are cheap
/// and all outcome futures for one job see the same failure.
#[derive(Debug, Clone)]
pub struct JobError(Arc<anyhow::Error>);

impl JobError {
    /// Capture a thunk error.
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(AsRef::<dyn std::error::Error>::as_ref(self.0.as_ref()))
    }
}

/// Errors produced by throttle operations.
#[derive(Debug, Clone, Error)]
pub enum ThrottleError {
    /// The throttle has died; submissions are permanently rejected.
    #[error("throttle is dead")]
    Dead,
    /// `max_concurrent_jobs` was zero at construction time.
    #[error("max_concurrent_jobs must be at least 1")]
    InvalidConcurrency,
    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The job was discarded before it started because the throttle died.
    #[error("job aborted before it started")]
    Aborted,
    /// The job's thunk returned an error.
    #[error("job failed: {0}")]
    JobFailed(#[from] JobError),
}
