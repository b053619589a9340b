//! Terminal job outcomes.

use crate::core::error::{JobError, ThrottleError};

/// The terminal result of a job. Exactly one variant is assigned to a
/// given job, exactly once, ever.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The thunk ran to completion and produced a value.
    Succeeded(T),
    /// The job was discarded before it started; its thunk was never invoked.
    Aborted,
    /// The thunk ran and returned an error.
    Failed(JobError),
}

impl<T> Outcome<T> {
    /// True when the job produced a value.
    pub const fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// True when the job was discarded without running.
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// True when the thunk returned an error.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Collapse into a `Result`, rendering `Aborted` and `Failed` as errors.
    ///
    /// This is the conversion behind the value-returning `enqueue` path.
    pub fn into_result(self) -> Result<T, ThrottleError> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Aborted => Err(ThrottleError::Aborted),
            Self::Failed(err) => Err(ThrottleError::JobFailed(err)),
        }
    }
}
