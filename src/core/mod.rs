//! Core scheduling: jobs, outcomes, the throttle, and the sequencer.

pub mod error;
pub mod job;
pub mod outcome;
pub mod sequencer;
pub mod throttle;

pub use error::{AppResult, JobError, ThrottleError};
pub use job::{BoxFuture, Job, JobId, OutcomeFuture, ValueFuture};
pub use outcome::Outcome;
pub use sequencer::{Sequencer, StateFuture};
pub use throttle::{PriorJobsDone, Spawn, Throttle};
