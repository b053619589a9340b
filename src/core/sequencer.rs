//! Mutual exclusion over caller state, built on a concurrency-1 throttle.
//!
//! A [`Sequencer`] owns a piece of caller-defined state and schedules
//! operations against it through an inner throttle with a bound of one.
//! Admission already serializes the operations; the internal async mutex
//! is structurally uncontended and only exists to hand each admitted
//! operation an exclusive `&mut` across its await points.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::error::{AppResult, ThrottleError};
use crate::core::job::ValueFuture;
use crate::core::throttle::{PriorJobsDone, Spawn, Throttle};

/// Future an operation returns from its closure; borrows the sequencer
/// state for the duration of the operation.
pub type StateFuture<'a, R> = Pin<Box<dyn Future<Output = AppResult<R>> + Send + 'a>>;

/// A throttle specialized to concurrency 1 that also owns a piece of
/// mutable state, giving each enqueued operation exclusive access to it.
///
/// State after operation *i* is exactly the input to operation *i + 1*.
/// With the default policy (`continue_on_error = false`) a failing
/// operation kills the sequencer exactly as a throttle death, aborting all
/// later-enqueued operations.
pub struct Sequencer<St, S> {
    throttle: Throttle<S>,
    state: Arc<Mutex<St>>,
}

impl<St, S> Clone for Sequencer<St, S> {
    fn clone(&self) -> Self {
        Self {
            throttle: self.throttle.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<St, S> Sequencer<St, S>
where
    St: Send + 'static,
    S: Spawn + Send + Sync + 'static,
{
    /// Build a sequencer owning `initial_state`, running operations on the
    /// given spawner.
    pub fn with_spawner(initial_state: St, continue_on_error: bool, spawner: S) -> Self {
        Self {
            throttle: Throttle::sequential(continue_on_error, spawner),
            state: Arc::new(Mutex::new(initial_state)),
        }
    }

    /// Schedule `op` against the owned state; returns a future of the
    /// operation's result that fails if the operation returned an error or
    /// was aborted.
    ///
    /// At most one operation is ever executing against the state at a
    /// time, and operations run in enqueue order.
    ///
    /// # Errors
    ///
    /// `ThrottleError::Dead` immediately when the sequencer has died.
    pub fn enqueue<R, F>(&self, op: F) -> Result<ValueFuture<R>, ThrottleError>
    where
        R: Clone + Send + 'static,
        F: for<'a> FnOnce(&'a mut St) -> StateFuture<'a, R> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        self.throttle.enqueue(move || async move {
            let mut guard = state.lock().await;
            op(&mut *guard).await
        })
    }

    /// Number of operations enqueued but not yet started.
    pub fn num_jobs_waiting_to_start(&self) -> usize {
        self.throttle.num_jobs_waiting_to_start()
    }

    /// A future resolving once every operation pending or running at the
    /// moment of this call has settled.
    pub fn prior_jobs_done(&self) -> PriorJobsDone {
        self.throttle.prior_jobs_done()
    }

    /// Whether this sequencer has died. Death is permanent.
    pub fn is_dead(&self) -> bool {
        self.throttle.is_dead()
    }
}

#[cfg(feature = "tokio-runtime")]
impl<St> Sequencer<St, crate::runtime::TokioSpawner>
where
    St: Send + 'static,
{
    /// Build a sequencer owning `initial_state` on the current Tokio
    /// runtime, with the default policy: a failing operation kills it.
    ///
    /// Must be called from within a Tokio runtime context.
    pub fn create(initial_state: St) -> Self {
        Self::create_with_policy(initial_state, false)
    }

    /// Build a sequencer with an explicit failure policy.
    ///
    /// Must be called from within a Tokio runtime context.
    pub fn create_with_policy(initial_state: St, continue_on_error: bool) -> Self {
        Self::with_spawner(
            initial_state,
            continue_on_error,
            crate::runtime::TokioSpawner::current(),
        )
    }
}
