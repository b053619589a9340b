//! Jobs and their exactly-once outcome cells.
//!
//! A [`Job`] wraps a caller-supplied thunk and owns the cell its terminal
//! [`Outcome`] is written into. The thunk is invoked at most once, by the
//! owning throttle, never by the caller; any number of observers may hold
//! futures over the cell and all of them resolve to the same outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::error::{AppResult, JobError, ThrottleError};
use crate::core::outcome::Outcome;

/// Boxed future used at the scheduler boundary.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Unique job identifier, used in tracing events.
pub type JobId = Uuid;

/// Write-once cell holding a job's terminal outcome.
///
/// Observers subscribe before or after resolution; each receives a clone of
/// the stored outcome. Resolving twice is a scheduler bug and the second
/// write is dropped.
pub(crate) struct OutcomeCell<T> {
    slot: Arc<Mutex<CellSlot<T>>>,
}

enum CellSlot<T> {
    Pending(Vec<oneshot::Sender<Outcome<T>>>),
    Resolved(Outcome<T>),
}

impl<T> Clone for OutcomeCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> OutcomeCell<T>
where
    T: Clone + Send + 'static,
{
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(CellSlot::Pending(Vec::new()))),
        }
    }

    /// Register an observer. Resolves immediately if the outcome is set.
    fn subscribe(&self) -> oneshot::Receiver<Outcome<T>> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot.lock();
        match &mut *slot {
            CellSlot::Pending(waiters) => waiters.push(tx),
            CellSlot::Resolved(outcome) => {
                let _ = tx.send(outcome.clone());
            }
        }
        rx
    }

    /// Store the outcome and wake every registered observer.
    pub(crate) fn resolve(&self, outcome: Outcome<T>) {
        let waiters = {
            let mut slot = self.slot.lock();
            if matches!(&*slot, CellSlot::Resolved(_)) {
                debug_assert!(false, "job outcome resolved twice");
                return;
            }
            match std::mem::replace(&mut *slot, CellSlot::Resolved(outcome.clone())) {
                CellSlot::Pending(waiters) => waiters,
                CellSlot::Resolved(_) => Vec::new(),
            }
        };
        for tx in waiters {
            // A dropped receiver just means the observer went away.
            let _ = tx.send(outcome.clone());
        }
    }
}

/// A single unit of asynchronous work submitted to a throttle.
///
/// Created by a caller and immediately handed to a throttle, which owns
/// its lifecycle from then on. The caller retains only outcome futures
/// obtained from [`Job::result`].
pub struct Job<T> {
    id: JobId,
    thunk: Box<dyn FnOnce() -> BoxFuture<AppResult<T>> + Send>,
    cell: OutcomeCell<T>,
}

impl<T> Job<T>
where
    T: Clone + Send + 'static,
{
    /// Wrap `thunk` into a job with an empty outcome cell.
    ///
    /// No side effect occurs here; the thunk is not invoked until the
    /// owning throttle admits the job.
    pub fn create<F, Fut>(thunk: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            thunk: Box::new(move || -> BoxFuture<AppResult<T>> { Box::pin(thunk()) }),
            cell: OutcomeCell::new(),
        }
    }

    /// This job's identifier.
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// A future resolving to this job's outcome once it is set.
    ///
    /// May be called any number of times, before or after enqueueing; every
    /// returned future resolves to the same outcome. If the owning throttle
    /// is dropped before the job runs, observers resolve `Aborted`.
    pub fn result(&self) -> OutcomeFuture<T> {
        OutcomeFuture {
            rx: self.cell.subscribe(),
        }
    }

    /// Convert into the type-erased form the throttle queues internally.
    pub(crate) fn into_pending(self, seq: u64) -> PendingJob {
        let Self { id, thunk, cell } = self;
        let run_cell = cell.clone();
        let start = Box::new(move || -> BoxFuture<bool> {
            Box::pin(async move {
                match thunk().await {
                    Ok(value) => {
                        run_cell.resolve(Outcome::Succeeded(value));
                        false
                    }
                    Err(err) => {
                        run_cell.resolve(Outcome::Failed(JobError::new(err)));
                        true
                    }
                }
            })
        });
        let discard = Box::new(move || cell.resolve(Outcome::Aborted));
        PendingJob {
            seq,
            id,
            start,
            discard,
        }
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

/// Type-erased job as held in a throttle's pending queue.
///
/// Exactly one of [`PendingJob::into_run_future`] or [`PendingJob::abort`]
/// is ever invoked for a given job.
pub(crate) struct PendingJob {
    /// Position in the throttle's enqueue order; drives completion watchers.
    pub(crate) seq: u64,
    pub(crate) id: JobId,
    start: Box<dyn FnOnce() -> BoxFuture<bool> + Send>,
    discard: Box<dyn FnOnce() + Send>,
}

impl PendingJob {
    /// Produce the run future. The thunk itself is not invoked until the
    /// future's first poll; the returned flag is true when the job failed.
    pub(crate) fn into_run_future(self) -> BoxFuture<bool> {
        (self.start)()
    }

    /// Resolve `Aborted` without ever invoking the thunk.
    pub(crate) fn abort(self) {
        (self.discard)();
    }
}

/// Future returned by [`Job::result`] and `Throttle::enqueue_outcome`,
/// resolving to the job's full [`Outcome`].
pub struct OutcomeFuture<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Future for OutcomeFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The cell was dropped unresolved: the throttle vanished before
            // the job ran, which is an abort from the observer's view.
            Poll::Ready(Err(_)) => Poll::Ready(Outcome::Aborted),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Future returned by `Throttle::enqueue`, resolving to the job's value and
/// failing on `Aborted` or `Failed` outcomes.
pub struct ValueFuture<T> {
    inner: OutcomeFuture<T>,
}

impl<T> ValueFuture<T> {
    pub(crate) fn new(inner: OutcomeFuture<T>) -> Self {
        Self { inner }
    }
}

impl<T> Future for ValueFuture<T> {
    type Output = Result<T, ThrottleError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(outcome) => Poll::Ready(outcome.into_result()),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn cell_resolves_every_observer_with_the_same_outcome() {
        let cell: OutcomeCell<u32> = OutcomeCell::new();
        let mut early = cell.subscribe();
        cell.resolve(Outcome::Succeeded(42));
        let mut late = cell.subscribe();

        assert!(matches!(early.try_recv(), Ok(Outcome::Succeeded(42))));
        assert!(matches!(late.try_recv(), Ok(Outcome::Succeeded(42))));
    }

    #[test]
    fn cell_ignores_second_resolution() {
        let cell: OutcomeCell<u32> = OutcomeCell::new();
        cell.resolve(Outcome::Succeeded(1));
        // Release builds drop the second write; the first value sticks.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cell.resolve(Outcome::Aborted);
        }));
        let _ = result;
        let mut rx = cell.subscribe();
        assert!(matches!(rx.try_recv(), Ok(Outcome::Succeeded(1))));
    }

    #[test]
    fn dropped_job_reads_as_aborted() {
        let job = Job::create(|| async { Ok(5_u32) });
        let result = job.result();
        drop(job);
        assert!(matches!(
            result.now_or_never(),
            Some(Outcome::Aborted)
        ));
    }

    #[tokio::test]
    async fn run_future_defers_the_thunk_to_first_poll() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let job = Job::create(move || {
            flag.store(true, Ordering::SeqCst);
            async { Ok(1_u32) }
        });
        let result = job.result();

        let run = job.into_pending(0).into_run_future();
        assert!(!invoked.load(Ordering::SeqCst));

        let failed = run.await;
        assert!(invoked.load(Ordering::SeqCst));
        assert!(!failed);
        assert!(matches!(result.await, Outcome::Succeeded(1)));
    }

    #[tokio::test]
    async fn aborted_job_never_invokes_the_thunk() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let job = Job::create(move || {
            flag.store(true, Ordering::SeqCst);
            async { Ok(1_u32) }
        });
        let result = job.result();

        job.into_pending(0).abort();
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(matches!(result.await, Outcome::Aborted));
    }
}
