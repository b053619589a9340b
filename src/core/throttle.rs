//! The admission-controlled scheduler bounding concurrent job execution.
//!
//! A [`Throttle`] owns a FIFO queue of pending jobs, a running-job set, the
//! concurrency bound, the continue-on-error policy, and a death flag. Jobs
//! are admitted from the queue head while capacity and liveness allow; each
//! admitted job runs on the [`Spawn`] substrate and, on reaching a terminal
//! outcome, frees its slot and re-triggers admission.
//!
//! All bookkeeping for one throttle lives under a single mutex: the
//! capacity check-and-increment, the death transition, and the backlog
//! drain are each one critical section. The mutex is never held across the
//! execution of a job's thunk, only around queue and counter mutation.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::ThrottleConfig;
use crate::core::error::{AppResult, ThrottleError};
use crate::core::job::{Job, OutcomeFuture, PendingJob, ValueFuture};

/// Abstraction for spawning job execution on a runtime.
pub trait Spawn {
    /// Spawn an async task.
    ///
    /// Implementations must hand `fut` to the runtime without polling or
    /// dropping it inline: this method is called while throttle bookkeeping
    /// is in progress and either would re-enter it.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// One `prior_jobs_done` subscription: the snapshot of job sequences that
/// were pending or running at call time, and the channel to complete once
/// they have all settled.
struct Watcher {
    remaining: HashSet<u64>,
    done: oneshot::Sender<()>,
}

/// Mutable scheduler state, guarded by the throttle's mutex.
struct SchedState {
    pending: VecDeque<PendingJob>,
    /// Sequences of admitted jobs that have not yet reached a terminal
    /// outcome. Its size is the running count and never exceeds the bound.
    running: HashSet<u64>,
    /// Monotonic: once true, never false again.
    is_dead: bool,
    next_seq: u64,
    watchers: Vec<Watcher>,
}

impl SchedState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            running: HashSet::new(),
            is_dead: false,
            next_seq: 0,
            watchers: Vec::new(),
        }
    }

    /// Mark `seq` terminal for every watcher; complete emptied watchers.
    fn settle(&mut self, seq: u64) {
        let mut i = 0;
        while i < self.watchers.len() {
            self.watchers[i].remaining.remove(&seq);
            if self.watchers[i].remaining.is_empty() {
                let watcher = self.watchers.swap_remove(i);
                let _ = watcher.done.send(());
            } else {
                i += 1;
            }
        }
    }
}

struct Inner<S> {
    max_concurrent_jobs: usize,
    continue_on_error: bool,
    spawner: S,
    state: Mutex<SchedState>,
}

impl<S> Inner<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Admission step. Runs under the state lock: pops head jobs while
    /// capacity and liveness allow and hands their run futures to the
    /// spawner, so the capacity check-and-increment is indivisible and
    /// hand-off order is exactly enqueue order.
    // `guard` is moved into the spawned future and its `failed` field is
    // assigned from `run.await`; the value is read in `SlotGuard::drop`, but
    // rustc's liveness pass does not see that Drop read and so fires
    // false-positive `unused_assignments`/`unused_variables` here.
    #[allow(unused_assignments, unused_variables)]
    fn pump(inner: &Arc<Self>, state: &mut SchedState) {
        if state.is_dead {
            return;
        }
        while state.running.len() < inner.max_concurrent_jobs {
            let Some(job) = state.pending.pop_front() else {
                break;
            };
            let seq = job.seq;
            state.running.insert(seq);
            tracing::debug!(
                job = %job.id,
                seq,
                running = state.running.len(),
                "job admitted"
            );
            eprintln!("PUMP: before into_run_future seq={seq}");
            let run = job.into_run_future();
            eprintln!("PUMP: after into_run_future seq={seq}");
            // The guard frees the slot even if the job's future panics or
            // is dropped by the substrate.
            let mut guard = SlotGuard {
                inner: Arc::clone(inner),
                seq,
                failed: true,
            };
            eprintln!("PUMP[{:?}]: before spawn seq={seq}", std::thread::current().id());
            inner.spawner.spawn(Box::pin(async move {
                guard.failed = run.await;
            }));
            eprintln!("PUMP[{:?}]: after spawn seq={seq} running={} max={}", std::thread::current().id(), state.running.len(), inner.max_concurrent_jobs);
        }
        eprintln!("PUMP[{:?}]: loop exited running={}", std::thread::current().id(), state.running.len());
    }

    /// Completion bookkeeping for one admitted job: free the slot, settle
    /// watchers, run the death check, and re-enter admission. One critical
    /// section.
    fn finish(inner: &Arc<Self>, seq: u64, failed: bool) {
        eprintln!("FINISH[{:?}]: want lock seq={seq} failed={failed} try_lock_held_elsewhere={}", std::thread::current().id(), inner.state.try_lock().is_none());
        let mut state = inner.state.lock();
        eprintln!("FINISH[{:?}]: got lock seq={seq}", std::thread::current().id());
        state.running.remove(&seq);
        state.settle(seq);
        tracing::debug!(seq, failed, running = state.running.len(), "job finished");

        if failed && !inner.continue_on_error && !state.is_dead {
            state.is_dead = true;
            tracing::warn!(
                seq,
                backlog = state.pending.len(),
                "job failed; throttle dying, aborting backlog"
            );
            let drained: Vec<PendingJob> = state.pending.drain(..).collect();
            for job in drained {
                let job_seq = job.seq;
                // Resolving wakes observers through their wakers only; no
                // user code runs inside this critical section.
                job.abort();
                state.settle(job_seq);
            }
        }

        Self::pump(inner, &mut state);
    }
}

/// Frees a running slot when the job's run future completes, panics, or is
/// dropped by the substrate. `failed` starts pessimistic so an unwound job
/// is treated as a failure.
struct SlotGuard<S>
where
    S: Spawn + Send + Sync + 'static,
{
    inner: Arc<Inner<S>>,
    seq: u64,
    failed: bool,
}

impl<S> Drop for SlotGuard<S>
where
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        Inner::finish(&self.inner, self.seq, self.failed);
    }
}

/// The admission-controlled scheduler bounding concurrent job execution.
///
/// Cheap to clone; all clones share one scheduler. See the module docs for
/// the concurrency model.
pub struct Throttle<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Throttle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Throttle<S>
where
    S: Spawn + Send + Sync + 'static,
{
    fn new(continue_on_error: bool, max_concurrent_jobs: usize, spawner: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent_jobs,
                continue_on_error,
                spawner,
                state: Mutex::new(SchedState::new()),
            }),
        }
    }

    /// Create a throttle running jobs on the given spawner.
    ///
    /// # Errors
    ///
    /// `ThrottleError::InvalidConcurrency` when `max_concurrent_jobs` is zero.
    pub fn with_spawner(
        continue_on_error: bool,
        max_concurrent_jobs: usize,
        spawner: S,
    ) -> Result<Self, ThrottleError> {
        if max_concurrent_jobs == 0 {
            return Err(ThrottleError::InvalidConcurrency);
        }
        Ok(Self::new(continue_on_error, max_concurrent_jobs, spawner))
    }

    /// Create a throttle from validated configuration.
    ///
    /// # Errors
    ///
    /// Propagates `ThrottleConfig::validate` failures.
    pub fn from_config(cfg: &ThrottleConfig, spawner: S) -> Result<Self, ThrottleError> {
        cfg.validate()?;
        Ok(Self::new(
            cfg.continue_on_error,
            cfg.max_concurrent_jobs,
            spawner,
        ))
    }

    /// Concurrency-1 constructor used by the sequencer; a bound of one is
    /// always valid so this cannot fail.
    pub(crate) fn sequential(continue_on_error: bool, spawner: S) -> Self {
        Self::new(continue_on_error, 1, spawner)
    }

    /// Append `job` to the pending queue and attempt admission.
    ///
    /// # Errors
    ///
    /// `ThrottleError::Dead` when the throttle has died; the job is not
    /// enqueued and is dropped, so its observers resolve `Aborted`.
    pub fn enqueue_job<T>(&self, job: Job<T>) -> Result<(), ThrottleError>
    where
        T: Clone + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.is_dead {
            return Err(ThrottleError::Dead);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        tracing::debug!(job = %job.id(), seq, "job enqueued");
        state.pending.push_back(job.into_pending(seq));
        Inner::pump(&self.inner, &mut state);
        Ok(())
    }

    /// Build a job from `thunk`, enqueue it, and return a future of its
    /// value. The future fails when the job failed or was aborted.
    ///
    /// # Errors
    ///
    /// `ThrottleError::Dead` immediately when the throttle has died.
    pub fn enqueue<T, F, Fut>(&self, thunk: F) -> Result<ValueFuture<T>, ThrottleError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        Ok(ValueFuture::new(self.enqueue_outcome(thunk)?))
    }

    /// Build a job from `thunk`, enqueue it, and return a future of its
    /// full [`crate::core::Outcome`], allowing failure-tolerant composition
    /// without error handling.
    ///
    /// # Errors
    ///
    /// `ThrottleError::Dead` immediately when the throttle has died.
    pub fn enqueue_outcome<T, F, Fut>(&self, thunk: F) -> Result<OutcomeFuture<T>, ThrottleError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let job = Job::create(thunk);
        let result = job.result();
        self.enqueue_job(job)?;
        Ok(result)
    }

    /// A future resolving once every job that was pending or running at the
    /// moment of this call has reached a terminal outcome. Jobs enqueued
    /// after the call do not delay it; already-aborted jobs are terminal
    /// and never block it.
    pub fn prior_jobs_done(&self) -> PriorJobsDone {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.state.lock();
        let mut remaining: HashSet<u64> = state.running.iter().copied().collect();
        remaining.extend(state.pending.iter().map(|job| job.seq));
        if remaining.is_empty() {
            let _ = tx.send(());
        } else {
            tracing::debug!(tracked = remaining.len(), "prior-jobs-done watcher armed");
            state.watchers.push(Watcher {
                remaining,
                done: tx,
            });
        }
        PriorJobsDone { rx }
    }

    /// Number of jobs enqueued but not yet admitted.
    pub fn num_jobs_waiting_to_start(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of jobs admitted and not yet terminal.
    pub fn num_jobs_running(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    /// Whether this throttle has died. Death is permanent.
    pub fn is_dead(&self) -> bool {
        self.inner.state.lock().is_dead
    }

    /// The concurrency bound fixed at construction.
    pub fn max_concurrent_jobs(&self) -> usize {
        self.inner.max_concurrent_jobs
    }

    /// The failure policy fixed at construction.
    pub fn continue_on_error(&self) -> bool {
        self.inner.continue_on_error
    }
}

#[cfg(feature = "tokio-runtime")]
impl Throttle<crate::runtime::TokioSpawner> {
    /// Create a throttle running jobs on the current Tokio runtime.
    ///
    /// Must be called from within a Tokio runtime context.
    ///
    /// # Errors
    ///
    /// `ThrottleError::InvalidConcurrency` when `max_concurrent_jobs` is zero.
    pub fn create(
        continue_on_error: bool,
        max_concurrent_jobs: usize,
    ) -> Result<Self, ThrottleError> {
        Self::with_spawner(
            continue_on_error,
            max_concurrent_jobs,
            crate::runtime::TokioSpawner::current(),
        )
    }
}

/// Future returned by [`Throttle::prior_jobs_done`].
pub struct PriorJobsDone {
    rx: oneshot::Receiver<()>,
}

impl Future for PriorJobsDone {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            // A dropped watcher means the throttle is gone, and its
            // backlog with it: everything tracked is terminal.
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}
