//! # Job Throttle
//!
//! A bounded-concurrency job scheduler for asynchronous workloads.
//!
//! This library provides an admission-control layer over an async runtime:
//! jobs are queued in arrival order and at most a configured number run
//! concurrently. The throttle never reorders its queue, resolves every job
//! to exactly one terminal [`core::Outcome`], and defines precise failure
//! semantics: either keep scheduling past errors, or "die" and abort all
//! not-yet-started work.
//!
//! ## Core Problem Solved
//!
//! Async runtimes happily run an unbounded number of tasks, but real
//! workloads sit in front of bounded resources:
//!
//! - **Connection and handle limits**: only so many sockets, file handles,
//!   or client sessions may be open at once
//! - **Ordering requirements**: work must start in submission order, not in
//!   whatever order the runtime polls tasks
//! - **Failure containment**: one bad job should either be isolated or
//!   deterministically cancel everything queued behind it
//! - **Serialized state**: some state must only ever be touched by one
//!   operation at a time, without sprinkling locks through caller code
//!
//! ## Key Features
//!
//! - **Bounded admission**: at most `max_concurrent_jobs` run at once
//! - **Strict FIFO start order**: jobs are handed to the runtime in the
//!   order they were enqueued
//! - **Death and abort**: with `continue_on_error = false`, a failing job
//!   permanently kills the throttle and drains the backlog to `Aborted`
//! - **Completion tracking**: `prior_jobs_done` resolves once every job
//!   pending or running at the time of the call has settled
//! - **Sequencer**: a concurrency-1 throttle owning a piece of state, each
//!   operation receiving exclusive access to it
//! - **Runtime-agnostic**: the scheduler is written against a small `Spawn`
//!   trait; a Tokio adapter ships behind the default `tokio-runtime` feature
//!
//! ## Throttle
//!
//! ```rust,ignore
//! use job_throttle::core::Throttle;
//!
//! // At most 2 jobs in flight; a failure kills the throttle.
//! let throttle = Throttle::create(false, 2)?;
//!
//! let first = throttle.enqueue(|| async { Ok(fetch_page(0).await?) })?;
//! let second = throttle.enqueue(|| async { Ok(fetch_page(1).await?) })?;
//! let third = throttle.enqueue(|| async { Ok(fetch_page(2).await?) })?;
//!
//! // Jobs 0 and 1 start immediately; job 2 starts when a slot frees.
//! let pages = (first.await?, second.await?, third.await?);
//! ```
//!
//! ## Sequencer
//!
//! ```rust,ignore
//! use job_throttle::core::Sequencer;
//!
//! let seq = Sequencer::create(Vec::new());
//!
//! // Each operation gets exclusive `&mut` access to the owned state.
//! let len = seq.enqueue(|log: &mut Vec<String>| Box::pin(async move {
//!     log.push("entry".to_string());
//!     Ok(log.len())
//! }))?;
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: jobs, outcomes, the throttle, and the sequencer.
pub mod core;
/// Configuration models for throttles.
pub mod config;
/// Builders to construct throttles from configuration.
pub mod builders;
/// Runtime adapters implementing the `Spawn` abstraction.
pub mod runtime;
/// Shared utilities.
pub mod util;
