//! Fluent construction of throttles.

use crate::config::ThrottleConfig;
use crate::core::error::ThrottleError;
use crate::core::throttle::{Spawn, Throttle};

/// Builder assembling a [`Throttle`] from configuration values.
#[derive(Debug, Clone, Default)]
pub struct ThrottleBuilder {
    config: ThrottleConfig,
}

impl ThrottleBuilder {
    /// Start from the default configuration (bound 1, die on error).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ThrottleConfig) -> Self {
        Self { config }
    }

    /// Keep scheduling past job failures instead of dying.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.config.continue_on_error = continue_on_error;
        self
    }

    /// Set the concurrency bound. Validated at build time.
    pub fn max_concurrent_jobs(mut self, max_concurrent_jobs: usize) -> Self {
        self.config.max_concurrent_jobs = max_concurrent_jobs;
        self
    }

    /// Build a throttle running jobs on the given spawner.
    ///
    /// # Errors
    ///
    /// `ThrottleError::InvalidConcurrency` when the bound is zero.
    pub fn build<S>(self, spawner: S) -> Result<Throttle<S>, ThrottleError>
    where
        S: Spawn + Send + Sync + 'static,
    {
        Throttle::from_config(&self.config, spawner)
    }

    /// Build a throttle running jobs on the current Tokio runtime.
    ///
    /// Must be called from within a Tokio runtime context.
    ///
    /// # Errors
    ///
    /// `ThrottleError::InvalidConcurrency` when the bound is zero.
    #[cfg(feature = "tokio-runtime")]
    pub fn build_current(self) -> Result<Throttle<crate::runtime::TokioSpawner>, ThrottleError> {
        self.build(crate::runtime::TokioSpawner::current())
    }
}
