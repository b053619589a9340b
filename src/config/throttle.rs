//! Throttle configuration structures.

use serde::{Deserialize, Serialize};

use crate::core::error::ThrottleError;

/// Throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Keep scheduling past job failures instead of dying.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Maximum number of jobs allowed to run concurrently. Must be ≥ 1.
    pub max_concurrent_jobs: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_concurrent_jobs: 1,
        }
    }
}

impl ThrottleConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// `ThrottleError::InvalidConcurrency` when `max_concurrent_jobs` is zero.
    pub fn validate(&self) -> Result<(), ThrottleError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ThrottleError::InvalidConcurrency);
        }
        Ok(())
    }

    /// Parse throttle configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `ThrottleError::InvalidConfig` on parse failure, or the validation
    /// error for out-of-range values.
    pub fn from_json_str(input: &str) -> Result<Self, ThrottleError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| ThrottleError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
