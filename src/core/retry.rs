//! Retry policy for transient download failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often a download is attempted and how long to wait in between.
///
/// Only transient download failures are retried; integrity errors
/// end the fetch immediately. Missing YAML keys take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total downloads tried for one fetch, the first one included
    pub max_attempts: u32,

    /// Wait before the second download
    pub initial_delay_ms: u64,

    /// Upper bound on any single wait
    pub max_delay_ms: u64,

    /// Growth factor applied to the wait after every failed download
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Download once and give up on the first failure
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Wait after download number `attempt` (1-based) has failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Whether another download may follow attempt number `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
