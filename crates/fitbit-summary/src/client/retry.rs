//! Exponential backoff for transient transport failures

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Retry configuration for HTTP requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    max_attempts: u32,
    /// Delay before the first retry
    initial_backoff: Duration,
    /// Maximum delay between retries
    max_backoff: Duration,
    /// Backoff multiplier
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// Create a policy with conservative delays
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Override the initial backoff (mainly for tests)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Run an operation, retrying while it fails with a transient error
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
