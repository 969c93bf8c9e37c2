//! Retry policy shared by the FTP transport and the scheduler bring-up path.

use std::time::Duration;

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Multiplier applied per further attempt; `1.0` keeps a flat delay.
    pub factor: f64,
}

impl RetryPolicy {
    /// Policy for `registerScheduler` during bring-up: flat 3 s backoff on
    /// connection refusal, up to 50 attempts.
    #[must_use]
    pub fn scheduler_bringup() -> Self {
        Self {
            max_attempts: 50,
            initial_backoff: Duration::from_secs(3),
            factor: 1.0,
        }
    }

    /// Policy for FTP transfers: doubling millisecond backoff, 6 attempts.
    #[must_use]
    pub fn ftp() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(2),
            factor: 2.0,
        }
    }

    /// Delay to sleep after a failed `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        self.initial_backoff.mul_f64(factor)
    }

    /// Whether another attempt may follow a failure of `attempt` (0-indexed).
    #[must_use]
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}
