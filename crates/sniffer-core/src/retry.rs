use std::time::Duration;

use crate::util::uniform_between;

/// Exponential backoff with additive jitter.
///
/// Attempt `k` (0-based) that fails with a retryable error is followed by a
/// pause of `base_delay * backoff_multiplier^k + uniform(0, jitter_max)`.
/// No pause follows the last attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_max: Duration,
    /// Wait after a 429 that carries no usable `Retry-After`.
    pub rate_limit_fallback: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, multiplier: f64, jitter_max: Duration) -> Self {
        self.base_delay = base_delay;
        self.backoff_multiplier = multiplier;
        self.jitter_max = jitter_max;
        self
    }

    pub fn with_rate_limit_fallback(mut self, fallback: Duration) -> Self {
        self.rate_limit_fallback = fallback;
        self
    }

    /// Deterministic part of the pause after attempt `attempt`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Full pause after attempt `attempt`, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = uniform_between(Duration::ZERO, self.jitter_max);
        self.base_delay_for_attempt(attempt).saturating_add(jitter)
    }

    /// How long to honor a 429: the server's `Retry-After` or the fallback.
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.rate_limit_fallback)
    }

    /// Whether another attempt follows attempt `attempt` (0-based).
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_max: Duration::from_millis(200),
            rate_limit_fallback: Duration::from_secs(60),
        }
    }
}
