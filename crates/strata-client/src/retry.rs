//! Retry policy for GraphQL requests.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Sample each delay uniformly from `[delay / 2, delay]`.
    pub jitter: bool,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            jitter: true,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after the given 0-based attempt.
    ///
    /// A server-provided `Retry-After` wins over the computed value, capped at
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after.min(self.max_delay);
        }

        let factor = 2u32.saturating_pow(attempt.min(31));
        let delay = self.initial_delay.saturating_mul(factor).min(self.max_delay);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let max = delay.as_millis() as u64;
        let min = max / 2;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Whether the error is worth another attempt.
    pub fn should_retry(&self, err: &Error) -> bool {
        match err {
            Error::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => true,
            Error::RateLimited { .. } => self.retryable_status_codes.contains(&429),
            Error::Api { status, .. } => self.retryable_status_codes.contains(status),
            _ => false,
        }
    }
}
