use std::time::Duration;

use scriptorium_core::config::LedgerConfig;
use scriptorium_core::types::ErrorCode;

/// Attempt bound and backoff schedule for retryable work.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff_ms: config.retry.initial_backoff_ms,
            max_backoff_ms: config.retry.max_backoff_ms,
        }
    }

    /// Whether a failure on `attempt` (1-based) gets another try.
    pub fn should_retry(&self, code: ErrorCode, attempt: u32) -> bool {
        code.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`: exponential, capped,
    /// with 0.8x to 1.2x jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.max_backoff_ms);
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((ms as f64 * jitter) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}
