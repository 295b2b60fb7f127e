//! Bounded retry with exponential backoff for sink writes.
//!
//! Delay before retry `n` (1-based) is
//! `min(initial * multiplier^(n-1), max) + rand(0..=jitter)`; every attempt
//! is bounded by `attempt_timeout`.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::{RetryConfig, TimeoutConfig};
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first. Always >= 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
    pub attempt_timeout: Duration,
}

/// Why a single attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Attempt budget used up.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryExhausted {
    pub operation: &'static str,
    pub attempts: u32,
    pub last_error: AttemptError,
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(retry.max_backoff_ms),
            multiplier: retry.multiplier,
            jitter: Duration::from_millis(retry.jitter_ms),
            attempt_timeout: Duration::from_millis(timeouts.sink_write_ms),
        }
    }

    /// Backoff before retry `retry` (1-based), without jitter.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        if scaled_ms.is_finite() && scaled_ms < self.max_backoff.as_millis() as f64 {
            Duration::from_millis(scaled_ms.round() as u64)
        } else {
            self.max_backoff
        }
    }

    fn jittered_delay(&self, retry: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        self.backoff_delay(retry) + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted.
    ///
    /// Returns the value and the number of attempts it took.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok((value, attempt)),
                Ok(Err(e)) => AttemptError::Storage(e),
                Err(_) => AttemptError::Timeout(self.attempt_timeout),
            };

            if attempt >= self.max_attempts {
                return Err(RetryExhausted {
                    operation,
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.jittered_delay(attempt);
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "Sink write attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
