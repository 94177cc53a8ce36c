//! Bounded retry with exponential backoff.
//!
//! Attempt `n` (n > 1) waits `base_delay * 2^(n-2)` first, so the default
//! policy waits 0, 500ms and 1s before its three attempts. Only transient
//! errors are retried, and the wait ends early with
//! [`SourceError::Cancelled`] when the token fires.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::SourceError;

/// Maximum number of attempts per request
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the 1-based `attempt`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, SourceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Request attempt failed"
                    );
                    if attempt >= attempts {
                        return Err(SourceError::RetriesExhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
        }
    }
}
