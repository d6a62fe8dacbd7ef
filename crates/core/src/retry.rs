//! Exponential-backoff retry policy for calls to external capabilities.
//!
//! Every external call site (generation, face analysis, background removal)
//! goes through [`RetryPolicy::run`]. The caller supplies a classifier that
//! decides which errors are worth retrying; everything else is returned to
//! the caller on the first failure. Each attempt is bounded by
//! [`RetryPolicy::call_timeout`] because providers may hang.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Default number of attempts (including the first call).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Default per-attempt timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(180);

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Values below 1 are
    /// treated as 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Factor by which the delay grows after each retryable failure.
    pub multiplier: f64,
    /// Upper bound on the wall-clock time of a single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: 2.0,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Calculate the next backoff delay from the current delay.
pub fn next_delay(current: Duration, multiplier: f64) -> Duration {
    let next_ms = (current.as_millis() as f64 * multiplier) as u64;
    Duration::from_millis(next_ms)
}

impl RetryPolicy {
    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent.
    ///
    /// When the budget runs out the last retryable error is returned. A
    /// timed-out attempt is converted into `E` via `From<Elapsed>` and is
    /// classified like any other error.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        operation: &str,
        is_retryable: C,
        mut call: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: From<Elapsed> + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(elapsed) => Err(E::from(elapsed)),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if is_retryable(&e) && attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable failure, backing off",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, self.multiplier);
                }
                Err(e) => {
                    if is_retryable(&e) {
                        tracing::error!(operation, attempt, error = %e, "Retry attempts exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
