use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use gemini_image_rs::GenerationError;
use tokio::time::error::Elapsed;

/// Classification of errors for [`RetryPolicy::run`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        GenerationError::is_retryable(self)
    }
}

/// Exponential-backoff retry for async operations.
///
/// After failed attempt `n` (1-based) the policy sleeps
/// `base_delay * 2^(n-1)` before attempt `n + 1`. Attempts never overlap.
///
/// # Example
/// ```
/// use image_batch_runner::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(2));
/// assert_eq!(policy.delay_for(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
/// assert_eq!(policy.total_backoff(2), Duration::from_secs(6));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Optional bound on each single attempt. An attempt that overruns it
    /// fails with the error type's timeout variant and is retried like any
    /// other retryable failure.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Sleep before the attempt that follows failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of the sleeps taken after `failures` consecutive failures.
    pub fn total_backoff(&self, failures: u32) -> Duration {
        (1..=failures).map(|n| self.delay_for(n)).sum()
    }

    /// Run `op` with the error type's own retry classification.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<Elapsed> + Display,
    {
        self.run_with(op, E::is_retryable).await
    }

    /// Run `op`, retrying failures for which `classify` returns `true`.
    ///
    /// Returns the first success, or the last error once attempts are
    /// exhausted or a non-retryable error is seen.
    pub async fn run_with<T, E, F, Fut, C>(&self, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Elapsed> + Display,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(E::from(elapsed)),
                },
                None => op(attempt).await,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !classify(&err) {
                tracing::warn!(attempt, error = %err, "Non-retryable failure");
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(attempt, error = %err, "Retry budget exhausted");
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
