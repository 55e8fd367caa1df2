//! Bounded exponential back-off around fallible operations.
//!
//! One combinator for every call site that wants retries, paired with the
//! retryability classifier on [`CoreError`]: storage and transient sink
//! failures are retried, validation and invalidated-context failures are
//! surfaced on the first attempt.

use std::time::Duration;

use tracing::debug;

use crate::error::CoreError;

/// Retry policy: attempt ceiling plus back-off base.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Back-off before retry number `attempt` (0-based): base * 2^attempt,
    /// with the exponent capped so the delay cannot overflow.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.min(6))
    }
}

/// Run `op`, retrying retryable failures with exponential back-off up to
/// the policy ceiling.
///
/// # Errors
/// Returns the first non-retryable error immediately, or the last error
/// once attempts are exhausted.
pub async fn retry_with_backoff<T, F>(policy: RetryPolicy, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Result<T, CoreError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                debug!("attempt {} failed ({err}), retrying in {delay:?}", attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
