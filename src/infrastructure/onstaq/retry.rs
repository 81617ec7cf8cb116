//! Retry policy with exponential backoff for upstream requests.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use super::error::OnstaqApiError;

/// Exponential backoff: `initial * 2^attempt`, capped at `max_backoff_ms`.
/// Only transient errors are retried.
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Execute an operation, retrying transient failures.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, OnstaqApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OnstaqApiError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        ?backoff,
                        error = %err,
                        "retrying upstream request"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_calculate_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 1_000, 8_000);
        assert_eq!(policy.calculate_backoff(0), Duration::from_millis(1_000));
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(2_000));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(4_000));
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(8_000));
        assert_eq!(policy.calculate_backoff(4), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn test_retry_transient_then_succeed() {
        let policy = RetryPolicy::new(3, 10, 100);
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(OnstaqApiError::ServerError(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "boom".to_string(),
                        ))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, 10, 100);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OnstaqApiError::NotFound("item".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhaust() {
        let policy = RetryPolicy::new(2, 10, 100);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OnstaqApiError::RateLimitExceeded)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
