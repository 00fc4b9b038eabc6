//! Retry helpers
//!
//! `retry_on_lock` retries SQLite write-lock contention with exponential
//! backoff until a wall-clock budget is spent. `retry_with_backoff` retries
//! any fallible async call a fixed number of times.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{HomeworkError, HwResult};

/// Retry a database operation on "database is locked" errors
///
/// Backoff starts at 10ms and doubles, capped at 1000ms. Other errors are
/// returned immediately.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> HwResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HwResult<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) if err.is_database_locked() => {
                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Attempt count and backoff schedule for a collaborator call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Call `operation` until it succeeds or `policy.max_attempts` calls fail
///
/// The closure receives the 1-based attempt number. The last error is
/// returned when every attempt fails.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, HomeworkError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, HomeworkError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> HomeworkError {
        HomeworkError::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[tokio::test]
    async fn test_retry_on_lock_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, HomeworkError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_on_lock_recovers_after_contention() {
        let calls = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(locked())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_on_lock_gives_up_after_budget() {
        let result = retry_on_lock("test_op", 50, || async { Err::<i32, _>(locked()) }).await;
        assert!(matches!(result, Err(ref e) if e.is_database_locked()));
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let calls = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(HomeworkError::Validation("bad".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(8000),
        };

        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff_for(6), Duration::from_millis(8000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        };

        let result: Result<(), _> = retry_with_backoff("flaky", policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HomeworkError::ExternalService("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(HomeworkError::ExternalService(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_returns_first_success() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        };

        let result = retry_with_backoff("flaky", policy, |attempt| async move {
            if attempt < 2 {
                Err(HomeworkError::ExternalService("down".into()))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
