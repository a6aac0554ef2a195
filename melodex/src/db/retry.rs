//! Exponential-backoff retry for transient SQLite lock contention.

use melodex_common::{Error, Result};
use std::time::{Duration, Instant};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Retry `operation` with exponential backoff until `max_wait_ms` elapses.
/// Non-lock errors are returned immediately without retrying.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;
        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "retrying after lock contention");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_lock_contention() => {
                let elapsed = start.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "giving up: database still locked after max retry window"
                    );
                    return Err(Error::DatabaseLocked(format!(
                        "{operation_name} locked after {attempt} attempts ({} ms, max {max_wait_ms} ms)",
                        elapsed.as_millis()
                    )));
                }
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "database locked, backing off"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let result = retry_on_lock("test", 1000, || async { Ok::<i32, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_lock_errors_then_succeeds() {
        let mut attempts = 0;
        let result = retry_on_lock("test", 5000, || {
            attempts += 1;
            async move {
                if attempts < 3 {
                    Err(Error::DatabaseLocked("database is locked".into()))
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn non_lock_error_fails_immediately() {
        let mut attempts = 0;
        let result = retry_on_lock("test", 5000, || {
            attempts += 1;
            async move { Err::<i32, Error>(Error::InvalidArgument("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_wait() {
        let result = retry_on_lock("test", 30, || async {
            Err::<i32, Error>(Error::DatabaseLocked("database is locked".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::DatabaseLocked(_))));
    }
}
