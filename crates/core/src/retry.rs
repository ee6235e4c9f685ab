use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Per-attempt timeout and bounded retries for collaborator calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries, backoff: Duration::from_millis(200) }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("timed out after {attempts} attempt(s)")]
    TimedOut { attempts: u32 },
    #[error("failed after {attempts} attempt(s): {error}")]
    Failed { attempts: u32, error: E },
}

/// Runs `operation` up to `retries + 1` times, abandoning any attempt that exceeds the
/// timeout. Backoff grows linearly with the attempt number.
pub async fn with_timeout_and_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.retries + 1;
    let mut last_error = RetryError::TimedOut { attempts: 0 };

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => {
                tracing::debug!(attempt, error = %error, "collaborator call failed");
                last_error = RetryError::Failed { attempts: attempt, error };
            }
            Err(_) => {
                tracing::debug!(attempt, "collaborator call timed out");
                last_error = RetryError::TimedOut { attempts: attempt };
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.backoff * attempt).await;
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{with_timeout_and_retry, RetryError, RetryPolicy};

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_timeout_and_retry(fast_policy(2), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err("transient")
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reports_last_failure_when_retries_are_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_timeout_and_retry(fast_policy(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("analytics unavailable") }
        })
        .await;

        assert_eq!(result, Err(RetryError::Failed { attempts: 2, error: "analytics unavailable" }));
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let result: Result<(), RetryError<&str>> = with_timeout_and_retry(fast_policy(0), || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(RetryError::TimedOut { attempts: 1 }));
    }
}
