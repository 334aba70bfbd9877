use crate::database_ops::store::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff for store calls: attempt `n` failing with a retryable
/// error waits `min(base_delay * 2^(n-1), max_delay)` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single attempt; expiry counts as a retryable failure.
    pub call_timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Final error of a retried operation and the attempts spent on it.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: StoreError,
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts are spent. Returns the value and the number
/// of attempts used.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    mut op: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(policy.call_timeout)),
        };
        match outcome {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "store call failed; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(RetryFailure { attempts: attempt, error }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let p = BackoffPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..BackoffPolicy::default()
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(400));
        assert_eq!(p.delay_after(4), Duration::from_millis(500));
        assert_eq!(p.delay_after(60), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (value, attempts) = retry_with_backoff(&fast(5), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(StoreError::Transient(format!("boom {n}")))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let failure = retry_with_backoff(&fast(3), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::Transient("down".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn integrity_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let failure = retry_with_backoff(&fast(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::Integrity("orphan".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(matches!(failure.error, StoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn slow_calls_time_out_and_retry() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            call_timeout: Duration::from_millis(20),
            ..fast(2)
        };
        let (value, attempts) = retry_with_backoff(&policy, "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(n)
        })
        .await
        .unwrap();
        assert_eq!((value, attempts), (2, 2));
    }
}
