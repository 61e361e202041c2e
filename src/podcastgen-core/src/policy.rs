//! Timeout and retry policy for external calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::UpstreamError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each attempt after that.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before `attempt` (0-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Per-call timeout plus retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl CallPolicy {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Run `call` until it succeeds or attempts are exhausted.
    ///
    /// Every attempt gets its own timeout; an elapsed timeout is reported as
    /// [`UpstreamError::Timeout`] and retried like any other failure.
    pub async fn call<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout(self.timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(call = label, attempt = attempt + 1, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        warn!(
                            call = label,
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            error = %e,
                            "call failed, retrying"
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            UpstreamError::Service(format!("{} made no attempts", label))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy::new(4, Duration::from_secs(1));
        assert_eq!(retry.delay_before(0), Duration::ZERO);
        assert_eq!(retry.delay_before(1), Duration::from_secs(1));
        assert_eq!(retry.delay_before(2), Duration::from_secs(2));
        assert_eq!(retry.delay_before(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let policy = CallPolicy::new(
            Duration::from_secs(5),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );

        let result = policy
            .call("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(UpstreamError::Transport("connection reset".to_string()))
                } else {
                    Ok("audio")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "audio");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let policy = CallPolicy::new(Duration::from_secs(5), RetryPolicy::new(2, Duration::ZERO));

        let result: Result<(), _> = policy
            .call("broken", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::Status {
                    status: 500 + n as u16,
                    body: "boom".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::Status { status: 501, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_failure() {
        let policy = CallPolicy::new(Duration::from_millis(10), RetryPolicy::none());

        let result: Result<(), _> = policy
            .call("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }
}
