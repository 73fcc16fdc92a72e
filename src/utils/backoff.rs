//! Bounded exponential backoff and the retry wrapper applied to every store
//! and bus operation.
//!
//! No relay operation is allowed to block indefinitely: each attempt runs
//! under a timeout, failed attempts sleep for an exponentially growing delay,
//! and the caller gets the last error once the attempt cap is reached.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::utils::error::RelayError;

/// Exponential backoff with a capped delay. Delays double per attempt until
/// `max` and can be reset after a successful operation.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Return the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Retry parameters shared by the gateway and the multiplexer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub op_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            op_timeout: Duration::from_secs(2),
        }
    }
}

/// Run `f` until it succeeds, the attempt cap is hit, or an attempt times
/// out on the final try. Each attempt is bounded by `policy.op_timeout`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut f: F,
) -> Result<T, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RelayError>>,
{
    let mut backoff = ExponentialBackoff::new(policy.base_delay, policy.max_delay);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match tokio::time::timeout(policy.op_timeout, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                warn!("{op} failed (attempt {attempt}): {err}");
            }
            Err(_) => {
                if attempt >= policy.max_attempts {
                    return Err(RelayError::Timeout(policy.op_timeout));
                }
                warn!("{op} timed out (attempt {attempt})");
            }
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_until_cap() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn backoff_reset_restarts_sequence() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(50), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            op_timeout: Duration::from_secs(1),
        };
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, "test op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RelayError::Bus("transient".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_surfaces_last_error_at_cap() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            op_timeout: Duration::from_secs(1),
        };

        let result: Result<(), _> = retry_with_backoff(&policy, "test op", || async {
            Err(RelayError::Store("down".into()))
        })
        .await;

        assert!(matches!(result, Err(RelayError::Store(_))));
    }
}
