//! Retry decisions with exponential backoff
//!
//! [`RetryPolicy::should_retry`] is a pure function of the failure kind and the
//! attempt number; it never sleeps. Waiting out the returned delay is the
//! caller's business (see [`run_with_retry`]), which keeps the decision logic
//! testable without real time passing.

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, connection faults, 5xx, storage and cache errors
    Transient,
    /// 4xx other than 429, size limit, misclassification
    Permanent,
    /// HTTP 429; retried with a longer backoff
    RateLimited,
}

/// Decision on whether to retry a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        /// How long to wait before the next attempt
        delay: Duration,
        /// Number of the next attempt (1-indexed)
        attempt: u32,
    },
    DoNotRetry {
        reason: String,
    },
}

/// Exponential backoff policy
///
/// ```text
/// delay(attempt) = min(base * 2^(attempt - 1) * (429 ? rate_limit_multiplier : 1), max_delay)
/// ```
///
/// With the defaults (base 1s, 3 attempts) a transient failure is retried after
/// 1s and then 2s before the task gives up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            rate_limit_multiplier: RetryConfig::default().rate_limit_multiplier,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            rate_limit_multiplier: config.rate_limit_multiplier.max(1),
        }
    }

    #[must_use]
    pub fn with_rate_limit_multiplier(mut self, multiplier: u32) -> Self {
        self.rate_limit_multiplier = multiplier.max(1);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed with `kind`
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if kind == FailureKind::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let mut delay = self.backoff(attempt);
        if kind == FailureKind::RateLimited {
            delay = delay
                .saturating_mul(self.rate_limit_multiplier)
                .min(self.max_delay);
        }

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Like [`should_retry`](Self::should_retry), but waits at least as long as the
    /// server asked through `Retry-After` (still capped by the maximum delay)
    pub fn should_retry_after(
        &self,
        kind: FailureKind,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        match self.should_retry(kind, attempt) {
            RetryDecision::Retry { delay, attempt } => RetryDecision::Retry {
                delay: retry_after
                    .map(|ra| delay.max(ra.min(self.max_delay)))
                    .unwrap_or(delay),
                attempt,
            },
            other => other,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// An error the retry loop can classify
pub trait Retryable {
    fn failure_kind(&self) -> FailureKind;

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for crate::crawler::FetchError {
    fn failure_kind(&self) -> FailureKind {
        crate::crawler::FetchError::failure_kind(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        crate::crawler::FetchError::retry_after(self)
    }
}

impl Retryable for crate::crawler::TaskError {
    fn failure_kind(&self) -> FailureKind {
        crate::crawler::TaskError::failure_kind(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        crate::crawler::TaskError::retry_after(self)
    }
}

/// Runs `operation` until it succeeds or the policy gives up
///
/// The closure receives the 1-indexed attempt number. Returns the final result
/// together with the number of attempts made, which never exceeds the policy's
/// maximum.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> (Result<T, E>, u32)
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(error) => {
                match policy.should_retry_after(error.failure_kind(), attempt, error.retry_after()) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } => {
                        debug!(
                            attempt,
                            next_attempt = next,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "will retry"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(attempt, reason = %reason, error = %error, "giving up");
                        return (Err(error), attempt);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(32))
    }

    #[test]
    fn test_permanent_never_retries() {
        assert!(matches!(
            policy().should_retry(FailureKind::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_exponential_delays() {
        let p = policy();
        assert_eq!(
            p.should_retry(FailureKind::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
        assert_eq!(
            p.should_retry(FailureKind::Transient, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
                attempt: 3
            }
        );
    }

    #[test]
    fn test_attempts_capped() {
        assert!(matches!(
            policy().should_retry(FailureKind::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
        let single = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(single.max_attempts(), 1);
        assert!(matches!(
            single.should_retry(FailureKind::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_rate_limited_backs_off_longer() {
        let p = policy();
        assert_eq!(
            p.should_retry(FailureKind::RateLimited, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(4),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_delay_capped_at_max() {
        let p = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5));
        match p.should_retry(FailureKind::Transient, 8) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(5)),
            other => panic!("unexpected {:?}", other),
        }
        match p.should_retry(FailureKind::RateLimited, 3) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_extends_delay() {
        let p = policy();
        match p.should_retry_after(FailureKind::RateLimited, 1, Some(Duration::from_secs(10))) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(10)),
            other => panic!("unexpected {:?}", other),
        }
        match p.should_retry_after(FailureKind::RateLimited, 1, Some(Duration::from_secs(600))) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(32)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[derive(Debug)]
    struct Flaky(FailureKind);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl Retryable for Flaky {
        fn failure_kind(&self) -> FailureKind {
            self.0
        }
    }

    #[tokio::test]
    async fn test_run_with_retry_succeeds_on_third_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let (result, attempts) = run_with_retry(&p, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Flaky(FailureKind::Transient))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_with_retry_never_exceeds_max() {
        let p = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10));
        let (result, attempts) =
            run_with_retry(&p, |_| async { Err::<(), _>(Flaky(FailureKind::Transient)) }).await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_run_with_retry_stops_on_permanent() {
        let p = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10));
        let (result, attempts) =
            run_with_retry(&p, |_| async { Err::<(), _>(Flaky(FailureKind::Permanent)) }).await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
