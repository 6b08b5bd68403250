//! Shared retry policy for every network-facing call.
//!
//! Both inventory clients and the backfill dispatcher apply the same
//! [`RetryPolicy`] value; callers only decide which failures are transient.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Exponential backoff with a bounded attempt count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// Outcome of a single failed attempt, as judged by the caller.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth retrying. `retry_after` replaces the computed delay once.
    Transient {
        error: E,
        retry_after: Option<Duration>,
    },
    /// Retrying cannot help.
    Permanent(E),
}

impl<E> AttemptError<E> {
    pub fn transient(error: E) -> Self {
        AttemptError::Transient {
            error,
            retry_after: None,
        }
    }
}

/// Final error after the policy gave up.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
    /// `true` when the last failure was permanent rather than exhausted.
    pub permanent: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            multiplier,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Backoff before retry number `retry` (1 = the first retry), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let raw = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exp);
        Duration::from_millis((raw as u64).min(self.max_delay_ms))
    }

    /// Backoff with up to 10% jitter added.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let spread = base.as_millis() as u64 / 10 + 1;
        // Jitter without rand: nanosecond fraction of the wall clock.
        let jitter_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64
            % spread;
        if base.is_zero() {
            return base;
        }
        base + Duration::from_millis(jitter_ms)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Each call sleeps only its
    /// own backoff, so concurrent callers never wait on each other.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Permanent(error)) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: error,
                        permanent: true,
                    });
                }
                Err(AttemptError::Transient { error, retry_after }) => {
                    if attempt >= max_attempts {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: error,
                            permanent: false,
                        });
                    }
                    let delay = retry_after.unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        op = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4), 2.0)
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(1000), 2.0);
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(4), Duration::from_millis(800));
        assert_eq!(policy.base_delay(5), Duration::from_millis(1000));
        assert!(policy.delay_for(5) <= Duration::from_millis(1101));
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryExhausted<String>> = fast(3)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(AttemptError::transient("flaky".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let err = fast(2)
            .run("test", |_| async { Err::<(), _>(AttemptError::transient("down".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(!err.permanent);
        assert_eq!(err.last_error, "down");
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let err = fast(5)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AttemptError::Permanent("bad request".to_string())) }
            })
            .await
            .unwrap_err();
        assert!(err.permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
