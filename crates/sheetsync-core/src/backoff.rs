//! Bounded exponential retry around remote spreadsheet calls.
//!
//! Transient failures (rate limiting, temporary unavailability) wait
//! `base_delay * 2^n` plus a random jitter before the next attempt.
//! Unclassified failures wait the same exponential delay without jitter.
//! Fatal failures are returned immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::config::RetryPolicy;
use crate::sheets::{FailureClass, SheetsError};

#[derive(Debug, Error)]
pub enum BackoffError {
    #[error("Remote call rejected: {0}")]
    Rejected(SheetsError),
    #[error("Remote call failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: SheetsError },
}

impl BackoffError {
    /// The error returned by the final attempt
    pub const fn last_error(&self) -> &SheetsError {
        match self {
            Self::Rejected(error) | Self::Exhausted { last: error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffExecutor {
    policy: RetryPolicy,
}

impl BackoffExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt budget
    /// is spent.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, BackoffError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SheetsError>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let class = error.class();
            if class == FailureClass::Fatal {
                tracing::warn!(
                    label,
                    attempt = attempt + 1,
                    status = ?error.status(),
                    error = %error,
                    "Remote call rejected"
                );
                return Err(BackoffError::Rejected(error));
            }

            attempt += 1;
            if attempt >= max_attempts {
                tracing::warn!(
                    label,
                    attempts = attempt,
                    status = ?error.status(),
                    error = %error,
                    "Remote call retries exhausted"
                );
                return Err(BackoffError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay(attempt - 1, class);
            tracing::warn!(
                label,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                status = ?error.status(),
                error = %error,
                "Retrying remote call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Wait before the attempt following zero-based attempt `attempt`.
    fn delay(&self, attempt: u32, class: FailureClass) -> Duration {
        let backoff = self.exponential(attempt);
        match class {
            FailureClass::Transient => backoff.saturating_add(jitter(self.policy.max_jitter)),
            FailureClass::Unclassified | FailureClass::Fatal => backoff,
        }
    }

    fn exponential(&self, attempt: u32) -> Duration {
        self.policy
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Uniform draw from `[0, max)`, in whole nanoseconds.
fn jitter(max: Duration) -> Duration {
    let max = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..max))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    fn executor(max_retries: u32, base_ms: u64, jitter_ms: u64) -> BackoffExecutor {
        BackoffExecutor::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_jitter: Duration::from_millis(jitter_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_within_delay_envelope() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = executor(5, 1_000, 500)
            .execute("read", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SheetsError::api(503, "unavailable")) }
            })
            .await;

        let elapsed = started.elapsed();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(BackoffError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last.status(), Some(503));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        // 1s + 2s + 4s + 8s, plus up to 500ms of jitter per retry
        assert!(elapsed >= Duration::from_secs(15), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(17), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_status_is_attempted_once() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = executor(5, 1_000, 500)
            .execute("write", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SheetsError::api(403, "forbidden")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(BackoffError::Rejected(_))));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_failures_retry_without_jitter() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = executor(3, 100, 10_000)
            .execute("read", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SheetsError::InvalidResponse("truncated".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(matches!(
            err.last_error(),
            SheetsError::InvalidResponse(message) if message == "truncated"
        ));
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let value = executor(5, 10, 0)
            .execute("read", || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call < 3 {
                        Err(SheetsError::api(429, "rate limited"))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exponential_delay_saturates() {
        let executor = executor(10, 1_000, 0);
        assert_eq!(executor.exponential(0), Duration::from_secs(1));
        assert_eq!(executor.exponential(3), Duration::from_secs(8));
        assert_eq!(
            executor.exponential(64),
            Duration::from_secs(u64::from(u32::MAX))
        );
        assert!(jitter(Duration::from_millis(500)) < Duration::from_millis(500));
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_below_its_bound() {
        assert_eq!(jitter(Duration::from_nanos(1)), Duration::ZERO);
        for _ in 0..1_000 {
            assert!(jitter(Duration::from_nanos(3)) < Duration::from_nanos(3));
        }
    }
}
