//! Bounded retry with fixed or exponential delays.
//!
//! Only errors for which [`utoken::Error::is_retryable`] holds are retried;
//! anything else is returned after the first attempt.

use std::future::Future;
use std::time::Duration;

use utoken::Error;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// `delay × 2^(n-1)` before retry `n`.
    Exponential,
}

/// How often and how patiently to retry an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least one.
    pub max_attempts: u32,
    /// Base delay.
    pub delay: Duration,
    /// Delay growth.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Exponentially growing delay between attempts.
    #[must_use]
    pub const fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            delay: base,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }
}

/// Result of a retried operation together with the attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final result. On exhaustion this is [`Error::RetriesExhausted`].
    pub result: Result<T, Error>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or the policy runs out.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(operation, attempt, error = %e, "permanent failure, not retrying");
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(operation, attempts = attempt, error = %e, "retries exhausted");
                return Attempted {
                    result: Err(Error::RetriesExhausted {
                        operation: operation.to_owned(),
                        attempts: attempt,
                        source: Box::new(e),
                    }),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2), "first retry");
        assert_eq!(policy.delay_after(2), Duration::from_secs(4), "second retry");
        assert_eq!(policy.delay_after(3), Duration::from_secs(8), "third retry");
        let fixed = RetryPolicy::fixed(3, Duration::from_secs(5));
        assert_eq!(fixed.delay_after(3), Duration::from_secs(5), "fixed");
    }

    #[tokio::test]
    async fn transient_errors_use_the_whole_budget() {
        let calls = AtomicU32::new(0);
        let out: Attempted<()> = retry(RetryPolicy::fixed(3, Duration::ZERO), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::rpc(1, "timeout")) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3, "three calls");
        assert_eq!(out.attempts, 3, "attempt count reported");
        assert!(
            matches!(out.result, Err(Error::RetriesExhausted { attempts: 3, .. })),
            "terminal error names attempts"
        );
    }

    #[tokio::test]
    async fn permanent_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let out: Attempted<()> = retry(RetryPolicy::fixed(5, Duration::ZERO), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::config("no key")) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "single call");
        assert!(matches!(out.result, Err(Error::Configuration(_))), "error kept as-is");
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let out = retry(RetryPolicy::exponential(3, Duration::ZERO), "op", |attempt| async move {
            if attempt < 2 {
                Err(Error::rpc(1, "nonce too low"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(out.result.ok(), Some(2), "second attempt wins");
        assert_eq!(out.attempts, 2, "two attempts");
    }
}
