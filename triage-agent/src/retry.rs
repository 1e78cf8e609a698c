//! Retry with backoff for analysis stages.
//!
//! Every stage that can fail internally runs its work through
//! [`with_retry`]. When the attempt budget is spent the stage resolves to a
//! caller-supplied safe default instead of an error. A backend error that
//! is not transient ends the loop early, and a rate-limit hint stretches
//! the next delay up to `max_delay_ms`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backend::LlmError;
use crate::stage::StageOutcome;

/// Attempt budget and backoff for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt (ms)
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay (ms)
    pub max_delay_ms: u64,
    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Retry `max_attempts` times with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay after a failed `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let delay = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay as u64)
    }
}

/// Run `op` under `policy`, falling back to `fallback(last_error)`.
///
/// `op` receives the 1-based attempt number. The result is never an error:
/// exhaustion is reported through [`StageOutcome::degraded`].
pub async fn with_retry<T, F, Fut, D>(
    stage: &str,
    policy: &RetryPolicy,
    mut op: F,
    fallback: D,
) -> StageOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    D: FnOnce(&str) -> T,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        attempts = attempt;
        match op(attempt).await {
            Ok(value) => {
                debug!(stage, attempt, "Stage attempt succeeded");
                return StageOutcome::ok(value, attempt);
            }
            Err(e) => {
                last_error = format!("{:#}", e);
                let backend_error = e.downcast_ref::<LlmError>();
                warn!(
                    stage,
                    attempt,
                    max_attempts,
                    error = %last_error,
                    "Stage attempt failed"
                );
                if backend_error.is_some_and(|b| !b.is_transient()) {
                    warn!(stage, attempt, "Backend error is final, not retrying");
                    break;
                }
                if attempt < max_attempts {
                    let hint = backend_error
                        .and_then(LlmError::retry_after_ms)
                        .map(|ms| Duration::from_millis(ms.min(policy.max_delay_ms)));
                    let delay = policy.delay_for_attempt(attempt).max(hint.unwrap_or_default());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    error!(
        stage,
        attempts,
        error = %last_error,
        "Stage retries exhausted, using safe default"
    );
    StageOutcome::degraded(fallback(&last_error), attempts, last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            "test",
            &RetryPolicy::immediate(3),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        anyhow::bail!("transient");
                    }
                    Ok(attempt)
                }
            },
            |_| 0,
        )
        .await;

        assert_eq!(outcome.value, 3);
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.is_degraded());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_fallback() {
        let calls = AtomicU32::new(0);
        let outcome: StageOutcome<String> = with_retry(
            "test",
            &RetryPolicy::immediate(2),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<String, _>(anyhow::anyhow!("backend down")) }
            },
            |err| format!("default after {}", err),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value, "default after backend down");
        assert_eq!(outcome.degraded.as_deref(), Some("backend down"));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::none()
        };
        let outcome = with_retry("test", &policy, |_| async { Ok(7) }, |_| 0).await;
        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_refusal_stops_retrying() {
        let calls = AtomicU32::new(0);
        let outcome: StageOutcome<u32> = with_retry(
            "classifier",
            &RetryPolicy::immediate(5),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<u32, _>(anyhow::Error::from(LlmError::Refused {
                        reason: "content filter".into(),
                    }))
                }
            },
            |_| 0,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_rate_limit_hint_capped_by_policy() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            "scorer",
            &RetryPolicy::immediate(2),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        return Err(anyhow::Error::from(LlmError::RateLimited {
                            retry_after_ms: Some(60_000),
                        }));
                    }
                    Ok(attempt)
                }
            },
            |_| 0,
        )
        .await;

        // max_delay_ms is 0, so the hint does not stall the test
        assert_eq!(outcome.value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_retrying() {
        let calls = AtomicU32::new(0);
        let outcome: StageOutcome<u32> = with_retry(
            "extraction",
            &RetryPolicy::immediate(4),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<u32, _>(anyhow::Error::from(LlmError::Http {
                        status: 401,
                        body: "invalid api key".into(),
                    }))
                }
            },
            |_| 0,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.is_degraded());
        assert!(outcome.degraded.unwrap().contains("401"));
    }
}
