//! Retry loop with exponential backoff, jitter and `Retry-After` support.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::{ApiError, Result, RetryPolicy};

/// Fraction of the computed delay used as the jitter amplitude.
const JITTER_FACTOR: f64 = 0.2;

/// Classified result of one physical attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// The attempt produced a payload.
    Success(T),
    /// A transient failure; `error` is surfaced if the budget runs out.
    Retryable {
        error: ApiError,
        /// Server-supplied wait that replaces the computed backoff.
        retry_after: Option<Duration>,
    },
    /// A failure retrying would not fix.
    Terminal(ApiError),
}

impl RetryPolicy {
    /// Pre-jitter delay before retry number `attempt + 1`.
    ///
    /// `min(base_delay * backoff_multiplier^attempt, max_delay)`
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.max(1.0);
        let delay_ms = (self.base_delay_ms as f64 * multiplier.powi(exponent))
            .min(self.max_delay_ms as f64);
        millis_to_duration(delay_ms)
    }

    /// [`backoff_delay`](Self::backoff_delay) perturbed uniformly by ±20%.
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let unit = rand::rng().random_range(-1.0..=1.0);
        apply_jitter(self.backoff_delay(attempt), unit)
    }
}

/// Applies `unit` (in `[-1, 1]`) scaled by the jitter factor to `delay`.
fn apply_jitter(delay: Duration, unit: f64) -> Duration {
    let delay_ms = delay.as_secs_f64() * 1_000.0;
    millis_to_duration(delay_ms + delay_ms * JITTER_FACTOR * unit.clamp(-1.0, 1.0))
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1_000.0).round() as u64)
}

/// Runs one logical request as a bounded sequence of attempts.
#[derive(Clone, Debug, Default)]
pub struct RetryEngine {
    policy: RetryPolicy,
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `attempt` with indices `0..=max_retries` until it succeeds,
    /// fails terminally, or the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let mut index = 0usize;
        loop {
            match attempt(index).await {
                AttemptOutcome::Success(value) => return Ok(value),
                AttemptOutcome::Terminal(error) => return Err(error),
                AttemptOutcome::Retryable { error, retry_after } => {
                    if index >= self.policy.max_retries {
                        return Err(error);
                    }
                    let delay = retry_after.unwrap_or_else(|| self.policy.jittered_delay(index));

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt = index,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        server_hint = retry_after.is_some(),
                        error = %error,
                        "retrying request"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = error;

                    sleep(delay).await;
                    index += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{apply_jitter, AttemptOutcome, RetryEngine};
    use crate::{ApiError, RetryPolicy};

    fn http_error(status: u16) -> ApiError {
        ApiError::Http {
            status,
            detail: format!("status {status}"),
            body: String::new(),
        }
    }

    fn policy(max_retries: usize, base_delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_grows_exponentially_until_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = (0..8)
            .map(|attempt| policy.backoff_delay(attempt).as_millis())
            .collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 32_000, 32_000]
        );
    }

    #[test]
    fn backoff_handles_huge_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(usize::MAX), Duration::from_millis(32_000));
    }

    #[test]
    fn zero_base_delay_never_waits() {
        let policy = RetryPolicy {
            base_delay_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(usize::MAX), Duration::ZERO);
    }

    #[test]
    fn multiplier_below_one_is_flat() {
        let policy = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_spans_twenty_percent() {
        let delay = Duration::from_millis(1_000);
        assert_eq!(apply_jitter(delay, -1.0).as_millis(), 800);
        assert_eq!(apply_jitter(delay, 0.0).as_millis(), 1_000);
        assert_eq!(apply_jitter(delay, 1.0).as_millis(), 1_200);
        assert_eq!(apply_jitter(Duration::ZERO, -1.0), Duration::ZERO);
    }

    #[test]
    fn jittered_delay_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            let base = policy.backoff_delay(attempt).as_secs_f64();
            for _ in 0..50 {
                let jittered = policy.jittered_delay(attempt).as_secs_f64();
                assert!(jittered >= base * 0.8 - 1e-6, "{jittered} < {base} * 0.8");
                assert!(jittered <= base * 1.2 + 1e-6, "{jittered} > {base} * 1.2");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_retryable_is_attempted_max_retries_plus_one_times() {
        let calls = AtomicUsize::new(0);
        let engine = RetryEngine::new(policy(4, 10));

        let err = engine
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    AttemptOutcome::<()>::Retryable {
                        error: http_error(503),
                        retry_after: None,
                    }
                }
            })
            .await
            .expect_err("must exhaust retries");

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_is_not_retried() {
        for status in [400, 401, 403, 404] {
            let calls = AtomicUsize::new(0);
            let engine = RetryEngine::new(policy(5, 10));
            let err = engine
                .run(|_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { AttemptOutcome::<()>::Terminal(http_error(status)) }
                })
                .await
                .expect_err("must fail");
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(err.status(), Some(status));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = AtomicUsize::new(0);
        let engine = RetryEngine::new(policy(0, 10));
        let result = engine
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    AttemptOutcome::<()>::Retryable {
                        error: http_error(429),
                        retry_after: None,
                    }
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let engine = RetryEngine::new(policy(3, 100));
        let started = Instant::now();

        let value = engine
            .run(|index| async move {
                if index < 2 {
                    AttemptOutcome::Retryable {
                        error: http_error(503),
                        retry_after: None,
                    }
                } else {
                    AttemptOutcome::Success(index)
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(value, 2);
        // 100ms and 200ms, each within ±20%.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(240), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(360), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_overrides_computed_backoff() {
        let engine = RetryEngine::new(policy(1, 30_000));
        let started = Instant::now();

        engine
            .run(|index| async move {
                if index == 0 {
                    AttemptOutcome::Retryable {
                        error: http_error(429),
                        retry_after: Some(Duration::from_secs(2)),
                    }
                } else {
                    AttemptOutcome::Success(())
                }
            })
            .await
            .expect("second attempt succeeds");

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2_010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_sequential_and_indexed() {
        let seen = std::sync::Mutex::new(Vec::new());
        let engine = RetryEngine::new(policy(2, 1));
        let _ = engine
            .run(|index| {
                seen.lock().expect("not poisoned").push(index);
                async {
                    AttemptOutcome::<()>::Retryable {
                        error: http_error(502),
                        retry_after: None,
                    }
                }
            })
            .await;
        assert_eq!(*seen.lock().expect("not poisoned"), vec![0, 1, 2]);
    }
}
