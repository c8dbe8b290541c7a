//! Exponential backoff.
//!
//! The delay before retry `n` (1-based) is `min(base * factor^(n-1), max)`.

use crate::classify::{DefaultClassifier, ErrorClassifier};
use crate::error::CallError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Parameters of an exponential backoff curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            factor,
        }
    }

    /// Delay before retry number `attempt`, where the first retry is attempt 1
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_ms as f64 * self.factor.max(1.0).powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}

/// Run `operation`, retrying retryable failures up to `max_retries` times.
///
/// Failures are classified with [`DefaultClassifier`].
pub async fn retry_with_backoff<T, F, Fut>(
    operation: F,
    max_retries: u32,
    policy: &BackoffPolicy,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    retry_with_backoff_classified(operation, max_retries, policy, &DefaultClassifier::default())
        .await
}

/// Like [`retry_with_backoff`] with a caller-supplied classifier.
///
/// A server-provided delay longer than the computed backoff takes precedence.
pub async fn retry_with_backoff_classified<T, F, Fut>(
    mut operation: F,
    max_retries: u32,
    policy: &BackoffPolicy,
    classifier: &dyn ErrorClassifier,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let classification = classifier.classify(&error);
                if !classification.retryable || attempt >= max_retries {
                    return Err(error);
                }
                attempt += 1;
                let backoff = policy.delay_for_attempt(attempt);
                let delay = classification.retry_after.map_or(backoff, |d| d.max(backoff));
                tracing::debug!(
                    "Retrying external call in {:?} (attempt {}/{}): {}",
                    delay,
                    attempt,
                    max_retries,
                    error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_documented_delay_sequence() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=8)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(30_000));
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_max(
            base in 1u64..10_000,
            max in 1u64..120_000,
            factor in 1.0f64..4.0,
            attempt in 1u32..200,
        ) {
            let policy = BackoffPolicy { base_delay_ms: base, max_delay_ms: max, factor };
            prop_assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(max));
        }

        #[test]
        fn prop_delay_is_monotonic(attempt in 1u32..100) {
            let policy = BackoffPolicy::default();
            prop_assert!(policy.delay_for_attempt(attempt) <= policy.delay_for_attempt(attempt + 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_with_backoff(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CallError::Unavailable("503".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
            &BackoffPolicy::default(),
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_with_backoff(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::Unavailable("down".into())) }
            },
            2,
            &BackoffPolicy::default(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_with_backoff(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::Unauthorized("expired".into())) }
            },
            5,
            &BackoffPolicy::default(),
        )
        .await;

        assert!(matches!(result, Err(CallError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_delay_overrides_shorter_backoff() {
        let start = tokio::time::Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_with_backoff(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(CallError::RateLimited {
                            message: "quota".into(),
                            retry_after: Some(Duration::from_secs(120)),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
            3,
            &BackoffPolicy::default(),
        )
        .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(120));
    }
}
