//! Pluggable classification of call failures.

use crate::error::CallError;
use std::time::Duration;

/// Whether a failure should be retried, and how soon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
    /// Minimum wait before the next attempt, when the failure dictates one
    pub retry_after: Option<Duration>,
}

impl Classification {
    pub fn fatal() -> Self {
        Self {
            retryable: false,
            retry_after: None,
        }
    }

    pub fn retry() -> Self {
        Self {
            retryable: true,
            retry_after: None,
        }
    }

    pub fn retry_after(delay: Duration) -> Self {
        Self {
            retryable: true,
            retry_after: Some(delay),
        }
    }
}

/// Decides how the queue treats a failed call
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &CallError) -> Classification;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&CallError) -> Classification + Send + Sync,
{
    fn classify(&self, error: &CallError) -> Classification {
        self(error)
    }
}

/// Standard classification table.
///
/// | failure | outcome |
/// |---|---|
/// | authentication | fatal |
/// | rate limit / quota | retry after the server delay, or `rate_limit_delay` |
/// | network / unavailable / timeout | retry with computed backoff |
/// | malformed request | fatal |
#[derive(Debug, Clone, Copy)]
pub struct DefaultClassifier {
    pub rate_limit_delay: Duration,
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_secs(60),
        }
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &CallError) -> Classification {
        match error {
            CallError::RateLimited { retry_after, .. } => {
                Classification::retry_after(retry_after.unwrap_or(self.rate_limit_delay))
            }
            CallError::Unavailable(_) | CallError::Timeout(_) => Classification::retry(),
            CallError::Unauthorized(_) | CallError::InvalidRequest(_) => Classification::fatal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let classifier = DefaultClassifier::default();

        assert!(!classifier
            .classify(&CallError::Unauthorized("expired".into()))
            .retryable);
        assert!(!classifier
            .classify(&CallError::InvalidRequest("bad date".into()))
            .retryable);
        assert_eq!(
            classifier.classify(&CallError::Unavailable("503".into())),
            Classification::retry()
        );
        assert_eq!(
            classifier.classify(&CallError::Timeout(Duration::from_secs(10))),
            Classification::retry()
        );
    }

    #[test]
    fn test_rate_limit_uses_server_delay() {
        let classifier = DefaultClassifier::default();
        let error = CallError::RateLimited {
            message: "quota".into(),
            retry_after: Some(Duration::from_secs(120)),
        };
        assert_eq!(
            classifier.classify(&error),
            Classification::retry_after(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_rate_limit_falls_back_to_default_delay() {
        let classifier = DefaultClassifier {
            rate_limit_delay: Duration::from_secs(30),
        };
        let error = CallError::RateLimited {
            message: "quota".into(),
            retry_after: None,
        };
        assert_eq!(classifier.classify(&error).retry_after, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_closure_classifier() {
        let never = |_: &CallError| Classification::fatal();
        assert!(!never.classify(&CallError::Unavailable("x".into())).retryable);
    }
}
