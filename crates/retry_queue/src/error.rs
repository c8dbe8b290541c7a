//! Error types for external calls and the retry queue.

use std::time::Duration;
use thiserror::Error;

/// Failure of a call to an external API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// Credentials were rejected or have expired
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Rate limit or quota hit; the server may say when to come back
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Network unreachable or the service answered with a 5xx
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// No response within the call timeout
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// The request itself was rejected as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse failure category used by classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    RateLimit,
    Transient,
    Malformed,
}

impl CallError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CallError::Unauthorized(_) => FailureKind::Authentication,
            CallError::RateLimited { .. } => FailureKind::RateLimit,
            CallError::Unavailable(_) | CallError::Timeout(_) => FailureKind::Transient,
            CallError::InvalidRequest(_) => FailureKind::Malformed,
        }
    }

    /// Map an HTTP status and optional `Retry-After` header to a call error.
    ///
    /// Returns `None` for success statuses.
    pub fn from_status(status: u16, retry_after: Option<&str>, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let error = match status {
            200..=399 => return None,
            401 | 403 => CallError::Unauthorized(message),
            429 => CallError::RateLimited {
                message,
                retry_after: retry_after.and_then(parse_retry_after),
            },
            408 => CallError::Unavailable(message),
            400..=499 => CallError::InvalidRequest(message),
            _ => CallError::Unavailable(message),
        };
        Some(error)
    }
}

/// Parse a `Retry-After` header given in whole seconds
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Errors from the queue handle itself
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Retry queue has shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_success_is_none() {
        assert!(CallError::from_status(200, None, "ok").is_none());
        assert!(CallError::from_status(204, None, "").is_none());
    }

    #[test]
    fn test_from_status_rate_limit_reads_retry_after() {
        let error = CallError::from_status(429, Some("120"), "slow down").unwrap();
        assert_eq!(
            error,
            CallError::RateLimited {
                message: "slow down".to_string(),
                retry_after: Some(Duration::from_secs(120)),
            }
        );
    }

    #[test]
    fn test_from_status_unparseable_retry_after() {
        let error = CallError::from_status(429, Some("soon"), "slow down").unwrap();
        assert!(matches!(error, CallError::RateLimited { retry_after: None, .. }));
    }

    #[test]
    fn test_from_status_kinds() {
        let kind = |status| CallError::from_status(status, None, "").unwrap().kind();
        assert_eq!(kind(401), FailureKind::Authentication);
        assert_eq!(kind(403), FailureKind::Authentication);
        assert_eq!(kind(400), FailureKind::Malformed);
        assert_eq!(kind(422), FailureKind::Malformed);
        assert_eq!(kind(408), FailureKind::Transient);
        assert_eq!(kind(503), FailureKind::Transient);
    }

    #[test]
    fn test_error_display() {
        let err = CallError::Unauthorized("token expired".to_string());
        assert_eq!(err.to_string(), "Authentication failed: token expired");
    }
}
