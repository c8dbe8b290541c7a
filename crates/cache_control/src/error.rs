//! Cache control errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The network could not be reached or the fetch failed
    #[error("Network error: {0}")]
    Network(String),

    #[error("Fetch of {0} timed out")]
    Timeout(String),

    /// Storing a response would exceed the storage quota
    #[error("Cache storage quota exceeded")]
    QuotaExceeded,

    /// A shell resource could not be pre-cached during install
    #[error("Failed to pre-cache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Invalid resource pattern: {0}")]
    Pattern(String),

    /// The control loop has stopped
    #[error("Cache control loop closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
