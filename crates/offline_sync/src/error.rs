//! Error types for synchronization

use household_model::{Collection, ModelError};
use std::time::Duration;
use store::StoreError;
use thiserror::Error;

/// Errors from remote calls and journal replay
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network unreachable or the remote answered with a server error
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// Credentials rejected; never retried silently
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Payload rejected by the remote
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the failure is expected to clear up on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Unavailable(_) | SyncError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
