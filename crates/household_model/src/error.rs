//! Error types for model conversions

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collection mismatch: expected {expected}, got {actual}")]
    CollectionMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
