//! Retry queue for external calls.
//!
//! This crate shields flaky third-party APIs behind a durable retry
//! lifecycle. Failures are classified as retryable or fatal; retryable ones
//! are attempted again with exponential backoff or the server-provided delay.
//!
//! # Modules
//!
//! - `backoff`: delay computation and the ad hoc `retry_with_backoff` helper
//! - `classify`: pluggable error classification
//! - `queue`: the background queue actor and its handle
//! - `error`: error types for external calls and the queue itself

pub mod backoff;
pub mod classify;
pub mod error;
pub mod queue;

pub use backoff::{retry_with_backoff, retry_with_backoff_classified, BackoffPolicy};
pub use classify::{Classification, DefaultClassifier, ErrorClassifier};
pub use error::{CallError, FailureKind, QueueError};
pub use queue::{Invocation, QueueEvent, RetryQueue, RetryQueueConfig};
