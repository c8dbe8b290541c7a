//! Calendar service errors

use retry_queue::{CallError, QueueError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    /// The calendar account rejected our credentials
    #[error("Calendar authorization failed: {0}")]
    Unauthorized(String),

    /// The event was rejected as malformed
    #[error("Invalid calendar event: {0}")]
    InvalidEvent(String),

    /// A failure the classifier marked fatal that is neither of the above
    #[error("Calendar call failed: {0}")]
    Call(CallError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<CallError> for CalendarError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Unauthorized(message) => CalendarError::Unauthorized(message),
            CallError::InvalidRequest(message) => CalendarError::InvalidEvent(message),
            other => CalendarError::Call(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalendarError>;
