//! Traits shared by every cached record

use crate::Collection;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record that carries a last-modified timestamp
pub trait Timestamped {
    fn updated_at(&self) -> DateTime<Utc>;
}

/// A record stored in a collection under a document id
pub trait Entity: Timestamped + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The collection this record type lives in
    const COLLECTION: Collection;

    /// Document id
    fn id(&self) -> &str;
}

/// Completion progress of a task-like record.
///
/// Ordered so that a later stage compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    #[default]
    Todo,
    InProgress,
    Finished,
}

impl Progress {
    /// Map a boolean completion flag onto the progress scale
    pub fn from_completed(completed: bool) -> Self {
        if completed {
            Progress::Finished
        } else {
            Progress::Todo
        }
    }
}

/// A task-like record whose completion state participates in conflict resolution
pub trait Progressive: Timestamped {
    fn item_id(&self) -> &str;
    fn progress(&self) -> Progress;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_ordering() {
        assert!(Progress::Todo < Progress::InProgress);
        assert!(Progress::InProgress < Progress::Finished);
    }

    #[test]
    fn test_progress_from_completed() {
        assert_eq!(Progress::from_completed(true), Progress::Finished);
        assert_eq!(Progress::from_completed(false), Progress::Todo);
    }

    #[test]
    fn test_progress_serde() {
        let json = serde_json::to_string(&Progress::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
