//! Stand-alone household tasks

use crate::{Collection, Entity, Timestamped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-off task outside any project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleTask {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SimpleTask {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        title: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: title.into(),
            completed: false,
            due_date: None,
            updated_at,
        }
    }
}

impl Timestamped for SimpleTask {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for SimpleTask {
    const COLLECTION: Collection = Collection::SimpleTasks;

    fn id(&self) -> &str {
        &self.id
    }
}
