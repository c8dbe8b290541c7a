//! Projects and their subtasks

use crate::{Collection, Entity, Progress, Progressive, Timestamped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A step within a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub status: Progress,
    /// Display order within the project
    #[serde(default)]
    pub position: u32,
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(id: impl Into<String>, title: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            project_id: String::new(),
            title: title.into(),
            status: Progress::Todo,
            position: 0,
            updated_at,
        }
    }
}

impl Timestamped for Subtask {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for Subtask {
    const COLLECTION: Collection = Collection::Subtasks;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Progressive for Subtask {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn progress(&self) -> Progress {
        self.status
    }
}

/// A household project broken into subtasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: String::new(),
            status: Progress::Todo,
            due_date: None,
            subtasks: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

impl Timestamped for Project {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtask_progress_is_status() {
        let mut subtask = Subtask::new("s1", "Buy paint", Utc::now());
        subtask.status = Progress::InProgress;
        assert_eq!(subtask.progress(), Progress::InProgress);
    }

    #[test]
    fn test_project_deserializes_status() {
        let json = serde_json::json!({
            "id": "pr1",
            "ownerId": "u1",
            "name": "Paint fence",
            "status": "finished",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });
        let project: Project = serde_json::from_value(json).unwrap();
        assert_eq!(project.status, Progress::Finished);
        assert!(project.subtasks.is_empty());
    }
}
