//! Plant records with photos and care schedules

use crate::{Collection, Entity, Progress, Progressive, Timestamped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A photo attached to a plant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Photo {
    pub fn new(id: impl Into<String>, url: impl Into<String>, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            uploaded_at,
            caption: None,
        }
    }
}

/// Kind of recurring care a plant needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CareKind {
    #[default]
    Watering,
    Fertilizing,
    Pruning,
    Repotting,
    Other,
}

/// A care task scheduled for a plant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareTask {
    pub id: String,
    #[serde(default)]
    pub plant_id: String,
    pub title: String,
    #[serde(default)]
    pub kind: CareKind,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CareTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            plant_id: String::new(),
            title: title.into(),
            kind: CareKind::default(),
            completed: false,
            due_date: None,
            updated_at,
        }
    }
}

impl Timestamped for CareTask {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for CareTask {
    const COLLECTION: Collection = Collection::CareTasks;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Progressive for CareTask {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn progress(&self) -> Progress {
        Progress::from_completed(self.completed)
    }
}

/// A plant owned by a household member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub care_tasks: Vec<CareTask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plant {
    /// Create a plant with empty optional fields, created and updated at `at`
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
            species: String::new(),
            description: String::new(),
            photos: Vec::new(),
            care_tasks: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

impl Timestamped for Plant {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for Plant {
    const COLLECTION: Collection = Collection::Plants;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_serializes_camel_case() {
        let at = Utc::now();
        let mut plant = Plant::new("p1", "u1", "Ficus", at);
        plant.care_tasks.push(CareTask::new("c1", "Water", at));

        let value = serde_json::to_value(&plant).unwrap();
        assert_eq!(value["ownerId"], "u1");
        assert!(value.get("careTasks").is_some());
        assert_eq!(value["careTasks"][0]["completed"], false);
    }

    #[test]
    fn test_plant_missing_optional_fields_default() {
        let json = serde_json::json!({
            "id": "p1",
            "ownerId": "u1",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });
        let plant: Plant = serde_json::from_value(json).unwrap();
        assert!(plant.name.is_empty());
        assert!(plant.photos.is_empty());
    }

    #[test]
    fn test_care_task_progress_follows_completed_flag() {
        let mut task = CareTask::new("c1", "Water", Utc::now());
        assert_eq!(task.progress(), Progress::Todo);
        task.completed = true;
        assert_eq!(task.progress(), Progress::Finished);
    }
}
