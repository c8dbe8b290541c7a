//! Tagged union over every record kind

use crate::{
    CareTask, Collection, Entity, ModelError, Plant, Project, Result, SimpleTask, Subtask,
    Timestamped,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record of any kind, tagged by its variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Plant(Plant),
    Project(Project),
    SimpleTask(SimpleTask),
    Subtask(Subtask),
    CareTask(CareTask),
}

impl Record {
    /// Decode an untyped document from `collection`
    pub fn from_value(collection: Collection, value: Value) -> Result<Self> {
        Ok(match collection {
            Collection::Plants => Record::Plant(serde_json::from_value(value)?),
            Collection::Projects => Record::Project(serde_json::from_value(value)?),
            Collection::SimpleTasks => Record::SimpleTask(serde_json::from_value(value)?),
            Collection::Subtasks => Record::Subtask(serde_json::from_value(value)?),
            Collection::CareTasks => Record::CareTask(serde_json::from_value(value)?),
        })
    }

    /// Encode back into an untyped document
    pub fn into_value(self) -> Result<Value> {
        let value = match self {
            Record::Plant(r) => serde_json::to_value(r)?,
            Record::Project(r) => serde_json::to_value(r)?,
            Record::SimpleTask(r) => serde_json::to_value(r)?,
            Record::Subtask(r) => serde_json::to_value(r)?,
            Record::CareTask(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }

    pub fn collection(&self) -> Collection {
        match self {
            Record::Plant(_) => Plant::COLLECTION,
            Record::Project(_) => Project::COLLECTION,
            Record::SimpleTask(_) => SimpleTask::COLLECTION,
            Record::Subtask(_) => Subtask::COLLECTION,
            Record::CareTask(_) => CareTask::COLLECTION,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Plant(r) => r.id(),
            Record::Project(r) => r.id(),
            Record::SimpleTask(r) => r.id(),
            Record::Subtask(r) => r.id(),
            Record::CareTask(r) => r.id(),
        }
    }

    /// Convert into a concrete entity type, failing if the variant differs
    pub fn into_entity<T: Entity>(self) -> Result<T> {
        let actual = self.collection();
        if actual != T::COLLECTION {
            return Err(ModelError::CollectionMismatch {
                expected: T::COLLECTION.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(serde_json::from_value(self.into_value()?)?)
    }
}

impl Timestamped for Record {
    fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Record::Plant(r) => r.updated_at,
            Record::Project(r) => r.updated_at,
            Record::SimpleTask(r) => r.updated_at,
            Record::Subtask(r) => r.updated_at,
            Record::CareTask(r) => r.updated_at,
        }
    }
}

macro_rules! impl_from_entity {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Record {
                fn from(entity: $ty) -> Self {
                    Record::$ty(entity)
                }
            }
        )*
    };
}

impl_from_entity!(Plant, Project, SimpleTask, Subtask, CareTask);
