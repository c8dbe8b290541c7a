//! Collection names used to key cached records and remote documents

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named collection of documents in the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Plants,
    Projects,
    #[serde(rename = "tasks")]
    SimpleTasks,
    Subtasks,
    CareTasks,
}

impl Collection {
    /// Every collection, in a stable order
    pub const ALL: [Collection; 5] = [
        Collection::Plants,
        Collection::Projects,
        Collection::SimpleTasks,
        Collection::Subtasks,
        Collection::CareTasks,
    ];

    /// Wire name of the collection
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Plants => "plants",
            Collection::Projects => "projects",
            Collection::SimpleTasks => "tasks",
            Collection::Subtasks => "subtasks",
            Collection::CareTasks => "care_tasks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ModelError::UnknownCollection(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_round_trips_through_str() {
        for collection in Collection::ALL {
            let parsed: Collection = collection.as_str().parse().unwrap();
            assert_eq!(parsed, collection);
        }
    }

    #[test]
    fn test_unknown_collection() {
        let result = "gardens".parse::<Collection>();
        assert!(matches!(result, Err(ModelError::UnknownCollection(_))));
    }

    #[test]
    fn test_serde_name_matches_wire_name() {
        for collection in Collection::ALL {
            let json = serde_json::to_string(&collection).unwrap();
            assert_eq!(json, format!("\"{}\"", collection.as_str()));
        }
    }
}
