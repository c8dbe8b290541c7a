//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how much the local store may persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// File holding the serialized store
    pub path: PathBuf,
    /// Optional ceiling on the serialized size in bytes
    pub max_bytes: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("household-cache.json"),
            max_bytes: None,
        }
    }
}

impl StoreConfig {
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Build the file backend described by this config
    pub fn file_backend(&self) -> crate::FileBackend {
        let backend = crate::FileBackend::new(&self.path);
        match self.max_bytes {
            Some(max) => backend.with_quota(max),
            None => backend,
        }
    }
}
