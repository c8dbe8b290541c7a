//! Core settings
//!
//! Persists the configuration of every offline component as one
//! `settings.json` in the application data directory.

use crate::Result;
use cache_control::CacheConfig;
use offline_sync::SyncConfig;
use retry_queue::RetryQueueConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use store::StoreConfig;

/// Configuration for the offline-resilience core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Local cache and journal persistence
    pub store: StoreConfig,
    /// Journal replay and remote call limits
    pub sync: SyncConfig,
    /// Retry queue for calendar calls
    pub retry_queue: RetryQueueConfig,
    /// Shell network cache
    pub cache: CacheConfig,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
            retry_queue: RetryQueueConfig::default(),
            cache: CacheConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl CoreSettings {
    /// Store file location, with relative paths taken from `data_dir`
    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            data_dir.join(&self.store.path)
        }
    }
}

/// Loads, saves and updates [`CoreSettings`]
pub struct SettingsManager {
    settings_path: PathBuf,
    current: CoreSettings,
}

impl SettingsManager {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join("settings.json"),
            current: CoreSettings::default(),
        }
    }

    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk, or defaults if the file is missing or malformed
    pub fn load_sync(&mut self) -> Result<&CoreSettings> {
        self.current = if self.settings_path.exists() {
            let content = std::fs::read_to_string(&self.settings_path)?;
            match serde_json::from_str::<CoreSettings>(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("Failed to parse settings file, using defaults: {}", e);
                    CoreSettings::default()
                }
            }
        } else {
            CoreSettings::default()
        };
        Ok(&self.current)
    }

    pub fn save_sync(&self) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.current)?;
        std::fs::write(&self.settings_path, content)?;
        Ok(())
    }

    pub fn get(&self) -> &CoreSettings {
        &self.current
    }

    pub fn update_sync(&mut self, settings: CoreSettings) -> Result<()> {
        self.current = settings;
        self.save_sync()
    }

    pub fn reset_sync(&mut self) -> Result<&CoreSettings> {
        self.current = CoreSettings::default();
        self.save_sync()?;
        Ok(&self.current)
    }
}
