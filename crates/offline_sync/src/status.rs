//! Connection status and the summary shown to the user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionStatus {
    /// Remote store reachable
    Online,
    /// Disconnected, changes are journaled locally
    #[default]
    Offline,
    /// Connectivity signalled, not yet confirmed
    Reconnecting,
    /// Replaying the journal
    Syncing,
}

/// Snapshot of the sync state for display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusInfo {
    pub status: ConnectionStatus,
    pub pending_changes: usize,
    pub last_sync: Option<DateTime<Utc>>,
    /// Seconds since the last full sync
    pub time_since_sync: Option<u64>,
    /// Local persistence failed and changes are held in memory
    pub storage_degraded: bool,
    pub status_message: String,
}

impl SyncStatusInfo {
    pub fn new(
        status: ConnectionStatus,
        pending_changes: usize,
        last_sync: Option<DateTime<Utc>>,
        storage_degraded: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let status_message = match status {
            _ if storage_degraded => "Local storage full - changes kept in memory".to_string(),
            ConnectionStatus::Online if pending_changes > 0 => {
                format!("{} changes waiting to sync", pending_changes)
            }
            ConnectionStatus::Online => "Connected".to_string(),
            ConnectionStatus::Offline if pending_changes > 0 => {
                format!("Offline - {} pending changes", pending_changes)
            }
            ConnectionStatus::Offline => "Offline".to_string(),
            ConnectionStatus::Reconnecting => "Reconnecting...".to_string(),
            ConnectionStatus::Syncing => "Syncing changes...".to_string(),
        };

        Self {
            status,
            pending_changes,
            last_sync,
            time_since_sync: last_sync.map(|at| (now - at).num_seconds().max(0) as u64),
            storage_degraded,
            status_message,
        }
    }

    /// Whether the indicator should be visible
    pub fn should_show(&self) -> bool {
        self.status != ConnectionStatus::Online || self.pending_changes > 0 || self.storage_degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_default_status_is_offline() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Offline);
    }

    #[test]
    fn test_online_and_synced_is_hidden() {
        let now = Utc::now();
        let info = SyncStatusInfo::new(ConnectionStatus::Online, 0, Some(now), false, now);
        assert_eq!(info.status_message, "Connected");
        assert!(!info.should_show());
    }

    #[test]
    fn test_offline_with_pending() {
        let now = Utc::now();
        let info = SyncStatusInfo::new(
            ConnectionStatus::Offline,
            3,
            Some(now - Duration::seconds(90)),
            false,
            now,
        );
        assert_eq!(info.status_message, "Offline - 3 pending changes");
        assert_eq!(info.time_since_sync, Some(90));
        assert!(info.should_show());
    }

    #[test]
    fn test_degraded_storage_takes_precedence() {
        let now = Utc::now();
        let info = SyncStatusInfo::new(ConnectionStatus::Online, 0, None, true, now);
        assert!(info.status_message.starts_with("Local storage full"));
        assert!(info.should_show());
    }
}
