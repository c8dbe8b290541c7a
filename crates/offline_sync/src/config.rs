//! Sync configuration

use retry_queue::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Periodic replay interval while online
    pub replay_interval_secs: u64,
    /// Ceiling on a single remote call
    pub call_timeout_ms: u64,
    /// Spacing of replay attempts for an operation that keeps failing
    pub replay_backoff: BackoffPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            replay_interval_secs: 30,
            call_timeout_ms: 10_000,
            replay_backoff: BackoffPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_replay_interval(mut self, interval: Duration) -> Self {
        self.replay_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_replay_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.replay_backoff = backoff;
        self
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_secs.max(1))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
