//! Offline Sync - journal replay and conflict resolution
//!
//! This crate keeps household data usable while the remote store is out of
//! reach. Writes fall back to the local cache and journal, and a background
//! worker replays the journal when connectivity returns, reconciling each
//! change with the remote version through the conflict resolution engine.
//!
//! # Example
//!
//! ```ignore
//! use offline_sync::{ReplayWorker, SyncConfig, SyncCoordinator};
//!
//! let coordinator = Arc::new(SyncCoordinator::new(store, remote, SyncConfig::default()));
//! let worker = ReplayWorker::spawn(coordinator.clone());
//!
//! coordinator.update::<Plant>("u1", "p1", json!({ "name": "Fig" })).await?;
//! coordinator.set_online(true);
//! ```

pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod remote;
pub mod similarity;
pub mod status;
pub mod worker;

pub use config::SyncConfig;
pub use conflict::{
    merge_descriptions, merge_photos, resolve_by_progress, resolve_by_timestamp,
    resolve_care_task, resolve_documents, resolve_plant, resolve_project, resolve_records,
    resolve_simple_task, resolve_subtask, ConflictData, ConflictResolution, ResolutionStrategy,
};
pub use coordinator::{ReplayReport, ResolvedConflict, SyncCoordinator, WriteOutcome};
pub use error::{Result, SyncError};
pub use remote::{ListFilter, MemoryRemoteStore, RemoteStore};
pub use status::{ConnectionStatus, SyncStatusInfo};
pub use worker::ReplayWorker;
