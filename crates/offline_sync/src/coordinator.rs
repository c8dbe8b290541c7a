//! Sync coordinator.
//!
//! Foreground writes go straight to the remote store while it is reachable.
//! When it is not, or a call fails transiently, the change is applied to the
//! cached entity and journaled. Replay later walks the journal in enqueue
//! order, resolves each operation against the current remote value and
//! writes the outcome back to both sides.
//!
//! A document with a live journal entry is never written through directly;
//! the new change is journaled behind the existing one so the remote sees
//! them in order.

use crate::conflict::{resolve_documents, ResolutionStrategy};
use crate::remote::{ListFilter, RemoteStore};
use crate::status::{ConnectionStatus, SyncStatusInfo};
use crate::{Result, SyncConfig, SyncError};
use chrono::Utc;
use household_model::{apply_patches, diff_patch, is_empty_patch, Collection, Entity};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use store::{CacheStore, CacheUpdate, EnqueueOutcome, OpType, PendingOperation};
use tokio::sync::{watch, Mutex, Notify};

/// How a foreground write was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Applied to the remote store
    Synced,
    /// Applied locally and journaled for replay
    Queued,
}

/// Conflict resolution applied while replaying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConflict {
    pub collection: Collection,
    pub document_id: String,
    pub strategy: ResolutionStrategy,
}

/// Outcome of one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Applied remotely and removed from the journal
    pub applied: usize,
    /// Failed transiently, kept with a later retry time
    pub requeued: usize,
    /// Rejected by the remote and removed
    pub dropped: usize,
    /// Not yet due, superseded mid-run, or left for lack of connectivity
    pub skipped: usize,
    pub resolutions: Vec<ResolvedConflict>,
}

impl ReplayReport {
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.requeued == 0 && self.dropped == 0 && self.skipped == 0
    }
}

/// Orchestrates remote writes, the local journal and replay
pub struct SyncCoordinator<R> {
    store: Arc<CacheStore>,
    remote: R,
    config: SyncConfig,
    status: watch::Sender<ConnectionStatus>,
    /// Serializes replay runs
    replay_lock: Mutex<()>,
    replay_requested: Arc<Notify>,
}

impl<R: RemoteStore> SyncCoordinator<R> {
    pub fn new(store: Arc<CacheStore>, remote: R, config: SyncConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Offline);
        Self {
            store,
            remote,
            config,
            status,
            replay_lock: Mutex::new(()),
            replay_requested: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ========== Connectivity ==========

    /// Record a connectivity change reported by the platform.
    ///
    /// Coming online with pending changes enters `Reconnecting` until the
    /// next replay completes, and wakes the replay worker.
    pub fn set_online(&self, online: bool) {
        let next = match (online, self.store.pending_count()) {
            (false, _) => ConnectionStatus::Offline,
            (true, 0) => ConnectionStatus::Online,
            (true, _) => ConnectionStatus::Reconnecting,
        };
        let previous = self.status.send_replace(next);

        if online && previous == ConnectionStatus::Offline {
            tracing::info!(
                "Connectivity restored with {} pending changes",
                self.store.pending_count()
            );
            self.request_replay();
        } else if !online && previous != ConnectionStatus::Offline {
            tracing::info!("Connectivity lost, journaling changes locally");
        }
    }

    pub fn is_online(&self) -> bool {
        self.status() != ConnectionStatus::Offline
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn status_info(&self) -> SyncStatusInfo {
        SyncStatusInfo::new(
            self.status(),
            self.store.pending_count(),
            self.store.last_sync(),
            self.store.is_degraded(),
            Utc::now(),
        )
    }

    /// Ask the replay worker to run as soon as possible
    pub fn request_replay(&self) {
        self.replay_requested.notify_one();
    }

    /// Handle the replay worker waits on
    pub fn replay_trigger(&self) -> Arc<Notify> {
        self.replay_requested.clone()
    }

    // ========== Writes ==========

    pub async fn create<T: Entity>(&self, owner_id: &str, entity: &T) -> Result<WriteOutcome> {
        let record = serde_json::to_value(entity)?;
        self.create_document(owner_id, T::COLLECTION, entity.id(), record)
            .await
    }

    /// Apply a merge patch to a document of type `T`.
    ///
    /// `updatedAt` is stamped with the current time unless the patch sets it.
    pub async fn update<T: Entity>(&self, owner_id: &str, id: &str, patch: Value) -> Result<WriteOutcome> {
        self.update_document(owner_id, T::COLLECTION, id, patch).await
    }

    pub async fn delete<T: Entity>(&self, owner_id: &str, id: &str) -> Result<WriteOutcome> {
        self.delete_document(owner_id, T::COLLECTION, id).await
    }

    pub async fn create_document(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<WriteOutcome> {
        if self.should_write_through(collection, id) {
            let call = self.remote.create(owner_id, collection, id, record.clone());
            match self.call(call).await {
                Ok(_) => {
                    self.cache(collection, id, CacheUpdate::Put(record));
                    return Ok(WriteOutcome::Synced);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Remote create of {}/{} failed, queueing: {}", collection, id, e);
                }
                Err(e) => return Err(e),
            }
        }

        let op = PendingOperation::create(collection, id, owner_id, record.clone());
        self.journal(op, CacheUpdate::Put(record))
    }

    pub async fn update_document(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
        mut patch: Value,
    ) -> Result<WriteOutcome> {
        let Some(fields) = patch.as_object_mut() else {
            return Err(SyncError::Validation("update patch must be a JSON object".into()));
        };
        if !fields.contains_key("updatedAt") {
            fields.insert("updatedAt".into(), serde_json::to_value(Utc::now())?);
        }

        if self.should_write_through(collection, id) {
            let call = self.remote.update(owner_id, collection, id, patch.clone());
            match self.call(call).await {
                Ok(()) => {
                    self.cache(collection, id, CacheUpdate::Patch(patch));
                    return Ok(WriteOutcome::Synced);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Remote update of {}/{} failed, queueing: {}", collection, id, e);
                }
                Err(e) => return Err(e),
            }
        }

        let op = PendingOperation::update(collection, id, owner_id, patch.clone());
        self.journal(op, CacheUpdate::Patch(patch))
    }

    pub async fn delete_document(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<WriteOutcome> {
        if self.should_write_through(collection, id) {
            match self.call(self.remote.delete(owner_id, collection, id)).await {
                Ok(()) | Err(SyncError::NotFound { .. }) => {
                    self.cache(collection, id, CacheUpdate::Remove);
                    return Ok(WriteOutcome::Synced);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Remote delete of {}/{} failed, queueing: {}", collection, id, e);
                }
                Err(e) => return Err(e),
            }
        }

        let op = PendingOperation::delete(collection, id, owner_id);
        self.journal(op, CacheUpdate::Remove)
    }

    // ========== Reads ==========

    /// Read through to the remote, falling back to the cache
    pub async fn get<T: Entity>(&self, owner_id: &str, id: &str) -> Result<Option<T>> {
        let doc = self.get_document(owner_id, T::COLLECTION, id).await?;
        Ok(doc.map(serde_json::from_value).transpose()?)
    }

    pub async fn list<T: Entity>(&self, owner_id: &str, filter: &ListFilter) -> Result<Vec<T>> {
        self.list_documents(owner_id, T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(SyncError::from))
            .collect()
    }

    pub async fn get_document(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>> {
        if self.should_write_through(collection, id) {
            match self.call(self.remote.get(owner_id, collection, id)).await {
                Ok(Some(doc)) => {
                    self.cache(collection, id, CacheUpdate::Put(doc.clone()));
                    return Ok(Some(doc));
                }
                Ok(None) => {
                    self.cache(collection, id, CacheUpdate::Remove);
                    return Ok(None);
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!("Serving cached {}/{}: {}", collection, id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.store.get_value(collection, id))
    }

    /// List documents, overlaying changes that have not reached the remote yet
    pub async fn list_documents(
        &self,
        owner_id: &str,
        collection: Collection,
        filter: &ListFilter,
    ) -> Result<Vec<Value>> {
        let pending: Vec<PendingOperation> = self
            .store
            .list_pending()
            .into_iter()
            .filter(|op| op.collection == collection)
            .collect();

        if self.is_online() {
            match self.call(self.remote.list(owner_id, collection, filter)).await {
                Ok(remote_docs) => {
                    let pending_ids: BTreeSet<&str> =
                        pending.iter().map(|op| op.document_id.as_str()).collect();
                    let mut docs: BTreeMap<String, Value> = remote_docs
                        .into_iter()
                        .filter_map(|doc| Some((document_id(&doc)?.to_string(), doc)))
                        .filter(|(id, _)| !pending_ids.contains(id.as_str()))
                        .collect();

                    if let Err(e) = self.store.put_many(
                        collection,
                        docs.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect(),
                    ) {
                        tracing::warn!("Listed {} not cached: {}", collection, e);
                    }

                    for op in &pending {
                        if op.op_type == OpType::Delete {
                            continue;
                        }
                        if let Some(doc) = self.store.get_value(collection, &op.document_id) {
                            if filter.matches(&doc) && owned_by(&doc, owner_id) {
                                docs.insert(op.document_id.clone(), doc);
                            }
                        }
                    }
                    return Ok(docs.into_values().collect());
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!("Serving cached {} list: {}", collection, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self
            .store
            .get_all_values(collection)
            .into_values()
            .filter(|doc| filter.matches(doc) && owned_by(doc, owner_id))
            .collect())
    }

    // ========== Replay ==========

    /// Replay the journal against the remote store.
    ///
    /// Runs are serialized. Transient failures stay queued with a later retry
    /// time; an authorization failure halts the run and is returned.
    pub async fn replay_pending(&self) -> Result<ReplayReport> {
        let _guard = self.replay_lock.lock().await;
        let mut report = ReplayReport::default();

        if !self.is_online() {
            report.skipped = self.store.pending_count();
            return Ok(report);
        }

        self.status.send_if_modified(|status| match *status {
            ConnectionStatus::Online | ConnectionStatus::Reconnecting => {
                *status = ConnectionStatus::Syncing;
                true
            }
            _ => false,
        });

        let result = self.replay_all(&mut report).await;

        self.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Syncing {
                *status = ConnectionStatus::Online;
                true
            } else {
                false
            }
        });

        result.map(|()| report)
    }

    async fn replay_all(&self, report: &mut ReplayReport) -> Result<()> {
        let now = Utc::now();

        for queued in self.store.list_pending() {
            // Re-read: a foreground write may have superseded the listed entry
            let Some(op) = self.store.pending_for(queued.collection, &queued.document_id) else {
                continue;
            };
            if !self.is_online() || !op.is_due(now) {
                report.skipped += 1;
                continue;
            }

            match self.replay_one(&op, report).await {
                Ok(update) => match self.store.complete(op.id, update) {
                    Ok(true) => {
                        tracing::debug!("Replayed {} {}", op.op_type, op.key());
                        report.applied += 1;
                    }
                    Ok(false) => {
                        tracing::debug!("{} superseded during replay", op.key());
                        report.skipped += 1;
                    }
                    Err(e) if self.store.is_degraded() => {
                        tracing::warn!("Replayed {} held in memory only: {}", op.key(), e);
                        report.applied += 1;
                    }
                    Err(e) => return Err(e.into()),
                },
                Err(e) if e.is_transient() => {
                    let delay = self.config.replay_backoff.delay_for_attempt(op.attempts + 1);
                    let next_attempt = now
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                    tracing::warn!(
                        "Replay of {} {} failed, retrying in {:?}: {}",
                        op.op_type,
                        op.key(),
                        delay,
                        e
                    );
                    self.store
                        .record_failure(op.id, &e.to_string(), Some(next_attempt))?;
                    report.requeued += 1;
                }
                Err(e @ SyncError::Unauthorized(_)) => {
                    tracing::error!("Replay halted, remote rejected credentials: {}", e);
                    self.store.record_failure(op.id, &e.to_string(), None)?;
                    report.requeued += 1;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Dropping {} {} rejected by remote: {}", op.op_type, op.key(), e);
                    let update = self.authoritative_value(&op).await;
                    self.store.complete(op.id, update)?;
                    report.dropped += 1;
                }
            }
        }

        if report.requeued == 0 && self.store.pending_count() == 0 {
            if let Err(e) = self.store.set_last_sync(Utc::now()) {
                tracing::warn!("Sync watermark not persisted: {}", e);
            }
        }
        if !report.is_empty() {
            tracing::info!(
                "Replay finished: {} applied, {} requeued, {} dropped, {} skipped",
                report.applied,
                report.requeued,
                report.dropped,
                report.skipped
            );
        }
        Ok(())
    }

    /// Apply one operation remotely, returning the cache change to commit
    async fn replay_one(&self, op: &PendingOperation, report: &mut ReplayReport) -> Result<CacheUpdate> {
        let (owner_id, collection, id) = (op.owner_id.as_str(), op.collection, op.document_id.as_str());

        match op.op_type {
            OpType::Create if op.replaces => {
                let call = self.remote.create(owner_id, collection, id, op.payload.clone());
                self.call(call).await?;
                Ok(CacheUpdate::Put(op.payload.clone()))
            }
            OpType::Create => match self.call(self.remote.get(owner_id, collection, id)).await? {
                None => {
                    let call = self.remote.create(owner_id, collection, id, op.payload.clone());
                    self.call(call).await?;
                    Ok(CacheUpdate::Put(op.payload.clone()))
                }
                // Already there: an earlier replay got through before the dequeue
                Some(remote) => self.reconcile(op, op.payload.clone(), remote, report).await,
            },
            OpType::Update => {
                let Some(remote) = self.call(self.remote.get(owner_id, collection, id)).await? else {
                    tracing::warn!("{} was deleted remotely, discarding pending update", op.key());
                    return Ok(CacheUpdate::Remove);
                };
                let mut local = remote.clone();
                apply_patches(&mut local, &op.payload);
                self.reconcile(op, local, remote, report).await
            }
            OpType::Delete => match self.call(self.remote.delete(owner_id, collection, id)).await {
                Ok(()) | Err(SyncError::NotFound { .. }) => Ok(CacheUpdate::Remove),
                Err(e) => Err(e),
            },
        }
    }

    async fn reconcile(
        &self,
        op: &PendingOperation,
        local: Value,
        remote: Value,
        report: &mut ReplayReport,
    ) -> Result<CacheUpdate> {
        let resolution = resolve_documents(op.collection, local, remote.clone(), self.store.last_sync())?;

        let patch = diff_patch(&remote, &resolution.resolved);
        if !is_empty_patch(&patch) {
            let call = self
                .remote
                .update(&op.owner_id, op.collection, &op.document_id, patch);
            self.call(call).await?;
        }

        tracing::debug!("Resolved {} using {} strategy", op.key(), resolution.strategy);
        report.resolutions.push(ResolvedConflict {
            collection: op.collection,
            document_id: op.document_id.clone(),
            strategy: resolution.strategy,
        });
        Ok(CacheUpdate::Put(resolution.resolved))
    }

    /// What the cache should hold once the remote has refused `op`
    async fn authoritative_value(&self, op: &PendingOperation) -> CacheUpdate {
        let fetch = self.remote.get(&op.owner_id, op.collection, &op.document_id);
        match self.call(fetch).await {
            Ok(Some(doc)) => CacheUpdate::Put(doc),
            Ok(None) => CacheUpdate::Remove,
            Err(e) => {
                tracing::debug!("Evicting {} after refused change: {}", op.key(), e);
                CacheUpdate::Remove
            }
        }
    }

    // ========== Helpers ==========

    fn should_write_through(&self, collection: Collection, id: &str) -> bool {
        self.is_online() && self.store.pending_for(collection, id).is_none()
    }

    /// Journal `op` with its optimistic cache change
    fn journal(&self, op: PendingOperation, update: CacheUpdate) -> Result<WriteOutcome> {
        let key = op.key();
        match self.store.stage(op, update) {
            Ok(EnqueueOutcome::Discarded) => {
                tracing::warn!("Rejected change to {}: deletion already pending", key);
                Err(SyncError::NotFound {
                    collection: key.collection,
                    id: key.document_id,
                })
            }
            Ok(outcome) => {
                tracing::debug!("Queued change to {} ({:?})", key, outcome);
                self.request_replay();
                Ok(WriteOutcome::Queued)
            }
            Err(e) if self.store.is_degraded() => {
                tracing::warn!("Change to {} held in memory only: {}", key, e);
                self.request_replay();
                Ok(WriteOutcome::Queued)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort cache refresh after a successful remote call
    fn cache(&self, collection: Collection, id: &str, update: CacheUpdate) {
        let result = match update {
            CacheUpdate::Put(doc) => self.store.put_value(collection, id, doc),
            CacheUpdate::Patch(patch) => self.store.patch_value(collection, id, &patch),
            CacheUpdate::Remove => self.store.remove(collection, id),
            CacheUpdate::Keep => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("Cached copy of {}/{} not persisted: {}", collection, id, e);
        }
    }

    async fn call<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.call_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(limit)),
        }
    }
}

fn document_id(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// Documents without an owner field belong to their parent's owner
fn owned_by(doc: &Value, owner_id: &str) -> bool {
    doc.get("ownerId")
        .and_then(Value::as_str)
        .map_or(true, |owner| owner == owner_id)
}
