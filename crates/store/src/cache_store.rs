//! The local cache store
//!
//! `CacheStore` owns the entity cache and the pending-operation journal. All
//! access goes through one mutex, so read-modify-write sequences from the
//! foreground and from replay never interleave. Every mutation rewrites the
//! serialized blob through the backend before the lock is released.

use crate::{
    EnqueueOutcome, Journal, JournalKey, MemoryBackend, PendingOperation, Result,
    StorageBackend, StoreError,
};
use chrono::{DateTime, Utc};
use household_model::{merge_patch, Collection, Entity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type EntityMap = BTreeMap<Collection, BTreeMap<String, Value>>;

/// Serialized layout of the store blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub entities: EntityMap,
    #[serde(default)]
    pub pending_operations: Vec<PendingOperation>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Change to apply to a cached entity alongside a journal update
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
    Put(Value),
    /// Merge patch onto the cached value as it is when the write commits
    Patch(Value),
    Remove,
    Keep,
}

#[derive(Default)]
struct Inner {
    entities: EntityMap,
    journal: Journal,
    last_sync: Option<DateTime<Utc>>,
    degraded: bool,
}

impl Inner {
    fn from_persisted(state: PersistedState) -> Self {
        Self {
            entities: state.entities,
            journal: Journal::from_operations(state.pending_operations),
            last_sync: state.last_sync,
            degraded: false,
        }
    }

    fn to_persisted(&self) -> PersistedState {
        PersistedState {
            entities: self.entities.clone(),
            pending_operations: self.journal.list(),
            last_sync: self.last_sync,
        }
    }

    fn apply(&mut self, collection: Collection, id: &str, update: CacheUpdate) {
        match update {
            CacheUpdate::Put(value) => {
                self.entities
                    .entry(collection)
                    .or_default()
                    .insert(id.to_string(), value);
            }
            CacheUpdate::Patch(patch) => {
                if let Some(doc) = self
                    .entities
                    .get_mut(&collection)
                    .and_then(|docs| docs.get_mut(id))
                {
                    merge_patch(doc, &patch);
                }
            }
            CacheUpdate::Remove => {
                if let Some(docs) = self.entities.get_mut(&collection) {
                    docs.remove(id);
                }
            }
            CacheUpdate::Keep => {}
        }
    }

    /// Drop cached entities that no pending operation depends on
    fn evict_unpinned(&mut self) -> usize {
        let mut evicted = 0;
        for (collection, docs) in self.entities.iter_mut() {
            let before = docs.len();
            docs.retain(|id, _| {
                self.journal
                    .contains_key(&JournalKey::new(*collection, id.clone()))
            });
            evicted += before - docs.len();
        }
        self.entities.retain(|_, docs| !docs.is_empty());
        evicted
    }
}

/// Local key/value cache of entities plus the pending-operation journal
pub struct CacheStore {
    backend: Box<dyn StorageBackend>,
    inner: Mutex<Inner>,
}

impl CacheStore {
    /// Open the store, starting empty if the persisted state is unreadable
    pub fn open(backend: impl StorageBackend + 'static) -> Self {
        let inner = match Self::load_state(&backend) {
            Ok(state) => Inner::from_persisted(state),
            Err(e) => {
                tracing::warn!("Local store unreadable, starting empty: {}", e);
                Inner::default()
            }
        };
        Self {
            backend: Box::new(backend),
            inner: Mutex::new(inner),
        }
    }

    /// Open the store, failing on unreadable persisted state
    pub fn try_open(backend: impl StorageBackend + 'static) -> Result<Self> {
        let state = Self::load_state(&backend)?;
        Ok(Self {
            backend: Box::new(backend),
            inner: Mutex::new(Inner::from_persisted(state)),
        })
    }

    /// An empty store that persists only in memory
    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::new())
    }

    fn load_state(backend: &dyn StorageBackend) -> Result<PersistedState> {
        match backend.load()? {
            None => Ok(PersistedState::default()),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupted(e.to_string())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` and persist the result while holding the lock
    fn mutate<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Result<R> {
        let mut inner = self.lock();
        let result = f(&mut inner);
        self.persist(&mut inner)?;
        Ok(result)
    }

    fn persist(&self, inner: &mut Inner) -> Result<()> {
        let bytes = serde_json::to_vec(&inner.to_persisted())?;
        match self.backend.save(&bytes) {
            Ok(()) => {
                inner.degraded = false;
                Ok(())
            }
            Err(StoreError::StorageQuotaExceeded) => {
                let evicted = inner.evict_unpinned();
                tracing::warn!(
                    "Storage quota exceeded, evicted {} cached entities and retrying",
                    evicted
                );
                let bytes = serde_json::to_vec(&inner.to_persisted())?;
                self.backend.save(&bytes).map_err(|e| {
                    inner.degraded = true;
                    tracing::error!("Local store degraded, changes held in memory: {}", e);
                    e
                })?;
                inner.degraded = false;
                Ok(())
            }
            Err(e) => {
                inner.degraded = true;
                tracing::error!("Failed to persist local store: {}", e);
                Err(e)
            }
        }
    }

    // ========== Entity Cache ==========

    /// Get a cached entity by id
    pub fn get<T: Entity>(&self, id: &str) -> Option<T> {
        let value = self.get_value(T::COLLECTION, id)?;
        match serde_json::from_value(value) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!("Cached {}/{} does not decode: {}", T::COLLECTION, id, e);
                None
            }
        }
    }

    /// Get the raw cached document
    pub fn get_value(&self, collection: Collection, id: &str) -> Option<Value> {
        self.lock()
            .entities
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// All cached entities of one type, keyed by id
    pub fn get_all<T: Entity>(&self) -> BTreeMap<String, T> {
        self.get_all_values(T::COLLECTION)
            .into_iter()
            .filter_map(|(id, value)| serde_json::from_value(value).ok().map(|e| (id, e)))
            .collect()
    }

    pub fn get_all_values(&self, collection: Collection) -> BTreeMap<String, Value> {
        self.lock()
            .entities
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn put<T: Entity>(&self, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)?;
        self.put_value(T::COLLECTION, entity.id(), value)
    }

    pub fn put_value(&self, collection: Collection, id: &str, value: Value) -> Result<()> {
        self.mutate(|inner| inner.apply(collection, id, CacheUpdate::Put(value)))
    }

    /// Replace cached documents in one write
    pub fn put_many(&self, collection: Collection, docs: Vec<(String, Value)>) -> Result<()> {
        self.mutate(|inner| {
            for (id, value) in docs {
                inner.apply(collection, &id, CacheUpdate::Put(value));
            }
        })
    }

    /// Merge `patch` into the cached document, if there is one
    pub fn patch_value(&self, collection: Collection, id: &str, patch: &Value) -> Result<()> {
        self.mutate(|inner| inner.apply(collection, id, CacheUpdate::Patch(patch.clone())))
    }

    pub fn remove(&self, collection: Collection, id: &str) -> Result<()> {
        self.mutate(|inner| inner.apply(collection, id, CacheUpdate::Remove))
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.values().map(BTreeMap::len).sum()
    }

    // ========== Journal ==========

    pub fn enqueue(&self, op: PendingOperation) -> Result<EnqueueOutcome> {
        self.stage(op, CacheUpdate::Keep)
    }

    /// Journal `op` and update the cached entity in one atomic write
    pub fn stage(&self, op: PendingOperation, update: CacheUpdate) -> Result<EnqueueOutcome> {
        self.mutate(|inner| {
            let (collection, id) = (op.collection, op.document_id.clone());
            let outcome = inner.journal.enqueue(op);
            if outcome != EnqueueOutcome::Discarded {
                inner.apply(collection, &id, update);
            }
            outcome
        })
    }

    /// Remove the operation if it is still live. Returns whether it was removed.
    pub fn dequeue(&self, op_id: Uuid) -> Result<bool> {
        self.complete(op_id, CacheUpdate::Keep)
    }

    /// Dequeue a replayed operation and record its resolved value in one write.
    ///
    /// If the operation has been superseded meanwhile, nothing changes and
    /// `false` is returned: the newer entry still owns the cached value.
    pub fn complete(&self, op_id: Uuid, update: CacheUpdate) -> Result<bool> {
        let mut inner = self.lock();
        let Some(op) = inner.journal.dequeue(op_id) else {
            return Ok(false);
        };
        inner.apply(op.collection, &op.document_id, update);
        self.persist(&mut inner)?;
        Ok(true)
    }

    /// Record a failed replay attempt on a live operation
    pub fn record_failure(
        &self,
        op_id: Uuid,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.mutate(|inner| {
            if let Some(op) = inner.journal.get_by_id_mut(op_id) {
                op.attempts += 1;
                op.last_error = Some(error.to_string());
                op.next_attempt_at = next_attempt_at;
            }
        })
    }

    /// Live operations in enqueue order
    pub fn list_pending(&self) -> Vec<PendingOperation> {
        self.lock().journal.list()
    }

    pub fn pending_for(&self, collection: Collection, id: &str) -> Option<PendingOperation> {
        self.lock()
            .journal
            .get(&JournalKey::new(collection, id))
            .cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().journal.len()
    }

    // ========== Sync Watermark ==========

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.lock().last_sync
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|inner| inner.last_sync = Some(at))
    }

    // ========== Maintenance ==========

    /// Drop every cached entity, pending operation and the watermark
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        *inner = Inner::default();
        self.backend.clear()
    }

    /// Whether the last write failed and changes are held only in memory
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    pub fn snapshot(&self) -> PersistedState {
        self.lock().to_persisted()
    }
}
