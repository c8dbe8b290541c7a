//! Remote store collaborator.
//!
//! The authoritative store is reached through [`RemoteStore`]. Documents are
//! untyped JSON, addressed by collection and id and scoped by owner.

use crate::{Result, SyncError};
use household_model::{merge_patch, Collection};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Equality filter applied to listed documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub equals: Vec<(String, Value)>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require top-level `field` to equal `value`
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.equals
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// The authoritative remote store.
///
/// `create` is an upsert keyed by the client-chosen id, and deleting a
/// missing document succeeds, so replaying an operation twice is harmless.
#[trait_variant::make(Send)]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, owner_id: &str, collection: Collection, id: &str) -> Result<Option<Value>>;

    async fn list(
        &self,
        owner_id: &str,
        collection: Collection,
        filter: &ListFilter,
    ) -> Result<Vec<Value>>;

    /// Create or replace the document; returns its id
    async fn create(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<String>;

    /// Apply a merge patch to an existing document
    async fn update(&self, owner_id: &str, collection: Collection, id: &str, patch: Value)
        -> Result<()>;

    async fn delete(&self, owner_id: &str, collection: Collection, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredDocument {
    owner_id: String,
    value: Value,
}

/// In-process remote store for tests and local development
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    docs: Mutex<BTreeMap<(Collection, String), StoredDocument>>,
    offline: AtomicBool,
    injected: Mutex<VecDeque<SyncError>>,
    calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as unreachable until switched back
    pub fn set_reachable(&self, reachable: bool) {
        self.offline.store(!reachable, Ordering::SeqCst);
    }

    /// Fail the next call with `error`
    pub fn fail_next(&self, error: SyncError) {
        self.injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of calls received, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Seed a document without counting a call
    pub fn insert(&self, owner_id: &str, collection: Collection, id: &str, value: Value) {
        self.lock_docs().insert(
            (collection, id.to_string()),
            StoredDocument {
                owner_id: owner_id.to_string(),
                value,
            },
        );
    }

    /// Read a document regardless of owner, without counting a call
    pub fn document(&self, collection: Collection, id: &str) -> Option<Value> {
        self.lock_docs()
            .get(&(collection, id.to_string()))
            .map(|doc| doc.value.clone())
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.lock_docs()
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    fn lock_docs(&self) -> std::sync::MutexGuard<'_, BTreeMap<(Collection, String), StoredDocument>> {
        self.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self
            .injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(error);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("remote store unreachable".into()));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, owner_id: &str, collection: Collection, id: &str) -> Result<Option<Value>> {
        self.begin_call()?;
        Ok(self
            .lock_docs()
            .get(&(collection, id.to_string()))
            .filter(|doc| doc.owner_id == owner_id)
            .map(|doc| doc.value.clone()))
    }

    async fn list(
        &self,
        owner_id: &str,
        collection: Collection,
        filter: &ListFilter,
    ) -> Result<Vec<Value>> {
        self.begin_call()?;
        Ok(self
            .lock_docs()
            .iter()
            .filter(|((c, _), doc)| *c == collection && doc.owner_id == owner_id)
            .map(|(_, doc)| doc.value.clone())
            .filter(|value| filter.matches(value))
            .collect())
    }

    async fn create(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<String> {
        self.begin_call()?;
        self.insert(owner_id, collection, id, record);
        Ok(id.to_string())
    }

    async fn update(
        &self,
        owner_id: &str,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<()> {
        self.begin_call()?;
        let mut docs = self.lock_docs();
        match docs.get_mut(&(collection, id.to_string())) {
            Some(doc) if doc.owner_id == owner_id => {
                merge_patch(&mut doc.value, &patch);
                Ok(())
            }
            _ => Err(SyncError::NotFound {
                collection,
                id: id.to_string(),
            }),
        }
    }

    async fn delete(&self, owner_id: &str, collection: Collection, id: &str) -> Result<()> {
        self.begin_call()?;
        let mut docs = self.lock_docs();
        let key = (collection, id.to_string());
        if docs.get(&key).is_some_and(|doc| doc.owner_id == owner_id) {
            docs.remove(&key);
        }
        Ok(())
    }
}
