//! Pending-operation journal
//!
//! Mutations that could not reach the remote store are journaled here until
//! a replay applies them. At most one live operation exists per
//! `(collection, document id)`; a newer enqueue for the same key coalesces
//! with or replaces the older one according to [`coalesce`].

use chrono::{DateTime, Utc};
use household_model::{chain_patches, merge_patch, Collection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Kind of journaled mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Identity of the document a pending operation targets
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JournalKey {
    pub collection: Collection,
    pub document_id: String,
}

impl JournalKey {
    pub fn new(collection: Collection, document_id: impl Into<String>) -> Self {
        Self {
            collection,
            document_id: document_id.into(),
        }
    }
}

impl fmt::Display for JournalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.document_id)
    }
}

/// A mutation waiting to be applied to the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: Uuid,
    pub op_type: OpType,
    pub collection: Collection,
    pub document_id: String,
    /// Full record for creates, null for deletes. For updates a merge patch,
    /// or an ordered array of them when successive patches do not compose.
    pub payload: Value,
    pub owner_id: String,
    pub enqueued_at: DateTime<Utc>,
    /// Position in replay order
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Create that follows a delete of the same document: the record
    /// overwrites whatever the remote holds instead of merging with it
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replaces: bool,
}

impl PendingOperation {
    fn new(
        op_type: OpType,
        collection: Collection,
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            op_type,
            collection,
            document_id: document_id.into(),
            payload,
            owner_id: owner_id.into(),
            enqueued_at: Utc::now(),
            seq: 0,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            replaces: false,
        }
    }

    pub fn create(
        collection: Collection,
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
        record: Value,
    ) -> Self {
        Self::new(OpType::Create, collection, document_id, owner_id, record)
    }

    pub fn update(
        collection: Collection,
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
        patch: Value,
    ) -> Self {
        Self::new(OpType::Update, collection, document_id, owner_id, patch)
    }

    pub fn delete(
        collection: Collection,
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self::new(OpType::Delete, collection, document_id, owner_id, Value::Null)
    }

    pub fn key(&self) -> JournalKey {
        JournalKey::new(self.collection, self.document_id.clone())
    }

    /// Whether replay may attempt this operation at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

/// What happened to an operation handed to the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No live operation existed for the key
    Queued,
    /// Folded into or replaced the live operation for the key
    Superseded { previous: OpType },
    /// Dropped because the live operation already deletes the document
    Discarded,
}

/// Fold `incoming` into the `existing` live operation for the same key.
///
/// Returns `None` when the incoming operation is discarded.
pub fn coalesce(existing: &PendingOperation, incoming: PendingOperation) -> Option<PendingOperation> {
    let mut merged = incoming;
    match (existing.op_type, merged.op_type) {
        // Never reached the remote: stays a create carrying the latest state
        (OpType::Create, OpType::Update) => {
            let mut record = existing.payload.clone();
            merge_patch(&mut record, &merged.payload);
            merged.op_type = OpType::Create;
            merged.payload = record;
            merged.replaces = existing.replaces;
        }
        (OpType::Update, OpType::Update) => {
            merged.payload = chain_patches(&existing.payload, &merged.payload);
        }
        (OpType::Delete, OpType::Update) => return None,
        // The old document must not leak into the re-created one
        (OpType::Delete, OpType::Create) => merged.replaces = true,
        (OpType::Create, OpType::Create) => merged.replaces = existing.replaces,
        (_, OpType::Delete) | (_, OpType::Create) => {}
    }
    Some(merged)
}

/// Ordered map of live pending operations
#[derive(Debug, Clone, Default)]
pub struct Journal {
    ops: BTreeMap<JournalKey, PendingOperation>,
    next_seq: u64,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted list, keeping the latest entry per key
    pub fn from_operations(operations: Vec<PendingOperation>) -> Self {
        let mut journal = Self::new();
        let mut operations = operations;
        operations.sort_by_key(|op| op.seq);
        for op in operations {
            journal.next_seq = journal.next_seq.max(op.seq + 1);
            journal.ops.insert(op.key(), op);
        }
        journal
    }

    pub fn enqueue(&mut self, op: PendingOperation) -> EnqueueOutcome {
        let key = op.key();
        let (outcome, mut live) = match self.ops.get(&key) {
            None => (EnqueueOutcome::Queued, op),
            Some(existing) => {
                let previous = existing.op_type;
                match coalesce(existing, op) {
                    Some(merged) => (EnqueueOutcome::Superseded { previous }, merged),
                    None => return EnqueueOutcome::Discarded,
                }
            }
        };
        live.seq = self.next_seq;
        self.next_seq += 1;
        self.ops.insert(key, live);
        outcome
    }

    /// Remove the operation with `id`, only if it is still the live entry for its key
    pub fn dequeue(&mut self, id: Uuid) -> Option<PendingOperation> {
        let key = self.ops.iter().find(|(_, op)| op.id == id)?.0.clone();
        self.ops.remove(&key)
    }

    pub fn get(&self, key: &JournalKey) -> Option<&PendingOperation> {
        self.ops.get(key)
    }

    pub fn get_by_id_mut(&mut self, id: Uuid) -> Option<&mut PendingOperation> {
        self.ops.values_mut().find(|op| op.id == id)
    }

    pub fn contains_key(&self, key: &JournalKey) -> bool {
        self.ops.contains_key(key)
    }

    /// Live operations in enqueue order
    pub fn list(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = self.ops.values().cloned().collect();
        ops.sort_by_key(|op| op.seq);
        ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plant_create(id: &str) -> PendingOperation {
        PendingOperation::create(Collection::Plants, id, "u1", json!({ "id": id, "name": "Ficus" }))
    }

    fn plant_update(id: &str, patch: Value) -> PendingOperation {
        PendingOperation::update(Collection::Plants, id, "u1", patch)
    }

    #[test]
    fn test_enqueue_distinct_keys_keeps_order() {
        let mut journal = Journal::new();
        journal.enqueue(plant_create("b"));
        journal.enqueue(plant_create("a"));

        let ids: Vec<_> = journal.list().into_iter().map(|op| op.document_id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_update_after_update_composes_patches() {
        let mut journal = Journal::new();
        journal.enqueue(plant_update("p1", json!({ "name": "Fig" })));
        let outcome = journal.enqueue(plant_update("p1", json!({ "species": "Ficus carica" })));

        assert_eq!(outcome, EnqueueOutcome::Superseded { previous: OpType::Update });
        assert_eq!(journal.len(), 1);
        let op = &journal.list()[0];
        assert_eq!(op.payload, json!({ "name": "Fig", "species": "Ficus carica" }));
    }

    #[test]
    fn test_non_composable_updates_keep_their_order() {
        let mut journal = Journal::new();
        journal.enqueue(plant_update("p1", json!({ "meta": null })));
        journal.enqueue(plant_update("p1", json!({ "meta": { "light": "bright" } })));

        let op = &journal.list()[0];
        assert_eq!(
            op.payload,
            json!([{ "meta": null }, { "meta": { "light": "bright" } }])
        );

        let mut doc = json!({ "id": "p1", "meta": { "water": "weekly" } });
        household_model::apply_patches(&mut doc, &op.payload);
        assert_eq!(doc, json!({ "id": "p1", "meta": { "light": "bright" } }));
    }

    #[test]
    fn test_update_after_create_stays_create() {
        let mut journal = Journal::new();
        journal.enqueue(plant_create("p1"));
        journal.enqueue(plant_update("p1", json!({ "name": "Fig" })));

        let op = &journal.list()[0];
        assert_eq!(op.op_type, OpType::Create);
        assert_eq!(op.payload, json!({ "id": "p1", "name": "Fig" }));
    }

    #[test]
    fn test_delete_supersedes_pending_update() {
        let mut journal = Journal::new();
        journal.enqueue(plant_update("p1", json!({ "name": "Fig" })));
        journal.enqueue(PendingOperation::delete(Collection::Plants, "p1", "u1"));

        let ops = journal.list();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type, OpType::Delete);
    }

    #[test]
    fn test_update_after_delete_is_discarded() {
        let mut journal = Journal::new();
        journal.enqueue(PendingOperation::delete(Collection::Plants, "p1", "u1"));
        let outcome = journal.enqueue(plant_update("p1", json!({ "name": "Fig" })));

        assert_eq!(outcome, EnqueueOutcome::Discarded);
        assert_eq!(journal.list()[0].op_type, OpType::Delete);
    }

    #[test]
    fn test_create_after_delete_replaces() {
        let mut journal = Journal::new();
        journal.enqueue(PendingOperation::delete(Collection::Plants, "p1", "u1"));
        journal.enqueue(plant_create("p1"));
        let op = &journal.list()[0];
        assert_eq!(op.op_type, OpType::Create);
        assert!(op.replaces);
    }

    #[test]
    fn test_update_after_recreate_keeps_replacement() {
        let mut journal = Journal::new();
        journal.enqueue(PendingOperation::delete(Collection::Plants, "p1", "u1"));
        journal.enqueue(plant_create("p1"));
        journal.enqueue(plant_update("p1", json!({ "name": "Fig" })));

        let op = &journal.list()[0];
        assert_eq!(op.op_type, OpType::Create);
        assert!(op.replaces);
        assert_eq!(op.payload, json!({ "id": "p1", "name": "Fig" }));
    }

    #[test]
    fn test_plain_create_is_not_a_replacement() {
        let mut journal = Journal::new();
        journal.enqueue(plant_create("p1"));
        journal.enqueue(plant_update("p1", json!({ "name": "Fig" })));
        assert!(!journal.list()[0].replaces);

        let json = serde_json::to_value(&journal.list()[0]).unwrap();
        assert!(json.get("replaces").is_none());
    }

    #[test]
    fn test_dequeue_stale_id_does_not_remove_superseding_entry() {
        let mut journal = Journal::new();
        let first = plant_update("p1", json!({ "name": "Fig" }));
        let stale_id = first.id;
        journal.enqueue(first);
        journal.enqueue(plant_update("p1", json!({ "name": "Fig tree" })));

        assert!(journal.dequeue(stale_id).is_none());
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_superseding_entry_moves_to_tail() {
        let mut journal = Journal::new();
        journal.enqueue(plant_update("p1", json!({ "name": "A" })));
        journal.enqueue(plant_update("p2", json!({ "name": "B" })));
        journal.enqueue(plant_update("p1", json!({ "name": "C" })));

        let ids: Vec<_> = journal.list().into_iter().map(|op| op.document_id).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
    }

    #[test]
    fn test_from_operations_dedupes_by_key() {
        let mut a = plant_update("p1", json!({ "name": "A" }));
        a.seq = 0;
        let mut b = plant_update("p1", json!({ "name": "B" }));
        b.seq = 1;

        let journal = Journal::from_operations(vec![b.clone(), a]);
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.list()[0].id, b.id);

        let mut journal = journal;
        journal.enqueue(plant_create("p2"));
        assert_eq!(journal.list()[1].seq, 2);
    }

    #[test]
    fn test_is_due() {
        let mut op = plant_create("p1");
        let now = Utc::now();
        assert!(op.is_due(now));
        op.next_attempt_at = Some(now + chrono::Duration::seconds(5));
        assert!(!op.is_due(now));
    }
}
