//! Conflict resolution engine for divergent household records.
//!
//! Given the local and remote version of the same document, each resolver
//! produces the version to keep plus the strategy that produced it. All
//! resolvers are pure and deterministic.
//!
//! # Resolution Rules
//!
//! - **Timestamp**: strictly newer `updatedAt` wins, ties go to the remote
//! - **Subtask / care task**: greater completion progress wins, ties fall back to timestamp
//! - **Plant**: more than an hour apart resolves by timestamp, otherwise fields merge
//! - **Project**: timestamp for top-level fields, subtasks merge item-wise when both sides have some
//! - **Simple task**: timestamp only
//!
//! Plant merging prefers the local value of a scalar field when it is
//! non-empty, so two versions that both carry different names do not merge
//! commutatively. Unrelated descriptions are concatenated local first, which
//! is order-sensitive as well.

use crate::similarity::similarity;
use chrono::{DateTime, Utc};
use household_model::{
    CareTask, Collection, ModelError, Photo, Plant, Progressive, Project, Record, SimpleTask,
    Subtask, Timestamped,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Plants edited further apart than this resolve by timestamp alone
pub const PLANT_MERGE_WINDOW_SECS: i64 = 60 * 60;

/// Descriptions at least this similar are treated as near duplicates
pub const DESCRIPTION_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Separator placed between two unrelated descriptions
pub const DESCRIPTION_MERGE_MARKER: &str = "\n\n--- merged ---\n\n";

/// Which side a resolution kept
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    Local,
    Remote,
    Merge,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionStrategy::Local => "local",
            ResolutionStrategy::Remote => "remote",
            ResolutionStrategy::Merge => "merge",
        };
        f.write_str(s)
    }
}

/// Two versions of one record and the last sync watermark
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictData<T> {
    pub local: T,
    pub remote: T,
    pub last_sync: Option<DateTime<Utc>>,
}

impl<T> ConflictData<T> {
    pub fn new(local: T, remote: T, last_sync: Option<DateTime<Utc>>) -> Self {
        Self {
            local,
            remote,
            last_sync,
        }
    }
}

impl<T: Timestamped> ConflictData<T> {
    /// Whether both sides changed after the watermark
    pub fn is_concurrent(&self) -> bool {
        match self.last_sync {
            Some(watermark) => {
                self.local.updated_at() > watermark && self.remote.updated_at() > watermark
            }
            None => true,
        }
    }
}

/// The version to keep and how it was chosen
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictResolution<T> {
    pub resolved: T,
    pub strategy: ResolutionStrategy,
}

impl<T> ConflictResolution<T> {
    fn local(resolved: T) -> Self {
        Self {
            resolved,
            strategy: ResolutionStrategy::Local,
        }
    }

    fn remote(resolved: T) -> Self {
        Self {
            resolved,
            strategy: ResolutionStrategy::Remote,
        }
    }

    fn merged(resolved: T) -> Self {
        Self {
            resolved,
            strategy: ResolutionStrategy::Merge,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ConflictResolution<U> {
        ConflictResolution {
            resolved: f(self.resolved),
            strategy: self.strategy,
        }
    }
}

// ========== Generic Resolvers ==========

/// Strictly newer wins; equal timestamps keep the remote version.
pub fn resolve_by_timestamp<T: Timestamped>(conflict: ConflictData<T>) -> ConflictResolution<T> {
    let ConflictData { local, remote, .. } = conflict;
    if local.updated_at() > remote.updated_at() {
        ConflictResolution::local(local)
    } else {
        ConflictResolution::remote(remote)
    }
}

/// Further progress wins; equal progress falls back to timestamp.
pub fn resolve_by_progress<T: Progressive>(conflict: ConflictData<T>) -> ConflictResolution<T> {
    match conflict.local.progress().cmp(&conflict.remote.progress()) {
        Ordering::Greater => ConflictResolution::local(conflict.local),
        Ordering::Less => ConflictResolution::remote(conflict.remote),
        Ordering::Equal => resolve_by_timestamp(conflict),
    }
}

// ========== Per-Type Resolvers ==========

pub fn resolve_subtask(conflict: ConflictData<Subtask>) -> ConflictResolution<Subtask> {
    resolve_by_progress(conflict)
}

pub fn resolve_care_task(conflict: ConflictData<CareTask>) -> ConflictResolution<CareTask> {
    resolve_by_progress(conflict)
}

pub fn resolve_simple_task(conflict: ConflictData<SimpleTask>) -> ConflictResolution<SimpleTask> {
    resolve_by_timestamp(conflict)
}

/// Resolve two plant versions.
///
/// Within [`PLANT_MERGE_WINDOW_SECS`] of each other the versions merge field
/// by field; otherwise the newer one wins outright.
pub fn resolve_plant(conflict: ConflictData<Plant>) -> ConflictResolution<Plant> {
    let gap_ms = (conflict.local.updated_at - conflict.remote.updated_at)
        .num_milliseconds()
        .abs();
    if gap_ms > PLANT_MERGE_WINDOW_SECS * 1000 {
        return resolve_by_timestamp(conflict);
    }

    let ConflictData {
        local,
        remote,
        last_sync,
    } = conflict;

    let mut care_tasks = merge_items(local.care_tasks, remote.care_tasks, last_sync, resolve_care_task);
    care_tasks.sort_by(|a, b| {
        due_order(a.due_date, b.due_date).then_with(|| a.id.cmp(&b.id))
    });

    let resolved = Plant {
        id: remote.id,
        owner_id: prefer_non_empty(local.owner_id, remote.owner_id),
        name: prefer_non_empty(local.name, remote.name),
        species: prefer_non_empty(local.species, remote.species),
        description: merge_descriptions(&local.description, &remote.description),
        photos: merge_photos(local.photos, remote.photos),
        care_tasks,
        created_at: local.created_at.min(remote.created_at),
        updated_at: local.updated_at.max(remote.updated_at),
    };
    ConflictResolution::merged(resolved)
}

/// Resolve two project versions.
///
/// Top-level fields follow the timestamp rule. When both versions carry
/// subtasks, those are unioned by id and conflicting ids resolved per item.
pub fn resolve_project(conflict: ConflictData<Project>) -> ConflictResolution<Project> {
    if conflict.local.subtasks.is_empty() || conflict.remote.subtasks.is_empty() {
        return resolve_by_timestamp(conflict);
    }

    let ConflictData {
        mut local,
        mut remote,
        last_sync,
    } = conflict;
    let local_subtasks = std::mem::take(&mut local.subtasks);
    let remote_subtasks = std::mem::take(&mut remote.subtasks);

    let mut subtasks = merge_items(local_subtasks, remote_subtasks, last_sync, resolve_subtask);
    subtasks.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

    let mut resolved = resolve_by_timestamp(ConflictData::new(local, remote, last_sync)).resolved;
    resolved.subtasks = subtasks;
    ConflictResolution::merged(resolved)
}

// ========== Dispatch ==========

/// Resolve two records of the same kind
pub fn resolve_records(
    local: Record,
    remote: Record,
    last_sync: Option<DateTime<Utc>>,
) -> Result<ConflictResolution<Record>, ModelError> {
    let resolution = match (local, remote) {
        (Record::Plant(l), Record::Plant(r)) => {
            resolve_plant(ConflictData::new(l, r, last_sync)).map(Record::Plant)
        }
        (Record::Project(l), Record::Project(r)) => {
            resolve_project(ConflictData::new(l, r, last_sync)).map(Record::Project)
        }
        (Record::SimpleTask(l), Record::SimpleTask(r)) => {
            resolve_simple_task(ConflictData::new(l, r, last_sync)).map(Record::SimpleTask)
        }
        (Record::Subtask(l), Record::Subtask(r)) => {
            resolve_subtask(ConflictData::new(l, r, last_sync)).map(Record::Subtask)
        }
        (Record::CareTask(l), Record::CareTask(r)) => {
            resolve_care_task(ConflictData::new(l, r, last_sync)).map(Record::CareTask)
        }
        (l, r) => {
            return Err(ModelError::CollectionMismatch {
                expected: l.collection().to_string(),
                actual: r.collection().to_string(),
            })
        }
    };
    Ok(resolution)
}

/// Resolve two untyped documents from `collection`
pub fn resolve_documents(
    collection: Collection,
    local: Value,
    remote: Value,
    last_sync: Option<DateTime<Utc>>,
) -> Result<ConflictResolution<Value>, ModelError> {
    let local = Record::from_value(collection, local)?;
    let remote = Record::from_value(collection, remote)?;
    let resolution = resolve_records(local, remote, last_sync)?;
    Ok(ConflictResolution {
        strategy: resolution.strategy,
        resolved: resolution.resolved.into_value()?,
    })
}

// ========== Field Merging ==========

fn prefer_non_empty(local: String, remote: String) -> String {
    if local.trim().is_empty() {
        remote
    } else {
        local
    }
}

/// Merge free-text descriptions.
///
/// Near duplicates keep the longer text (ties broken by ordering); otherwise
/// both are kept, local first, separated by [`DESCRIPTION_MERGE_MARKER`].
pub fn merge_descriptions(local: &str, remote: &str) -> String {
    if local.trim().is_empty() {
        return remote.to_string();
    }
    if remote.trim().is_empty() || local == remote {
        return local.to_string();
    }

    if similarity(local, remote) >= DESCRIPTION_SIMILARITY_THRESHOLD {
        let local_len = local.chars().count();
        let remote_len = remote.chars().count();
        let keep_local = match local_len.cmp(&remote_len) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => local > remote,
        };
        return if keep_local { local } else { remote }.to_string();
    }

    format!("{}{}{}", local, DESCRIPTION_MERGE_MARKER, remote)
}

/// Union photos by id, ordered by upload time.
///
/// The same id on both sides keeps the later upload.
pub fn merge_photos(local: Vec<Photo>, remote: Vec<Photo>) -> Vec<Photo> {
    let mut by_id: BTreeMap<String, Photo> = BTreeMap::new();
    for photo in local.into_iter().chain(remote) {
        let keep_existing = by_id
            .get(&photo.id)
            .is_some_and(|existing| photo_rank(existing) >= photo_rank(&photo));
        if !keep_existing {
            by_id.insert(photo.id.clone(), photo);
        }
    }

    let mut photos: Vec<Photo> = by_id.into_values().collect();
    photos.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
    photos
}

fn photo_rank(photo: &Photo) -> (DateTime<Utc>, &str, Option<&str>) {
    (photo.uploaded_at, &photo.url, photo.caption.as_deref())
}

/// Union two item lists by id, resolving shared ids with `resolve`
fn merge_items<T: Progressive>(
    local: Vec<T>,
    remote: Vec<T>,
    last_sync: Option<DateTime<Utc>>,
    resolve: fn(ConflictData<T>) -> ConflictResolution<T>,
) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = remote
        .into_iter()
        .map(|item| (item.item_id().to_string(), item))
        .collect();

    for item in local {
        let id = item.item_id().to_string();
        let resolved = match merged.remove(&id) {
            Some(theirs) => resolve(ConflictData::new(item, theirs, last_sync)).resolved,
            None => item,
        };
        merged.insert(id, resolved);
    }

    merged.into_values().collect()
}

/// Dated items first, undated last
fn due_order(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
