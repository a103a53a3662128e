//! Last-observed entity state per source.
//!
//! Snapshots are values: a successful poll replaces the whole snapshot for its
//! source, it never patches individual entries. Entities that vanish from a
//! feed simply stop being compared.

use opswatch_protocol::{EntityStatus, SourceTag};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A device or PPPoE session as normalized by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntity {
    pub identity: String,
    pub status: EntityStatus,
}

impl TrackedEntity {
    pub fn new(identity: impl Into<String>, status: EntityStatus) -> Self {
        Self {
            identity: identity.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entities: HashMap<String, EntityStatus>,
}

impl Snapshot {
    /// Later duplicates of an identity overwrite earlier ones.
    pub fn from_entities(entities: &[TrackedEntity]) -> Self {
        Self {
            entities: entities
                .iter()
                .map(|entity| (entity.identity.clone(), entity.status))
                .collect(),
        }
    }

    pub fn status_of(&self, identity: &str) -> Option<EntityStatus> {
        self.entities.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, EntityStatus)> {
        self.entities
            .iter()
            .map(|(identity, status)| (identity.as_str(), *status))
    }
}

/// Last-observed state for every source.
///
/// Entity sources keep a [`Snapshot`]; the activity feed keeps the set of
/// record ids it returned last time, which is what decides whether a feed row
/// is new.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<SourceTag, Arc<Snapshot>>,
    activity_ids: Option<Arc<HashSet<String>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: SourceTag) -> Option<Arc<Snapshot>> {
        self.snapshots.get(&source).cloned()
    }

    pub fn activity_ids(&self) -> Option<Arc<HashSet<String>>> {
        self.activity_ids.clone()
    }

    /// True once a source has completed its first successful fetch.
    pub fn is_primed(&self, source: SourceTag) -> bool {
        match source {
            SourceTag::Activity => self.activity_ids.is_some(),
            _ => self.snapshots.contains_key(&source),
        }
    }

    pub fn replace(&mut self, source: SourceTag, snapshot: Snapshot) {
        self.snapshots.insert(source, Arc::new(snapshot));
    }

    pub fn replace_activity(&mut self, ids: HashSet<String>) {
        self.activity_ids = Some(Arc::new(ids));
    }
}
