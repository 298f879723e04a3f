//! In-memory record store.
//!
//! Provides a thread-safe in-memory backend for testing and development.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use super::{RecordStore, StorageError};
use crate::core::record::{CanonicalRecord, Fields};
use crate::core::types::{EntityKind, Identity};
use crate::diff;

/// In-memory record store.
///
/// Thread-safe storage using RwLock for concurrent access.
/// Data is not persisted across restarts.
pub struct InMemoryStore {
    records: RwLock<HashMap<EntityKind, BTreeMap<Identity, Fields>>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records stored for a kind.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.records
            .read()
            .map(|records| records.get(&kind).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Drop a record. Collectors never do this; it exists for maintenance
    /// and tests.
    pub fn remove(&self, kind: EntityKind, identity: &Identity) -> bool {
        self.records
            .write()
            .map(|mut records| {
                records
                    .get_mut(&kind)
                    .is_some_and(|m| m.remove(identity).is_some())
            })
            .unwrap_or(false)
    }

    /// Whether no record of the kind is stored.
    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .get(&kind)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<Fields, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        records
            .get(&kind)
            .and_then(|m| m.get(identity))
            .cloned()
            .ok_or_else(|| StorageError::not_found(kind, identity))
    }

    async fn insert_record(&self, record: &CanonicalRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let table = records.entry(record.kind).or_default();
        if table.contains_key(&record.identity) {
            return Err(StorageError::duplicate(record.kind, &record.identity));
        }
        table.insert(record.identity.clone(), record.to_fields());
        Ok(())
    }

    async fn update_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
        patch: &Fields,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = records
            .get_mut(&kind)
            .and_then(|m| m.get_mut(identity))
            .ok_or_else(|| StorageError::not_found(kind, identity))?;
        diff::apply(stored, patch);
        Ok(())
    }
}
