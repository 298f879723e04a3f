//! Storage abstraction for mirrored records.
//!
//! This module provides a trait-based record store with pluggable backends
//! (in-memory, SQLite). Records are stored as nested documents keyed by
//! entity kind and identity within a keyspace.

mod memory;
#[cfg(any(feature = "sqlite", test))]
mod sqlite;

pub use memory::InMemoryStore;
#[cfg(any(feature = "sqlite", test))]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::core::record::{CanonicalRecord, Fields};
use crate::core::types::{EntityKind, Identity};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same identity already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

impl StorageError {
    pub(crate) fn not_found(kind: EntityKind, identity: &Identity) -> Self {
        StorageError::NotFound(format!("{}: {}", kind, identity))
    }

    pub(crate) fn duplicate(kind: EntityKind, identity: &Identity) -> Self {
        StorageError::DuplicateKey(format!("{}: {}", kind, identity))
    }
}

/// Persistent store of canonical records.
///
/// Implementations must be thread-safe; one collector per entity kind uses
/// the same store concurrently. Writes are single operations: an insert or
/// an update either lands completely or not at all.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List every identity stored for a kind.
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, StorageError>;

    /// Get the stored fields of one record.
    async fn get_record(&self, kind: EntityKind, identity: &Identity)
    -> Result<Fields, StorageError>;

    /// Insert a new record. Fails with `DuplicateKey` if it already exists.
    async fn insert_record(&self, record: &CanonicalRecord) -> Result<(), StorageError>;

    /// Overwrite the given top-level fields of an existing record.
    ///
    /// Fields absent from the patch are left untouched. Fails with
    /// `NotFound` if the record does not exist.
    async fn update_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
        patch: &Fields,
    ) -> Result<(), StorageError>;
}
