//! Testing utilities for slurmsync.
//!
//! This module provides helpers for exercising collectors without a live
//! cluster or database:
//!
//! - [`fixtures`]: raw attribute bags and pre-populated sources
//! - [`InstrumentedStore`]: a store wrapper that records writes and can be
//!   told to fail
//! - [`RecordingHandler`]: an event handler that keeps every event
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use slurmsync::collector::Collector;
//! use slurmsync::core::types::EntityKind;
//! use slurmsync::storage::InMemoryStore;
//! use slurmsync::testing::{fixtures, InstrumentedStore};
//!
//! # tokio_test_block(async {
//! let source = Arc::new(fixtures::cluster(2, 0));
//! let store = Arc::new(InstrumentedStore::new(InMemoryStore::new()));
//!
//! let mut collector = Collector::new(EntityKind::Node, source, Arc::clone(&store));
//! let report = collector.run_cycle().await;
//!
//! assert_eq!(report.created, 2);
//! assert_eq!(store.insert_count(), 2);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod fixtures;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::core::record::{CanonicalRecord, Fields};
use crate::core::types::{EntityKind, Identity};
use crate::events::{Event, EventHandler};
use crate::storage::{RecordStore, StorageError};

/// A store wrapper that records every successful write and can inject
/// failures.
pub struct InstrumentedStore<S> {
    inner: S,
    inserts: Mutex<Vec<(EntityKind, Identity)>>,
    updates: Mutex<Vec<(EntityKind, Identity, Fields)>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_reads: AtomicBool,
}

impl<S: RecordStore> InstrumentedStore<S> {
    /// Wrap a store.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            inserts: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Get the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make inserts fail.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make updates fail.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make identity listings and record reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful inserts, in order.
    pub fn inserts(&self) -> Vec<(EntityKind, Identity)> {
        self.inserts.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Successful updates with the patch written, in order.
    pub fn updates(&self) -> Vec<(EntityKind, Identity, Fields)> {
        self.updates.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Number of successful inserts.
    pub fn insert_count(&self) -> usize {
        self.inserts.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Number of successful updates.
    pub fn update_count(&self) -> usize {
        self.updates.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Forget the recorded writes.
    pub fn clear(&self) {
        if let Ok(mut inserts) = self.inserts.lock() {
            inserts.clear();
        }
        if let Ok(mut updates) = self.updates.lock() {
            updates.clear();
        }
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Other(format!("injected {} failure", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for InstrumentedStore<S> {
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, StorageError> {
        Self::injected(&self.fail_reads, "read")?;
        self.inner.list_identities(kind).await
    }

    async fn get_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<Fields, StorageError> {
        Self::injected(&self.fail_reads, "read")?;
        self.inner.get_record(kind, identity).await
    }

    async fn insert_record(&self, record: &CanonicalRecord) -> Result<(), StorageError> {
        Self::injected(&self.fail_inserts, "insert")?;
        self.inner.insert_record(record).await?;
        if let Ok(mut inserts) = self.inserts.lock() {
            inserts.push((record.kind, record.identity.clone()));
        }
        Ok(())
    }

    async fn update_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
        patch: &Fields,
    ) -> Result<(), StorageError> {
        Self::injected(&self.fail_updates, "update")?;
        self.inner.update_record(kind, identity, patch).await?;
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((kind, identity.clone(), patch.clone()));
        }
        Ok(())
    }
}

/// Event handler that records every event it receives.
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self {
            events: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// All events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Identities whose fetch failed, in order.
    pub async fn fetch_failures(&self) -> Vec<Identity> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                Event::FetchFailed { identity, .. } => Some(identity.clone()),
                _ => None,
            })
            .collect()
    }

    /// Identities created, in order.
    pub async fn created(&self) -> Vec<(EntityKind, Identity)> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                Event::RecordCreated { kind, identity, .. } => Some((*kind, identity.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of completed cycles observed.
    pub async fn cycle_count(&self) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| matches!(event, Event::CycleCompleted { .. }))
            .count()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
