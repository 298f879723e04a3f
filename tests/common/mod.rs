//! Common test utilities shared across integration tests.

use async_trait::async_trait;
use serde_json::Value;
use slurmsync::{
    ClusterSource, EntityKind, Fields, Identity, InMemorySource, RawAttributes, RecordStore,
    SourceError,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Wait for a stored record to carry the expected field value, polling the
/// store.
///
/// Polls every 10ms and panics if the timeout is reached first.
#[allow(dead_code)]
pub async fn wait_for_field(
    store: &dyn RecordStore,
    kind: EntityKind,
    identity: &Identity,
    field: &str,
    expected: &Value,
    timeout: Duration,
) -> Fields {
    let start = tokio::time::Instant::now();
    loop {
        if let Ok(fields) = store.get_record(kind, identity).await {
            if fields.get(field) == Some(expected) {
                return fields;
            }
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for {} {} to have {} = {}",
                kind, identity, field, expected
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Source that delays every detail lookup and signals when the first one
/// starts.
#[allow(dead_code)]
pub struct SlowSource {
    inner: InMemorySource,
    delay: Duration,
    fetch_started: Arc<Notify>,
    fetches_done: AtomicUsize,
}

#[allow(dead_code)]
impl SlowSource {
    pub fn new(inner: InMemorySource, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            fetch_started: Arc::new(Notify::new()),
            fetches_done: AtomicUsize::new(0),
        }
    }

    /// Notified when a detail lookup begins.
    pub fn fetch_started(&self) -> Arc<Notify> {
        Arc::clone(&self.fetch_started)
    }

    /// Number of detail lookups that ran to completion.
    pub fn fetches_done(&self) -> usize {
        self.fetches_done.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterSource for SlowSource {
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, SourceError> {
        self.inner.list_identities(kind).await
    }

    async fn fetch(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<RawAttributes, SourceError> {
        self.fetch_started.notify_one();
        tokio::time::sleep(self.delay).await;
        let result = self.inner.fetch(kind, identity).await;
        self.fetches_done.fetch_add(1, Ordering::SeqCst);
        result
    }
}
