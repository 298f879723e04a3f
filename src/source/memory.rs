//! In-memory cluster source.
//!
//! Holds a scriptable view of the cluster. Used by tests, benchmarks, and the
//! `snapshot` source type, which loads a static cluster description from a
//! YAML or JSON file.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{ClusterSource, SourceError};
use crate::core::record::RawAttributes;
use crate::core::types::{EntityKind, Identity};

/// Static cluster description as read from a snapshot file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Snapshot {
    nodes: Vec<RawAttributes>,
    partitions: Vec<RawAttributes>,
    jobs: Vec<RawAttributes>,
}

/// In-memory resource manager.
///
/// Entities can be added, changed, and removed between polls; detail lookups
/// can be made to fail per identity and the whole source can be made
/// unavailable.
pub struct InMemorySource {
    entities: RwLock<HashMap<EntityKind, BTreeMap<Identity, RawAttributes>>>,
    failing_fetches: RwLock<HashSet<(EntityKind, Identity)>>,
    unavailable: AtomicBool,
    fetch_count: AtomicUsize,
}

impl InMemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            failing_fetches: RwLock::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Load a source from a YAML or JSON snapshot with optional `nodes`,
    /// `partitions` and `jobs` lists of attribute maps.
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::Unavailable(format!("cannot read snapshot {}: {}", path.display(), e))
        })?;
        Self::from_snapshot_str(&content)
    }

    /// Load a source from snapshot text.
    pub fn from_snapshot_str(content: &str) -> Result<Self, SourceError> {
        let snapshot: Snapshot =
            serde_yaml::from_str(content).map_err(|e| SourceError::Parse(e.to_string()))?;

        let source = Self::new();
        for (kind, entries) in [
            (EntityKind::Node, snapshot.nodes),
            (EntityKind::Partition, snapshot.partitions),
            (EntityKind::Job, snapshot.jobs),
        ] {
            for attrs in entries {
                let identity = attrs
                    .get(kind.identity_field())
                    .and_then(|v| kind.identity_from_value(v))
                    .ok_or_else(|| {
                        SourceError::Parse(format!(
                            "{} entry without a valid '{}'",
                            kind,
                            kind.identity_field()
                        ))
                    })?;
                source.insert(kind, identity, attrs);
            }
        }
        Ok(source)
    }

    /// Add or replace an entity.
    pub fn insert(&self, kind: EntityKind, identity: impl Into<Identity>, attrs: RawAttributes) {
        if let Ok(mut entities) = self.entities.write() {
            entities
                .entry(kind)
                .or_default()
                .insert(identity.into(), attrs);
        }
    }

    /// Change a single attribute of an existing entity.
    pub fn set_attribute(
        &self,
        kind: EntityKind,
        identity: &Identity,
        name: &str,
        value: serde_json::Value,
    ) {
        if let Ok(mut entities) = self.entities.write() {
            if let Some(attrs) = entities.get_mut(&kind).and_then(|m| m.get_mut(identity)) {
                attrs.insert(name.to_string(), value);
            }
        }
    }

    /// Remove an entity.
    pub fn remove(&self, kind: EntityKind, identity: &Identity) {
        if let Ok(mut entities) = self.entities.write() {
            if let Some(map) = entities.get_mut(&kind) {
                map.remove(identity);
            }
        }
    }

    /// Make detail lookups for one identity fail (or succeed again).
    pub fn set_fetch_failure(&self, kind: EntityKind, identity: impl Into<Identity>, fail: bool) {
        if let Ok(mut failing) = self.failing_fetches.write() {
            let key = (kind, identity.into());
            if fail {
                failing.insert(key);
            } else {
                failing.remove(&key);
            }
        }
    }

    /// Make every call fail as if the resource manager were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of detail lookups served so far (failed ones included).
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("source marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterSource for InMemorySource {
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, SourceError> {
        self.check_available()?;
        let entities = self
            .entities
            .read()
            .map_err(|_| SourceError::Unavailable("source lock poisoned".to_string()))?;
        Ok(entities
            .get(&kind)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<RawAttributes, SourceError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let failing = self
            .failing_fetches
            .read()
            .map_err(|_| SourceError::Unavailable("source lock poisoned".to_string()))?;
        if failing.contains(&(kind, identity.clone())) {
            return Err(SourceError::Command {
                command: format!("fetch {} {}", kind, identity),
                reason: "injected failure".to_string(),
            });
        }
        drop(failing);

        let entities = self
            .entities
            .read()
            .map_err(|_| SourceError::Unavailable("source lock poisoned".to_string()))?;
        entities
            .get(&kind)
            .and_then(|m| m.get(identity))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                kind,
                identity: identity.clone(),
            })
    }
}
