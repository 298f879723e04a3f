//! slurmsync - incremental mirror of Slurm nodes, partitions, and jobs.
//!
//! One [`Collector`] per entity kind polls the resource manager, normalizes
//! what it reports into [`CanonicalRecord`]s, and writes only new records and
//! changed fields to a [`RecordStore`]. A [`Supervisor`] runs the three
//! collectors side by side.

pub mod collector;
pub mod config;
pub mod core;
pub mod diff;
pub mod events;
pub mod normalize;
pub mod source;
pub mod storage;
pub mod supervisor;
pub mod testing;

pub use collector::{Collector, CollectorError, CollectorHandle, CollectorState, CycleReport};
pub use config::{ConfigError, GlobalConfig, SourceConfig, StoreConfig, YamlLoader};
pub use core::record::{CanonicalRecord, Fields, RawAttributes};
pub use core::types::{EntityKind, Identity};
pub use events::{Event, EventBus, EventHandler};
pub use normalize::{classify, normalize, NormalizeError, Placement};
pub use source::{ClusterSource, InMemorySource, ScontrolSource, SourceError};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use storage::{InMemoryStore, RecordStore, StorageError};
pub use supervisor::{Supervisor, SupervisorHandle};
