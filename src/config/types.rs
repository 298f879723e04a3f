//! Configuration type definitions.
//!
//! This module contains the structures read from `slurmsync.yaml`: the
//! keyspace, the record store, the cluster source, and poll intervals.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::types::EntityKind;

/// Global configuration (slurmsync.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Namespace for stored records.
    pub keyspace: String,
    /// Record store configuration.
    pub store: StoreConfig,
    /// Cluster source configuration.
    pub source: SourceConfig,
    /// Poll intervals per entity kind.
    pub intervals: IntervalConfig,
    /// Log every changed field at info level.
    pub verbose: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            keyspace: "slurm".to_string(),
            store: StoreConfig::default(),
            source: SourceConfig::default(),
            intervals: IntervalConfig::default(),
            verbose: false,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// In-memory store (non-persistent).
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// SQLite store.
    #[serde(rename = "sqlite")]
    Sqlite {
        /// Path to the database file.
        path: PathBuf,
    },
}

impl std::str::FromStr for StoreConfig {
    type Err = String;

    /// Parse `memory` or `sqlite:PATH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "memory" => Ok(StoreConfig::Memory),
            Some(("sqlite", path)) if !path.is_empty() => Ok(StoreConfig::Sqlite {
                path: PathBuf::from(path),
            }),
            _ => Err(format!(
                "invalid store '{}': expected 'memory' or 'sqlite:PATH'",
                s
            )),
        }
    }
}

/// Cluster source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// Slurm command-line tools.
    #[serde(rename = "scontrol")]
    Scontrol {
        /// Directory holding the Slurm binaries (PATH lookup if unset).
        #[serde(default)]
        bin_dir: Option<PathBuf>,
        /// Per-command timeout in seconds.
        #[serde(default = "default_command_timeout")]
        timeout_secs: u64,
    },
    /// Static cluster description loaded from a YAML/JSON file.
    #[serde(rename = "snapshot")]
    Snapshot {
        /// Path to the snapshot file.
        path: PathBuf,
    },
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Scontrol {
            bin_dir: None,
            timeout_secs: default_command_timeout(),
        }
    }
}

/// Poll intervals in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// Node poll interval.
    pub node_secs: u64,
    /// Partition poll interval.
    pub partition_secs: u64,
    /// Job poll interval.
    pub job_secs: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            node_secs: 10,
            partition_secs: 10,
            job_secs: 1,
        }
    }
}

impl IntervalConfig {
    /// Interval for one kind.
    pub fn for_kind(&self, kind: EntityKind) -> Duration {
        let secs = match kind {
            EntityKind::Node => self.node_secs,
            EntityKind::Partition => self.partition_secs,
            EntityKind::Job => self.job_secs,
        };
        Duration::from_secs(secs)
    }

    /// Override the interval for one kind.
    pub fn set(&mut self, kind: EntityKind, secs: u64) {
        match kind {
            EntityKind::Node => self.node_secs = secs,
            EntityKind::Partition => self.partition_secs = secs,
            EntityKind::Job => self.job_secs = secs,
        }
    }
}
