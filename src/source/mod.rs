//! Cluster resource manager abstraction.
//!
//! A [`ClusterSource`] answers two questions per entity kind: which
//! identities exist right now, and what the full detail of one identity is.
//! Detail lookups may fail per identity without affecting the caller.

mod memory;
mod scontrol;

pub use memory::InMemorySource;
pub use scontrol::{parse_oneliner, ScontrolSource};

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::core::record::RawAttributes;
use crate::core::types::{EntityKind, Identity};

/// Errors that can occur when querying the resource manager.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The resource manager cannot be reached.
    #[error("resource manager unavailable: {0}")]
    Unavailable(String),

    /// The identity is no longer known to the resource manager.
    #[error("{kind} {identity} not found")]
    NotFound { kind: EntityKind, identity: Identity },

    /// A command-line tool failed.
    #[error("command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    /// Output could not be parsed.
    #[error("failed to parse resource manager output: {0}")]
    Parse(String),
}

/// Authoritative source of scheduler state.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List the identities currently present for a kind.
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, SourceError>;

    /// Fetch the raw attributes of one entity.
    async fn fetch(&self, kind: EntityKind, identity: &Identity)
    -> Result<RawAttributes, SourceError>;
}
