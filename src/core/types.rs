//! Core identifier types for the mirror.
//!
//! These types name the three entity kinds tracked by the collectors and the
//! identities the resource manager assigns to each entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The kind of scheduler entity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A compute node.
    Node,
    /// A resource partition.
    Partition,
    /// A submitted job.
    Job,
}

impl EntityKind {
    /// All entity kinds, in the order collectors are started.
    pub const ALL: [EntityKind; 3] = [EntityKind::Node, EntityKind::Partition, EntityKind::Job];

    /// Name of the field carrying the identity in a canonical record.
    pub fn identity_field(&self) -> &'static str {
        match self {
            EntityKind::Node | EntityKind::Partition => "name",
            EntityKind::Job => "job_id",
        }
    }

    /// Name of the table (or collection) holding records of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Node => "nodes",
            EntityKind::Partition => "partitions",
            EntityKind::Job => "jobs",
        }
    }

    /// Get the lowercase name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Partition => "partition",
            EntityKind::Job => "job",
        }
    }

    /// Build an identity of the right shape for this kind from a raw value.
    ///
    /// Nodes and partitions are keyed by name, jobs by an integer id. Job ids
    /// given as decimal strings are accepted.
    pub fn identity_from_value(&self, value: &Value) -> Option<Identity> {
        match self {
            EntityKind::Node | EntityKind::Partition => match value {
                Value::String(s) if !s.is_empty() => Some(Identity::Name(s.clone())),
                _ => None,
            },
            EntityKind::Job => match value {
                Value::Number(n) => n.as_i64().map(Identity::Number),
                Value::String(s) => s.trim().parse().ok().map(Identity::Number),
                _ => None,
            },
        }
    }

    /// Parse an identity from its textual form (as printed by the CLI tools).
    pub fn parse_identity(&self, s: &str) -> Option<Identity> {
        self.identity_from_value(&Value::String(s.to_string()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" | "nodes" => Ok(EntityKind::Node),
            "partition" | "partitions" => Ok(EntityKind::Partition),
            "job" | "jobs" => Ok(EntityKind::Job),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// Unique key of a record within its kind.
///
/// Assigned by the resource manager and stable across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    /// Node or partition name.
    Name(String),
    /// Numeric job identifier.
    Number(i64),
}

impl Identity {
    /// Create a name identity.
    pub fn name(name: impl Into<String>) -> Self {
        Identity::Name(name.into())
    }

    /// Create a numeric identity.
    pub fn number(id: i64) -> Self {
        Identity::Number(id)
    }

    /// Convert to the JSON value stored in the identity field.
    pub fn to_value(&self) -> Value {
        match self {
            Identity::Name(name) => Value::String(name.clone()),
            Identity::Number(id) => Value::from(*id),
        }
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity::Name(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Identity::Name(s)
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity::Number(id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Name(name) => write!(f, "{}", name),
            Identity::Number(id) => write!(f, "{}", id),
        }
    }
}
