//! Entity normalization.
//!
//! Turns a loosely structured attribute bag describing one node, partition,
//! or job into a [`CanonicalRecord`] with a fixed identity field, core fields,
//! and category buckets. Normalization is a pure function of its input and the
//! static tables in [`tables`].

pub mod tables;

use serde_json::Value;
use thiserror::Error;

use crate::core::record::{CanonicalRecord, RawAttributes, OVERFLOW_BUCKET};
use crate::core::types::EntityKind;

pub use tables::{schema, KindSchema};

/// Errors raised when a raw attribute bag cannot form a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// A required core field is absent or null.
    #[error("{kind} record is missing required field '{field}'")]
    MissingField {
        kind: EntityKind,
        field: &'static str,
    },

    /// The identity field has the wrong type.
    #[error("{kind} record has an invalid identity: {value}")]
    InvalidIdentity { kind: EntityKind, value: String },
}

/// Where a raw attribute ends up in a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The identity field.
    Identity,
    /// A top-level core field.
    Core,
    /// A category bucket.
    Bucket(&'static str),
    /// The overflow bucket.
    Overflow,
    /// Dropped (denylisted).
    Dropped,
}

/// Decide where an attribute of the given kind is placed.
pub fn classify(kind: EntityKind, name: &str) -> Placement {
    let schema = schema(kind);
    if name == kind.identity_field() {
        Placement::Identity
    } else if schema.is_core(name) {
        Placement::Core
    } else if schema.is_denied(name) {
        Placement::Dropped
    } else if let Some(bucket) = schema.category_of(name) {
        Placement::Bucket(bucket)
    } else {
        Placement::Overflow
    }
}

/// Normalize a raw attribute bag into a canonical record.
///
/// Fails only when the identity or a required core field is missing;
/// unknown attributes never cause an error.
pub fn normalize(kind: EntityKind, raw: &RawAttributes) -> Result<CanonicalRecord, NormalizeError> {
    let schema = schema(kind);
    let identity_field = kind.identity_field();

    let identity = match raw.get(identity_field) {
        None | Some(Value::Null) => {
            return Err(NormalizeError::MissingField {
                kind,
                field: identity_field,
            });
        }
        Some(value) => {
            kind.identity_from_value(value)
                .ok_or_else(|| NormalizeError::InvalidIdentity {
                    kind,
                    value: value.to_string(),
                })?
        }
    };

    for &field in schema.required {
        if raw.get(field).map_or(true, Value::is_null) {
            return Err(NormalizeError::MissingField { kind, field });
        }
    }

    let mut record = CanonicalRecord::new(kind, identity);
    for (name, value) in raw {
        let value = if schema.is_stringified(name) {
            stringify(value)
        } else {
            value.clone()
        };

        match classify(kind, name) {
            Placement::Identity | Placement::Dropped => {}
            Placement::Core => {
                record.core.insert(name.clone(), value);
            }
            Placement::Bucket(bucket) => record.insert_into_bucket(bucket, name.clone(), value),
            Placement::Overflow => record.insert_into_bucket(OVERFLOW_BUCKET, name.clone(), value),
        }
    }

    Ok(record)
}

/// Render a value as text, leaving strings and nulls untouched.
fn stringify(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => Value::String(other.to_string()),
    }
}
