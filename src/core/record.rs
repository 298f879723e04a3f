//! Canonical record shape.
//!
//! A [`CanonicalRecord`] is the normalized, bucketed representation of one
//! node, partition, or job. Records are stored and compared in their
//! flattened form, a [`Fields`] mapping where every bucket is a nested object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{EntityKind, Identity};

/// Raw attribute bag as reported by the resource manager.
pub type RawAttributes = BTreeMap<String, Value>;

/// Flattened record fields: top-level field name to value.
pub type Fields = BTreeMap<String, Value>;

/// Name of the bucket holding attributes no category table recognizes.
pub const OVERFLOW_BUCKET: &str = "overflow";

/// Normalized representation of one scheduler entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Kind of the entity.
    pub kind: EntityKind,
    /// Identity assigned by the resource manager.
    pub identity: Identity,
    /// Core scalar fields (state, host list, ...), excluding the identity.
    pub core: Fields,
    /// Category buckets, keyed by bucket name.
    pub buckets: BTreeMap<String, Fields>,
    /// Attributes not recognized by any category.
    pub overflow: Fields,
}

impl CanonicalRecord {
    /// Create an empty record for the given identity.
    pub fn new(kind: EntityKind, identity: Identity) -> Self {
        Self {
            kind,
            identity,
            core: Fields::new(),
            buckets: BTreeMap::new(),
            overflow: Fields::new(),
        }
    }

    /// Set a core field.
    pub fn with_core(mut self, name: impl Into<String>, value: Value) -> Self {
        self.core.insert(name.into(), value);
        self
    }

    /// Put an attribute into a named bucket.
    pub fn insert_into_bucket(&mut self, bucket: &str, name: impl Into<String>, value: Value) {
        if bucket == OVERFLOW_BUCKET {
            self.overflow.insert(name.into(), value);
        } else {
            self.buckets
                .entry(bucket.to_string())
                .or_default()
                .insert(name.into(), value);
        }
    }

    /// Get a core field.
    pub fn core_field(&self, name: &str) -> Option<&Value> {
        self.core.get(name)
    }

    /// Get a bucket by name (`overflow` included).
    pub fn bucket(&self, name: &str) -> Option<&Fields> {
        if name == OVERFLOW_BUCKET {
            Some(&self.overflow)
        } else {
            self.buckets.get(name)
        }
    }

    /// Iterate over every attribute name carried by the record, identity
    /// included.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.kind.identity_field())
            .chain(self.core.keys().map(String::as_str))
            .chain(self.buckets.values().flat_map(|b| b.keys().map(String::as_str)))
            .chain(self.overflow.keys().map(String::as_str))
    }

    /// Flatten into the stored representation.
    ///
    /// The key set depends only on the kind. Buckets and optional core
    /// fields the entity does not report are emitted empty (`{}` or `null`).
    pub fn to_fields(&self) -> Fields {
        let schema = crate::normalize::schema(self.kind);
        let mut fields = Fields::new();
        fields.insert(
            self.kind.identity_field().to_string(),
            self.identity.to_value(),
        );
        for name in schema.optional {
            fields.insert(name.to_string(), Value::Null);
        }
        for (name, value) in &self.core {
            fields.insert(name.clone(), value.clone());
        }
        for bucket in schema.bucket_names() {
            let value = self
                .buckets
                .get(bucket)
                .map_or_else(|| Value::Object(Default::default()), bucket_to_value);
            fields.insert(bucket.to_string(), value);
        }
        for (name, bucket) in &self.buckets {
            fields
                .entry(name.clone())
                .or_insert_with(|| bucket_to_value(bucket));
        }
        fields.insert(OVERFLOW_BUCKET.to_string(), bucket_to_value(&self.overflow));
        fields
    }

    /// Minimal patch turning `stored` into this record.
    ///
    /// The identity field is never part of the patch.
    pub fn changes_from(&self, stored: &Fields) -> Fields {
        let mut patch = crate::diff::diff(stored, &self.to_fields());
        patch.remove(self.kind.identity_field());
        patch
    }
}

fn bucket_to_value(bucket: &Fields) -> Value {
    Value::Object(
        bucket
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}
