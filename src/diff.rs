//! Field-level equality and minimal patches between records.
//!
//! Comparison only looks at fields present on both sides, so a record stored
//! under an older schema still compares equal to a freshly normalized one as
//! long as the fields they share agree. Empty forms (`null`, `[]`, `{}`) are
//! treated as one absent value before comparing.

use serde_json::Value;

use crate::core::record::Fields;

/// Reduce a value to its canonical form for comparison.
///
/// `null`, empty arrays and empty objects become `null`. Object entries whose
/// canonical value is `null` are dropped, and an object left with no entries
/// becomes `null` itself.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) if items.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let map: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other.clone(),
    }
}

/// Compare two values after canonicalization.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Whether two records agree on every field they both carry.
pub fn equals(a: &Fields, b: &Fields) -> bool {
    a.iter()
        .filter_map(|(name, av)| b.get(name).map(|bv| (av, bv)))
        .all(|(av, bv)| values_equal(av, bv))
}

/// Fields present in both records whose values differ, mapped to the value
/// from `new`.
pub fn diff(old: &Fields, new: &Fields) -> Fields {
    old.iter()
        .filter_map(|(name, ov)| {
            let nv = new.get(name)?;
            (!values_equal(ov, nv)).then(|| (name.clone(), nv.clone()))
        })
        .collect()
}

/// Overwrite the patched fields of `target`.
pub fn apply(target: &mut Fields, patch: &Fields) {
    for (name, value) in patch {
        target.insert(name.clone(), value.clone());
    }
}
