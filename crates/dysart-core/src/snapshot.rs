//! Result snapshots.
//!
//! A [`Snapshot`] holds the values recorded by exactly one successful update
//! of a feature. Derived values computed later by memoized accessors are
//! written back into the same snapshot, so a snapshot grows but never
//! loses entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Named values from one physical re-measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub fn new() -> Self {
        Snapshot(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Inserts a value, returning the previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The snapshot as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Snapshot(iter.into_iter().collect())
    }
}

/// Maps a signed history index onto a position in a list of `len` items.
///
/// Non-negative indices count from the oldest entry; negative indices count
/// back from the newest, so `-1` is the most recent snapshot.
pub fn resolve_index(len: usize, index: isize) -> Result<usize, CoreError> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        let i = index as usize;
        (i < len).then_some(i)
    };
    resolved.ok_or(CoreError::IndexOutOfRange { index, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn negative_indices_count_from_newest() {
        assert_eq!(resolve_index(3, -1).unwrap(), 2);
        assert_eq!(resolve_index(3, -3).unwrap(), 0);
        assert_eq!(resolve_index(3, 0).unwrap(), 0);
        assert_eq!(resolve_index(3, 2).unwrap(), 2);
    }

    #[test]
    fn out_of_range_indices_fail() {
        assert!(matches!(
            resolve_index(3, 3),
            Err(CoreError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(resolve_index(3, -4).is_err());
        assert!(resolve_index(0, -1).is_err());
        assert!(resolve_index(0, 0).is_err());
    }

    #[test]
    fn insert_replaces_and_reports_previous() {
        let mut snap = Snapshot::new();
        assert!(snap.insert("freq", json!(5.1)).is_none());
        assert_eq!(snap.insert("freq", json!(5.2)), Some(json!(5.1)));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.to_value(), json!({"freq": 5.2}));
    }
}
