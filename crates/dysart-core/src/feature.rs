//! The persisted feature document.
//!
//! A [`Feature`] carries only data: identity, kind name, role-keyed parent
//! ids, the manual override flag, instrument setting overrides and the
//! ordered result snapshots. Behaviour (update actions, accessors, policies)
//! is attached by the engine through the feature's kind name, so this type
//! serializes cleanly to any backend.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::id::FeatureId;
use crate::snapshot::{resolve_index, Snapshot};

/// One vertex of the measurement dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    id: FeatureId,
    kind: String,
    #[serde(default)]
    parent_ids: IndexMap<String, FeatureId>,
    #[serde(default)]
    expired_override: bool,
    #[serde(default)]
    settings: IndexMap<String, Value>,
    #[serde(default)]
    results: Vec<Snapshot>,
}

impl Feature {
    /// Creates a feature with no parents and no recorded results.
    pub fn new(id: impl Into<FeatureId>, kind: impl Into<String>) -> Self {
        Feature {
            id: id.into(),
            kind: kind.into(),
            parent_ids: IndexMap::new(),
            expired_override: false,
            settings: IndexMap::new(),
            results: Vec::new(),
        }
    }

    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    // -----------------------------------------------------------------------
    // Parents
    // -----------------------------------------------------------------------

    /// Role key -> parent id, in insertion order.
    pub fn parent_ids(&self) -> &IndexMap<String, FeatureId> {
        &self.parent_ids
    }

    pub fn parent_id(&self, role: &str) -> Option<&FeatureId> {
        self.parent_ids.get(role)
    }

    /// Merges parent references, overwriting existing role keys.
    ///
    /// Returns the `(role, previous parent)` pairs that were replaced. This
    /// is the raw document mutation; graph-level validation lives in
    /// [`crate::FeatureGraph::add_parents`].
    pub fn merge_parents(
        &mut self,
        parents: impl IntoIterator<Item = (String, FeatureId)>,
    ) -> Vec<(String, FeatureId)> {
        let mut replaced = Vec::new();
        for (role, parent) in parents {
            if let Some(previous) = self.parent_ids.insert(role.clone(), parent.clone()) {
                if previous != parent {
                    replaced.push((role, previous));
                }
            }
        }
        replaced
    }

    // -----------------------------------------------------------------------
    // Override flag
    // -----------------------------------------------------------------------

    pub fn is_overridden(&self) -> bool {
        self.expired_override
    }

    pub fn set_override(&mut self, expired: bool) {
        self.expired_override = expired;
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Instrument setting overrides applied on the next measurement.
    pub fn settings(&self) -> &IndexMap<String, Value> {
        &self.settings
    }

    pub fn set_setting(&mut self, label: impl Into<String>, value: Value) -> Option<Value> {
        self.settings.insert(label.into(), value)
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    pub fn results(&self) -> &[Snapshot] {
        &self.results
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    /// Appends one snapshot. Only the refresh executor calls this.
    pub fn record_result(&mut self, snapshot: Snapshot) {
        self.results.push(snapshot);
    }

    /// Reads `results[-1][name]`.
    pub fn last_result(&self, name: &str) -> Option<&Value> {
        self.results.last().and_then(|s| s.get(name))
    }

    /// The snapshot at a signed index (`-1` is the newest).
    pub fn snapshot(&self, index: isize) -> Result<&Snapshot, CoreError> {
        let i = resolve_index(self.results.len(), index)?;
        Ok(&self.results[i])
    }

    /// Mutable access for memoizing derived values into an existing snapshot.
    pub fn snapshot_mut(&mut self, index: isize) -> Result<&mut Snapshot, CoreError> {
        let i = resolve_index(self.results.len(), index)?;
        Ok(&mut self.results[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(pairs: &[(&str, Value)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn new_feature_has_no_results() {
        let f = Feature::new("qb_spec", "QubitSpectrum");
        assert_eq!(f.id().as_str(), "qb_spec");
        assert_eq!(f.kind(), "QubitSpectrum");
        assert!(!f.has_results());
        assert!(!f.is_overridden());
        assert!(f.last_result("fit").is_none());
    }

    #[test]
    fn merge_parents_reports_replaced_roles() {
        let mut f = Feature::new("rabi", "QubitRabi");
        let replaced = f.merge_parents([("spec".to_string(), FeatureId::new("a"))]);
        assert!(replaced.is_empty());

        // same target is not a replacement
        let replaced = f.merge_parents([("spec".to_string(), FeatureId::new("a"))]);
        assert!(replaced.is_empty());

        let replaced = f.merge_parents([
            ("spec".to_string(), FeatureId::new("b")),
            ("flux".to_string(), FeatureId::new("c")),
        ]);
        assert_eq!(replaced, vec![("spec".to_string(), FeatureId::new("a"))]);
        assert_eq!(f.parent_id("spec"), Some(&FeatureId::new("b")));
        let roles: Vec<&str> = f.parent_ids().keys().map(String::as_str).collect();
        assert_eq!(roles, vec!["spec", "flux"]);
    }

    #[test]
    fn last_result_reads_newest_snapshot() {
        let mut f = Feature::new("spec", "QubitSpectrum");
        f.record_result(snap(&[("center_freq", json!(5.0))]));
        f.record_result(snap(&[("center_freq", json!(5.1))]));
        assert_eq!(f.result_count(), 2);
        assert_eq!(f.last_result("center_freq"), Some(&json!(5.1)));
        assert_eq!(f.snapshot(0).unwrap().get("center_freq"), Some(&json!(5.0)));
        assert!(f.snapshot(2).is_err());
    }

    #[test]
    fn snapshot_mut_memoizes_in_place() {
        let mut f = Feature::new("spec", "QubitSpectrum");
        f.record_result(Snapshot::new());
        f.snapshot_mut(-1).unwrap().insert("linewidth", json!(0.002));
        assert_eq!(f.last_result("linewidth"), Some(&json!(0.002)));
        assert_eq!(f.result_count(), 1);
    }

    #[test]
    fn serde_roundtrip_preserves_role_order() {
        let mut f = Feature::new("n", "Feature");
        f.merge_parents([
            ("z".to_string(), FeatureId::new("p1")),
            ("a".to_string(), FeatureId::new("p2")),
        ]);
        f.set_override(true);
        f.set_setting("power", json!(-20.0));
        let json = serde_json::to_string(&f).unwrap();
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        let roles: Vec<&str> = back.parent_ids().keys().map(String::as_str).collect();
        assert_eq!(roles, vec!["z", "a"]);
    }
}
