//! Feature kinds: per-type update actions and derived accessors.
//!
//! A [`FeatureKind`] is the only place per-measurement-type behaviour lives.
//! Kinds are registered by name in a [`crate::KindRegistry`]; the name a
//! feature document carries selects its kind at load time.
//!
//! Derived accessors are computed lazily from a snapshot through a
//! [`Derivation`], which memoizes every value it computes back into that
//! snapshot so later reads of the same snapshot never recompute.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use dysart_core::{CallRecord, Feature, FeatureId, Snapshot};

use crate::error::{DeriveError, InstrumentError, UpdateError};
use crate::instrument::{Instrument, MeasurementConfig, RawLog};

/// Bound on nested accessor evaluation within one derivation.
const MAX_DERIVE_DEPTH: usize = 32;

/// Behaviour shared by every feature of one kind.
#[async_trait]
pub trait FeatureKind: Send + Sync {
    /// The registered kind name, as written in project files.
    fn name(&self) -> &str;

    /// Derived accessors exposed by this kind, in display order.
    fn accessors(&self) -> &'static [&'static str] {
        &[]
    }

    /// Runs one physical re-measurement and returns the new snapshot.
    ///
    /// The default is a no-op that still concludes successfully.
    async fn update(&self, _ctx: &UpdateContext) -> Result<Snapshot, UpdateError> {
        Ok(Snapshot::new())
    }

    /// Computes accessor `name` from the snapshot behind `d`.
    fn derive(&self, name: &str, _d: &mut Derivation<'_>) -> Result<Value, DeriveError> {
        Err(DeriveError::UnknownAccessor {
            kind: self.name().to_string(),
            name: name.to_string(),
        })
    }
}

/// Where an exposed method comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodSource {
    Builtin,
    Accessor,
}

/// One remotely callable method of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodSpec {
    pub name: &'static str,
    /// Whether the feature is refreshed before the method runs.
    pub refresh: bool,
    pub source: MethodSource,
}

impl MethodSpec {
    pub const fn builtin(name: &'static str, refresh: bool) -> Self {
        MethodSpec {
            name,
            refresh,
            source: MethodSource::Builtin,
        }
    }

    pub const fn accessor(name: &'static str) -> Self {
        MethodSpec {
            name,
            refresh: true,
            source: MethodSource::Accessor,
        }
    }
}

/// Methods every feature exposes regardless of kind.
pub const BUILTIN_METHODS: &[MethodSpec] = &[
    MethodSpec::builtin("tree", false),
    MethodSpec::builtin("set_expired", false),
    MethodSpec::builtin("call_records", false),
    MethodSpec::builtin("is_expired", false),
    MethodSpec::builtin("parents", false),
    MethodSpec::builtin("diffs", false),
    MethodSpec::builtin("set_value", false),
    MethodSpec::builtin("all_results", true),
    MethodSpec::builtin("results_history", true),
];

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Memoizing evaluator of one kind's accessors over one snapshot.
pub struct Derivation<'a> {
    kind: &'a dyn FeatureKind,
    snapshot: &'a mut Snapshot,
    depth: usize,
    computed: bool,
}

impl<'a> Derivation<'a> {
    pub fn new(kind: &'a dyn FeatureKind, snapshot: &'a mut Snapshot) -> Self {
        Derivation {
            kind,
            snapshot,
            depth: 0,
            computed: false,
        }
    }

    /// Returns the cached value for `name`, computing and storing it first
    /// if this snapshot does not have it yet.
    pub fn value(&mut self, name: &str) -> Result<Value, DeriveError> {
        if let Some(v) = self.snapshot.get(name) {
            return Ok(v.clone());
        }
        if self.depth >= MAX_DERIVE_DEPTH {
            return Err(DeriveError::TooDeep {
                name: name.to_string(),
            });
        }
        let kind = self.kind;
        self.depth += 1;
        let result = kind.derive(name, self);
        self.depth -= 1;
        let value = result?;
        self.snapshot.insert(name, value.clone());
        self.computed = true;
        Ok(value)
    }

    /// A numeric accessor value.
    pub fn number(&mut self, name: &str) -> Result<f64, DeriveError> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| DeriveError::MissingData {
                name: name.to_string(),
            })
    }

    /// A stored trace, such as a raw instrument channel.
    pub fn series(&self, name: &str) -> Result<Vec<f64>, DeriveError> {
        let missing = || DeriveError::MissingData {
            name: name.to_string(),
        };
        self.snapshot
            .get(name)
            .and_then(Value::as_array)
            .ok_or_else(missing)?
            .iter()
            .map(|v| v.as_f64().ok_or_else(missing))
            .collect()
    }

    /// Whether any value was computed (and so the snapshot changed).
    pub fn computed(&self) -> bool {
        self.computed
    }
}

// ---------------------------------------------------------------------------
// Update context
// ---------------------------------------------------------------------------

/// A parent as seen by a child's update action.
#[derive(Clone)]
pub struct ParentView {
    pub feature: Feature,
    pub kind: Arc<dyn FeatureKind>,
}

/// Everything an update action may use. Built by the executor from owned
/// copies, so the action cannot mutate graph state directly.
pub struct UpdateContext {
    feature: Feature,
    parents: IndexMap<String, ParentView>,
    instrument: Arc<dyn Instrument>,
    record: CallRecord,
    /// Newest parent snapshots with any values derived during this update.
    derived: Mutex<IndexMap<FeatureId, Snapshot>>,
}

impl UpdateContext {
    pub fn new(
        feature: Feature,
        parents: IndexMap<String, ParentView>,
        instrument: Arc<dyn Instrument>,
        record: CallRecord,
    ) -> Self {
        UpdateContext {
            feature,
            parents,
            instrument,
            record,
            derived: Mutex::new(IndexMap::new()),
        }
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    /// The open record of this invocation.
    pub fn record(&self) -> &CallRecord {
        &self.record
    }

    /// Runs a measurement. The executor already holds the rig lock.
    pub async fn measure(&self, config: &MeasurementConfig) -> Result<RawLog, InstrumentError> {
        self.instrument.perform_measurement(config).await
    }

    pub fn parent(&self, role: &str) -> Result<&Feature, UpdateError> {
        self.parents
            .get(role)
            .map(|p| &p.feature)
            .ok_or_else(|| UpdateError::MissingParent {
                role: role.to_string(),
            })
    }

    /// Evaluates accessor `name` on the newest snapshot of parent `role`.
    ///
    /// The parent is fresh by the time this runs, since the executor
    /// refreshes ancestors first. Derived values are kept for
    /// [`UpdateContext::into_derived_parents`].
    pub fn parent_value(&self, role: &str, name: &str) -> Result<Value, UpdateError> {
        let parent = self
            .parents
            .get(role)
            .ok_or_else(|| UpdateError::MissingParent {
                role: role.to_string(),
            })?;
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = match derived.entry(parent.feature.id().clone()) {
            indexmap::map::Entry::Occupied(e) => e.into_mut(),
            indexmap::map::Entry::Vacant(e) => {
                let newest = parent
                    .feature
                    .snapshot(-1)
                    .map_err(|_| UpdateError::ParentUnmeasured {
                        role: role.to_string(),
                    })?
                    .clone();
                e.insert(newest)
            }
        };
        Ok(Derivation::new(parent.kind.as_ref(), snapshot).value(name)?)
    }

    /// Parents whose newest snapshot gained derived values, ready to commit.
    pub fn into_derived_parents(self) -> Vec<Feature> {
        let derived = self
            .derived
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::new();
        for (id, snapshot) in derived {
            let Some(view) = self.parents.values().find(|p| p.feature.id() == &id) else {
                continue;
            };
            let mut feature = view.feature.clone();
            match feature.snapshot_mut(-1) {
                Ok(newest) if *newest != snapshot => *newest = snapshot,
                _ => continue,
            }
            out.push(feature);
        }
        out
    }
}
