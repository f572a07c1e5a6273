//! Memoized derived accessors.
//!
//! Every public read here refreshes the feature first, then evaluates on a
//! single snapshot. Values computed on a snapshot are written back into it
//! and persisted, so repeated reads without an intervening measurement
//! return the same value from the same raw data.

use serde_json::Value;

use dysart_core::{Feature, FeatureId, RequestId, Snapshot};

use crate::error::EngineError;
use crate::kind::{Derivation, FeatureKind};
use crate::lab::Laboratory;

impl Laboratory {
    /// Refreshes `id`, then evaluates accessor `name` on snapshot `index`
    /// (`-1` is the newest).
    pub async fn accessor(
        &mut self,
        id: &FeatureId,
        name: &str,
        index: isize,
        trigger: Option<&RequestId>,
    ) -> Result<Value, EngineError> {
        self.refresh(id, trigger).await?;
        self.read_accessor(id, name, index)
    }

    /// Evaluates accessor `name` on snapshot `index` without refreshing.
    pub fn read_accessor(&mut self, id: &FeatureId, name: &str, index: isize) -> Result<Value, EngineError> {
        let kind = self.registered_kind(id)?.kind.clone();
        let mut feature = self.graph.feature(id)?.clone();
        let (value, computed) = derive_on(kind.as_ref(), &mut feature, name, index)?;
        if computed {
            self.commit(feature)?;
        }
        Ok(value)
    }

    /// Refreshes `id`, then evaluates every accessor of its kind on one
    /// snapshot and returns that snapshot.
    pub async fn all_results(
        &mut self,
        id: &FeatureId,
        index: isize,
        trigger: Option<&RequestId>,
    ) -> Result<Snapshot, EngineError> {
        self.refresh(id, trigger).await?;
        self.read_all_results(id, index)
    }

    /// Every accessor evaluated on snapshot `index`, without refreshing.
    pub fn read_all_results(&mut self, id: &FeatureId, index: isize) -> Result<Snapshot, EngineError> {
        let kind = self.registered_kind(id)?.kind.clone();
        let mut feature = self.graph.feature(id)?.clone();
        let mut any_computed = false;
        for name in kind.accessors() {
            let (_, computed) = derive_on(kind.as_ref(), &mut feature, name, index)?;
            any_computed |= computed;
        }
        let snapshot = feature.snapshot(index)?.clone();
        if any_computed {
            self.commit(feature)?;
        }
        Ok(snapshot)
    }

    /// Refreshes `id`, then evaluates accessor `name` over every snapshot,
    /// newest first.
    pub async fn results_history(
        &mut self,
        id: &FeatureId,
        name: &str,
        trigger: Option<&RequestId>,
    ) -> Result<Vec<Value>, EngineError> {
        self.refresh(id, trigger).await?;
        self.read_history(id, name)
    }

    pub fn read_history(&mut self, id: &FeatureId, name: &str) -> Result<Vec<Value>, EngineError> {
        let kind = self.registered_kind(id)?.kind.clone();
        let mut feature = self.graph.feature(id)?.clone();
        let len = feature.result_count() as isize;
        let mut history = Vec::with_capacity(feature.result_count());
        let mut any_computed = false;
        for index in (0..len).rev() {
            let (value, computed) = derive_on(kind.as_ref(), &mut feature, name, index)?;
            any_computed |= computed;
            history.push(value);
        }
        if any_computed {
            self.commit(feature)?;
        }
        Ok(history)
    }
}

fn derive_on(
    kind: &dyn FeatureKind,
    feature: &mut Feature,
    name: &str,
    index: isize,
) -> Result<(Value, bool), EngineError> {
    let id = feature.id().clone();
    let mut d = Derivation::new(kind, feature.snapshot_mut(index)?);
    let value = d
        .value(name)
        .map_err(|source| EngineError::Derive { feature: id, source })?;
    Ok((value, d.computed()))
}
