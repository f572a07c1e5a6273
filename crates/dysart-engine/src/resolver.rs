//! The staleness resolver.
//!
//! [`expired_ancestors_or_self`] answers "what must be re-measured, and in
//! which order, before this feature can be served?". It only reads graph
//! and store state; consuming override flags is the executor's job.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;

use dysart_core::{effective_expired, CoreError, ExpirationInput, FeatureGraph, FeatureId};
use dysart_storage::FeatureStore;

use crate::error::EngineError;

/// Non-transitive check: override, policy, or no results yet.
pub fn is_expired(
    graph: &FeatureGraph,
    store: &dyn FeatureStore,
    id: &FeatureId,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let feature = graph.feature(id)?;
    let policy = graph.policy(id);
    let last_succeeded = if policy.reads_call_history() {
        store.last_succeeded_time(id)?
    } else {
        None
    };
    let input = ExpirationInput {
        feature,
        last_succeeded,
        now,
    };
    Ok(effective_expired(policy, &input))
}

/// Every feature that must be refreshed before `id` can be served,
/// ancestors first, each exactly once.
///
/// A feature appears iff it is expired itself or has an expired ancestor.
/// When a feature is reachable along several parent paths it keeps the
/// position of its first discovery. Cycles are reported as
/// [`CoreError::CycleDetected`] rather than recursed into.
pub fn expired_ancestors_or_self(
    graph: &FeatureGraph,
    store: &dyn FeatureStore,
    id: &FeatureId,
    now: DateTime<Utc>,
) -> Result<Vec<FeatureId>, EngineError> {
    let mut walk = Walk {
        graph,
        store,
        now,
        on_path: HashSet::new(),
        memo: HashMap::new(),
    };
    Ok(walk.visit(id)?.into_iter().collect())
}

struct Walk<'a> {
    graph: &'a FeatureGraph,
    store: &'a dyn FeatureStore,
    now: DateTime<Utc>,
    on_path: HashSet<FeatureId>,
    memo: HashMap<FeatureId, IndexSet<FeatureId>>,
}

impl Walk<'_> {
    fn visit(&mut self, id: &FeatureId) -> Result<IndexSet<FeatureId>, EngineError> {
        if let Some(done) = self.memo.get(id) {
            return Ok(done.clone());
        }
        if !self.on_path.insert(id.clone()) {
            return Err(CoreError::CycleDetected { feature: id.clone() }.into());
        }

        let parents: Vec<FeatureId> = self
            .graph
            .parents(id)?
            .values()
            .map(|p| p.id().clone())
            .collect();
        let mut merged: IndexSet<FeatureId> = IndexSet::new();
        for parent in &parents {
            for stale in self.visit(parent)? {
                merged.insert(stale);
            }
        }
        if !merged.is_empty() || is_expired(self.graph, self.store, id, self.now)? {
            merged.insert(id.clone());
        }

        self.on_path.remove(id);
        self.memo.insert(id.clone(), merged.clone());
        Ok(merged)
    }
}
