//! Laboratory: the single coordinator between callers and the feature
//! graph, its store, and the instrument.
//!
//! All state changes flow through [`Laboratory`]. The refresh executor,
//! memoized accessors and method dispatch are further `impl Laboratory`
//! blocks in their own modules. Methods that await take `&mut self`; a
//! server shares one laboratory behind a `tokio::sync::Mutex`.

use std::collections::HashMap;

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;

use dysart_core::{
    CallRecord, CoreError, ExpirationPolicy, Feature, FeatureEdge, FeatureGraph, FeatureId,
    RequestRecord,
};
use dysart_storage::{FeatureStore, InMemoryStore};

use crate::error::{ConfigError, EngineError};
use crate::hooks::Attachments;
use crate::instrument::InstrumentHandle;
use crate::kind::MethodSpec;
use crate::registry::{HookRegistry, KindRegistry, RegisteredKind};
use crate::resolver;
use crate::simulator::QubitSimulator;

/// A loaded feature graph plus every collaborator needed to refresh it.
pub struct Laboratory {
    pub(crate) graph: FeatureGraph,
    pub(crate) store: Box<dyn FeatureStore + Send>,
    pub(crate) kinds: KindRegistry,
    pub(crate) hooks: HookRegistry,
    pub(crate) instrument: InstrumentHandle,
    /// Client-facing feature names, in project order.
    pub(crate) names: IndexMap<String, FeatureId>,
    pub(crate) attachments: HashMap<FeatureId, Attachments>,
    pub(crate) project: Option<String>,
}

impl Laboratory {
    pub fn new(
        store: Box<dyn FeatureStore + Send>,
        kinds: KindRegistry,
        hooks: HookRegistry,
        instrument: InstrumentHandle,
    ) -> Self {
        Laboratory {
            graph: FeatureGraph::new(),
            store,
            kinds,
            hooks,
            instrument,
            names: IndexMap::new(),
            attachments: HashMap::new(),
            project: None,
        }
    }

    /// An empty laboratory over an in-memory store and the qubit simulator.
    pub fn in_memory() -> Self {
        Self::with_store(Box::new(InMemoryStore::new()))
    }

    /// Built-in kinds and hooks, the qubit simulator, and the given store.
    pub fn with_store(store: Box<dyn FeatureStore + Send>) -> Self {
        Self::new(
            store,
            KindRegistry::with_lab_kinds(),
            HookRegistry::with_builtins(),
            InstrumentHandle::new(QubitSimulator::default()),
        )
    }

    pub fn graph(&self) -> &FeatureGraph {
        &self.graph
    }

    pub fn store(&self) -> &dyn FeatureStore {
        self.store.as_ref()
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_deref()
    }

    // -----------------------------------------------------------------------
    // Graph construction
    // -----------------------------------------------------------------------

    /// Adds one feature under a client-facing name and persists it.
    ///
    /// The feature's kind must be registered and its parents must already
    /// be loaded.
    pub fn add_feature(
        &mut self,
        name: &str,
        feature: Feature,
        policy: ExpirationPolicy,
        attachments: Attachments,
    ) -> Result<FeatureId, EngineError> {
        if !self.kinds.contains(feature.kind()) {
            return Err(ConfigError::UnknownKind {
                feature: name.to_string(),
                kind: feature.kind().to_string(),
            }
            .into());
        }
        for (role, parent) in feature.parent_ids() {
            if !self.graph.contains(parent) {
                return Err(CoreError::ParentNotFound {
                    feature: feature.id().clone(),
                    role: role.clone(),
                    parent: parent.clone(),
                }
                .into());
            }
        }
        let id = feature.id().clone();
        self.graph.insert(feature)?;
        self.graph.set_policy(&id, policy)?;
        self.store.save_feature(self.graph.feature(&id)?)?;
        self.names.insert(name.to_string(), id.clone());
        self.attachments.insert(id.clone(), attachments);
        tracing::debug!(feature = %id, name, "feature added");
        Ok(id)
    }

    /// Resolves a client-facing name, falling back to a raw feature id.
    pub fn resolve(&self, name_or_id: &str) -> Result<FeatureId, EngineError> {
        if let Some(id) = self.names.get(name_or_id) {
            return Ok(id.clone());
        }
        let id = FeatureId::new(name_or_id);
        if self.graph.contains(&id) {
            Ok(id)
        } else {
            Err(EngineError::FeatureNotFound(name_or_id.to_string()))
        }
    }

    pub fn feature(&self, id: &FeatureId) -> Result<&Feature, EngineError> {
        Ok(self.graph.feature(id)?)
    }

    pub(crate) fn registered_kind(&self, id: &FeatureId) -> Result<&RegisteredKind, EngineError> {
        let feature = self.graph.feature(id)?;
        self.kinds.get(feature.kind()).ok_or_else(|| {
            ConfigError::UnknownKind {
                feature: id.to_string(),
                kind: feature.kind().to_string(),
            }
            .into()
        })
    }

    // -----------------------------------------------------------------------
    // Expiration
    // -----------------------------------------------------------------------

    /// Whether this feature alone is expired (override, policy, no results).
    pub fn is_expired(&self, id: &FeatureId) -> Result<bool, EngineError> {
        resolver::is_expired(&self.graph, self.store.as_ref(), id, Utc::now())
    }

    /// The ordered set of features a refresh of `id` would update.
    pub fn stale_set(&self, id: &FeatureId) -> Result<Vec<FeatureId>, EngineError> {
        resolver::expired_ancestors_or_self(&self.graph, self.store.as_ref(), id, Utc::now())
    }

    /// Sets or clears the manual override flag and persists immediately.
    pub fn set_override(&mut self, id: &FeatureId, expired: bool) -> Result<(), EngineError> {
        let mut updated = self.graph.feature(id)?.clone();
        updated.set_override(expired);
        self.commit(updated)?;
        tracing::info!(feature = %id, expired, "override set");
        Ok(())
    }

    /// Records an instrument setting override; the last measurement no
    /// longer reflects the settings, so the feature is marked expired.
    pub fn set_value(&mut self, id: &FeatureId, label: &str, value: Value) -> Result<(), EngineError> {
        let mut updated = self.graph.feature(id)?.clone();
        updated.set_setting(label, value);
        updated.set_override(true);
        self.commit(updated)?;
        tracing::info!(feature = %id, label, "setting changed");
        Ok(())
    }

    /// Instrument setting overrides of a feature.
    pub fn diffs(&self, id: &FeatureId) -> Result<IndexMap<String, Value>, EngineError> {
        Ok(self.graph.feature(id)?.settings().clone())
    }

    /// Saves a modified copy, then installs it in the graph.
    pub(crate) fn commit(&mut self, feature: Feature) -> Result<(), EngineError> {
        self.store.save_feature(&feature)?;
        self.graph.replace(feature)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Parents
    // -----------------------------------------------------------------------

    /// Merges role-keyed parents (overwriting existing roles) and persists.
    /// The live graph changes only once the save succeeded. Does not
    /// refresh anything.
    pub fn add_parents(
        &mut self,
        id: &FeatureId,
        parents: IndexMap<String, FeatureId>,
    ) -> Result<(), EngineError> {
        let mut staged = self.graph.clone();
        let replaced = staged.add_parents(id, parents)?;
        self.store.save_feature(staged.feature(id)?)?;
        self.graph = staged;
        for (role, previous) in &replaced {
            tracing::info!(feature = %id, role = %role, previous = %previous, "parent role replaced");
        }
        Ok(())
    }

    /// Role -> parent id, resolved against the graph.
    pub fn parents(&self, id: &FeatureId) -> Result<IndexMap<String, FeatureId>, EngineError> {
        Ok(self
            .graph
            .parents(id)?
            .into_iter()
            .map(|(role, f)| (role, f.id().clone()))
            .collect())
    }

    pub fn tree(&self, id: &FeatureId) -> Result<String, EngineError> {
        Ok(self.graph.render_tree(id)?)
    }

    // -----------------------------------------------------------------------
    // Project views
    // -----------------------------------------------------------------------

    /// Role-labelled `(parent, child, role)` edges.
    pub fn feature_graph(&self) -> Vec<FeatureEdge> {
        self.graph.edges()
    }

    /// Client-facing name -> feature id.
    pub fn feature_ids(&self) -> &IndexMap<String, FeatureId> {
        &self.names
    }

    /// Exposed methods of every named feature.
    pub fn exposed_methods(&self) -> Result<IndexMap<String, Vec<MethodSpec>>, EngineError> {
        self.names
            .iter()
            .map(|(name, id)| Ok((name.clone(), self.registered_kind(id)?.methods.clone())))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Audit trail
    // -----------------------------------------------------------------------

    pub fn call_records(&self, id: &FeatureId) -> Result<Vec<CallRecord>, EngineError> {
        self.graph.feature(id)?;
        Ok(self.store.call_records_for(id)?)
    }

    /// Looks up one record by a case-insensitive id prefix.
    pub fn find_record(&self, prefix: &str) -> Result<CallRecord, EngineError> {
        Ok(self.store.find_record_by_prefix(prefix)?)
    }

    /// Records left in `STARTED` by an interrupted refresh. Reported only.
    pub fn incomplete_records(&self) -> Result<Vec<CallRecord>, EngineError> {
        Ok(self.store.incomplete_records()?)
    }

    /// Persists an external request so refreshes can point back at it.
    pub fn begin_request(
        &mut self,
        path: &str,
        remote: Option<String>,
        body: Value,
    ) -> Result<RequestRecord, EngineError> {
        let request = RequestRecord::new(path, remote, body);
        self.store.save_request(&request)?;
        tracing::debug!(request = %request.id, path, "request recorded");
        Ok(request)
    }
}
