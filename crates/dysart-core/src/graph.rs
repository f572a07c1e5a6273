//! The in-memory feature graph.
//!
//! [`FeatureGraph`] is the shared resolution context for one project: it
//! owns every loaded [`Feature`] keyed by id, together with the
//! [`ExpirationPolicy`] attached to each one at load time. Parent links are
//! stored on the features themselves (child -> parent, keyed by role); the
//! graph resolves them, keeps them acyclic, and exports a petgraph view for
//! ordering and visualization.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::expiration::ExpirationPolicy;
use crate::feature::Feature;
use crate::id::FeatureId;

static DEFAULT_POLICY: ExpirationPolicy = ExpirationPolicy::AlwaysFresh;

/// One role-labelled dependency: `child` depends on `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEdge {
    pub parent: FeatureId,
    pub child: FeatureId,
    pub role: String,
}

/// Features plus their attached expiration policies.
#[derive(Debug, Clone, Default)]
pub struct FeatureGraph {
    features: IndexMap<FeatureId, Feature>,
    policies: HashMap<FeatureId, ExpirationPolicy>,
}

impl FeatureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds a feature. Parent ids are not checked here; call
    /// [`FeatureGraph::validate`] once a batch of features is inserted.
    pub fn insert(&mut self, feature: Feature) -> Result<(), CoreError> {
        if self.features.contains_key(feature.id()) {
            return Err(CoreError::DuplicateFeature {
                id: feature.id().clone(),
            });
        }
        self.features.insert(feature.id().clone(), feature);
        Ok(())
    }

    /// Replaces the stored copy of a feature that is already a member.
    pub fn replace(&mut self, feature: Feature) -> Result<(), CoreError> {
        match self.features.get_mut(feature.id()) {
            Some(slot) => {
                *slot = feature;
                Ok(())
            }
            None => Err(CoreError::FeatureNotFound {
                id: feature.id().clone(),
            }),
        }
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &FeatureId> {
        self.features.keys()
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn feature(&self, id: &FeatureId) -> Result<&Feature, CoreError> {
        self.features
            .get(id)
            .ok_or_else(|| CoreError::FeatureNotFound { id: id.clone() })
    }

    pub fn feature_mut(&mut self, id: &FeatureId) -> Result<&mut Feature, CoreError> {
        self.features
            .get_mut(id)
            .ok_or_else(|| CoreError::FeatureNotFound { id: id.clone() })
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    pub fn set_policy(&mut self, id: &FeatureId, policy: ExpirationPolicy) -> Result<(), CoreError> {
        if !self.contains(id) {
            return Err(CoreError::FeatureNotFound { id: id.clone() });
        }
        self.policies.insert(id.clone(), policy);
        Ok(())
    }

    /// The attached policy, or `AlwaysFresh` when none was attached.
    pub fn policy(&self, id: &FeatureId) -> &ExpirationPolicy {
        self.policies.get(id).unwrap_or(&DEFAULT_POLICY)
    }

    // -----------------------------------------------------------------------
    // Parents
    // -----------------------------------------------------------------------

    /// Resolves a feature's parent ids to live features, keyed by role.
    pub fn parents(&self, id: &FeatureId) -> Result<IndexMap<String, &Feature>, CoreError> {
        let feature = self.feature(id)?;
        feature
            .parent_ids()
            .iter()
            .map(|(role, parent)| {
                self.features
                    .get(parent)
                    .map(|p| (role.clone(), p))
                    .ok_or_else(|| CoreError::ParentNotFound {
                        feature: id.clone(),
                        role: role.clone(),
                        parent: parent.clone(),
                    })
            })
            .collect()
    }

    /// Merges role-keyed parents into a feature, overwriting existing roles.
    ///
    /// Every parent must exist and none may have `id` as an ancestor (or be
    /// `id` itself). Validation happens before any mutation, so on error the
    /// graph is unchanged. Returns the replaced `(role, old parent)` pairs.
    pub fn add_parents(
        &mut self,
        id: &FeatureId,
        parents: IndexMap<String, FeatureId>,
    ) -> Result<Vec<(String, FeatureId)>, CoreError> {
        self.feature(id)?;
        for (role, parent) in &parents {
            if !self.contains(parent) {
                return Err(CoreError::ParentNotFound {
                    feature: id.clone(),
                    role: role.clone(),
                    parent: parent.clone(),
                });
            }
            if parent == id || self.is_ancestor(id, parent) {
                return Err(CoreError::CycleDetected { feature: id.clone() });
            }
        }
        Ok(self.feature_mut(id)?.merge_parents(parents))
    }

    /// True if `candidate` is a transitive parent of `of`.
    pub fn is_ancestor(&self, candidate: &FeatureId, of: &FeatureId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![of];
        while let Some(current) = stack.pop() {
            let Some(feature) = self.features.get(current) else {
                continue;
            };
            for parent in feature.parent_ids().values() {
                if parent == candidate {
                    return true;
                }
                if seen.insert(parent) {
                    stack.push(parent);
                }
            }
        }
        false
    }

    /// Every feature reachable through parent links, nearest first.
    pub fn ancestors(&self, id: &FeatureId) -> Result<Vec<FeatureId>, CoreError> {
        self.feature(id)?;
        let mut order: Vec<FeatureId> = Vec::new();
        let mut seen: HashSet<FeatureId> = HashSet::new();
        let mut cursor = 0;
        let mut frontier = vec![id.clone()];
        while cursor < frontier.len() {
            let current = frontier[cursor].clone();
            cursor += 1;
            for (_, parent) in self.parents(&current)? {
                if parent.id() == id {
                    return Err(CoreError::CycleDetected { feature: id.clone() });
                }
                if seen.insert(parent.id().clone()) {
                    order.push(parent.id().clone());
                    frontier.push(parent.id().clone());
                }
            }
        }
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Whole-graph views
    // -----------------------------------------------------------------------

    /// Role-labelled edge list, in feature insertion then role order.
    pub fn edges(&self) -> Vec<FeatureEdge> {
        self.features
            .values()
            .flat_map(|child| {
                child.parent_ids().iter().map(|(role, parent)| FeatureEdge {
                    parent: parent.clone(),
                    child: child.id().clone(),
                    role: role.clone(),
                })
            })
            .collect()
    }

    /// A petgraph view with edges pointing parent -> child.
    ///
    /// Edges to unknown parents are skipped; use [`FeatureGraph::validate`]
    /// to detect them.
    pub fn to_petgraph(&self) -> (DiGraph<FeatureId, String>, HashMap<FeatureId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for id in self.features.keys() {
            index.insert(id.clone(), graph.add_node(id.clone()));
        }
        for edge in self.edges() {
            if let (Some(&p), Some(&c)) = (index.get(&edge.parent), index.get(&edge.child)) {
                graph.add_edge(p, c, edge.role);
            }
        }
        (graph, index)
    }

    /// All features, ancestors before descendants.
    pub fn topological_order(&self) -> Result<Vec<FeatureId>, CoreError> {
        let (graph, _) = self.to_petgraph();
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|ix| graph[ix].clone()).collect())
            .map_err(|cycle| CoreError::CycleDetected {
                feature: graph[cycle.node_id()].clone(),
            })
    }

    /// Checks that every parent reference resolves and the graph is acyclic.
    pub fn validate(&self) -> Result<(), CoreError> {
        for id in self.features.keys() {
            self.parents(id)?;
        }
        self.topological_order().map(|_| ())
    }

    /// ASCII rendering of a feature and its ancestors.
    pub fn render_tree(&self, id: &FeatureId) -> Result<String, CoreError> {
        let feature = self.feature(id)?;
        let mut out = format!("{} ({})\n", feature.id(), feature.kind());
        self.render_parents(id, "", 0, &mut out)?;
        Ok(out)
    }

    fn render_parents(
        &self,
        id: &FeatureId,
        prefix: &str,
        depth: usize,
        out: &mut String,
    ) -> Result<(), CoreError> {
        if depth > self.features.len() {
            return Err(CoreError::CycleDetected { feature: id.clone() });
        }
        let parents = self.parents(id)?;
        let count = parents.len();
        for (i, (role, parent)) in parents.into_iter().enumerate() {
            let last = i + 1 == count;
            let (branch, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            out.push_str(&format!(
                "{prefix}{branch}{role}: {} ({})\n",
                parent.id(),
                parent.kind()
            ));
            self.render_parents(parent.id(), &format!("{prefix}{indent}"), depth + 1, out)?;
        }
        Ok(())
    }
}
