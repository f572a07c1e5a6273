//! Project loading and graph types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use dysart_core::{FeatureEdge, FeatureId};
use dysart_engine::MethodSpec;

/// `POST /project` body. The name must be one of the configured projects.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadProjectRequest {
    pub name: String,
}

/// `GET /project/graph`, also returned after a successful load.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectGraphResponse {
    pub project: Option<String>,
    /// Client-facing name -> feature id.
    pub feature_ids: IndexMap<String, FeatureId>,
    pub edges: Vec<FeatureEdge>,
    pub methods: IndexMap<String, Vec<MethodSpec>>,
}
