//! Feature invocation and inspection types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use dysart_core::{FeatureId, RequestId};
use dysart_engine::MethodSpec;

/// `POST /feature` body: one exposed-method call.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    /// Client-facing feature name or raw feature id.
    pub feature: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvokeResponse {
    pub success: bool,
    pub result: Value,
    /// Request record the call (and any refresh it caused) is filed under.
    pub request: RequestId,
}

/// `GET /features/{name}`.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureResponse {
    pub name: String,
    pub id: FeatureId,
    pub kind: String,
    pub parents: IndexMap<String, FeatureId>,
    pub overridden: bool,
    /// What a refresh would update, ancestors first.
    pub stale: Vec<FeatureId>,
    pub result_count: usize,
    pub settings: IndexMap<String, Value>,
    pub methods: Vec<MethodSpec>,
}
