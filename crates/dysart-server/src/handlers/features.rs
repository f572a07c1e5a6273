//! Feature invocation and inspection handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::error::ApiError;
use crate::schema::features::{FeatureResponse, InvokeRequest, InvokeResponse};
use crate::schema::records::RecordsResponse;
use crate::state::AppState;

/// Invokes an exposed feature method, refreshing first when the method is
/// refresh-bearing.
///
/// `POST /feature`
pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let remote = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = serde_json::json!({
        "feature": req.feature,
        "method": req.method,
        "args": req.args,
        "kwargs": req.kwargs,
    });

    let mut lab = state.lab.lock().await;
    let request = lab.begin_request("/feature", remote, body)?;
    let result = lab
        .invoke(&req.feature, &req.method, &req.args, &req.kwargs, Some(&request.id))
        .await?;
    Ok(Json(InvokeResponse {
        success: true,
        result,
        request: request.id,
    }))
}

/// Describes one feature without refreshing it.
///
/// `GET /features/{name}`
pub async fn get_feature(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FeatureResponse>, ApiError> {
    let lab = state.lab.lock().await;
    let id = lab.resolve(&name)?;
    let feature = lab.feature(&id)?;
    let methods = lab
        .kinds()
        .get(feature.kind())
        .map(|k| k.methods.clone())
        .unwrap_or_default();
    Ok(Json(FeatureResponse {
        name,
        kind: feature.kind().to_string(),
        parents: feature.parent_ids().clone(),
        overridden: feature.is_overridden(),
        stale: lab.stale_set(&id)?,
        result_count: feature.result_count(),
        settings: feature.settings().clone(),
        methods,
        id,
    }))
}

/// Call records of one feature, oldest first.
///
/// `GET /features/{name}/records`
pub async fn feature_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let lab = state.lab.lock().await;
    let id = lab.resolve(&name)?;
    Ok(Json(RecordsResponse {
        records: lab.call_records(&id)?,
    }))
}
