//! Project loading and graph handlers.

use axum::extract::State;
use axum::Json;

use dysart_engine::Laboratory;

use crate::error::ApiError;
use crate::schema::project::{LoadProjectRequest, ProjectGraphResponse};
use crate::state::AppState;

fn graph_response(lab: &Laboratory) -> Result<ProjectGraphResponse, ApiError> {
    Ok(ProjectGraphResponse {
        project: lab.project_name().map(str::to_string),
        feature_ids: lab.feature_ids().clone(),
        edges: lab.feature_graph(),
        methods: lab.exposed_methods()?,
    })
}

/// Loads one of the configured projects, replacing the current one.
///
/// `POST /project`
pub async fn load_project(
    State(state): State<AppState>,
    Json(req): Json<LoadProjectRequest>,
) -> Result<Json<ProjectGraphResponse>, ApiError> {
    let path = state.project_path(&req.name)?.clone();
    let mut lab = state.lab.lock().await;
    lab.load_project_file(&path)?;
    Ok(Json(graph_response(&lab)?))
}

/// `GET /project/graph`
pub async fn project_graph(
    State(state): State<AppState>,
) -> Result<Json<ProjectGraphResponse>, ApiError> {
    let lab = state.lab.lock().await;
    Ok(Json(graph_response(&lab)?))
}
