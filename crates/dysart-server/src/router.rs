//! Router assembly for the DySART HTTP API.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete router with CORS and request tracing.
///
/// Routes use axum 0.8 `/{param}` path syntax. `/records/incomplete` is a
/// static segment and wins over `/records/{prefix}`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/feature", post(handlers::features::invoke))
        .route("/features/{name}", get(handlers::features::get_feature))
        .route(
            "/features/{name}/records",
            get(handlers::features::feature_records),
        )
        .route("/project", post(handlers::project::load_project))
        .route("/project/graph", get(handlers::project::project_graph))
        .route(
            "/records/incomplete",
            get(handlers::records::incomplete_records),
        )
        .route("/records/{prefix}", get(handlers::records::record_by_prefix))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
