//! Audit record lookup handlers.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiError;
use crate::schema::records::{RecordResponse, RecordsResponse};
use crate::state::AppState;

/// Records left in `STARTED` by an interrupted refresh.
///
/// `GET /records/incomplete`
pub async fn incomplete_records(
    State(state): State<AppState>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let lab = state.lab.lock().await;
    Ok(Json(RecordsResponse {
        records: lab.incomplete_records()?,
    }))
}

/// Looks up one record by id prefix (404 on no match, 409 when ambiguous).
///
/// `GET /records/{prefix}`
pub async fn record_by_prefix(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> Result<Json<RecordResponse>, ApiError> {
    let lab = state.lab.lock().await;
    Ok(Json(RecordResponse {
        record: lab.find_record(&prefix)?,
    }))
}
