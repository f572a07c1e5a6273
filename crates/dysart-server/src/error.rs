//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type for all endpoints. It implements
//! `axum::response::IntoResponse` and renders
//! `{"success": false, "error": {"code", "message", "details"?}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use dysart_core::CoreError;
use dysart_engine::{ConfigError, EngineError};
use dysart_storage::StorageError;

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "FORBIDDEN").
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown feature, record or project (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Method not exposed on the feature (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Ambiguous record prefix or conflicting write (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad arguments, bad index, bad project (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The measurement or a pre-hook failed (502).
    #[error("measurement failed: {message}")]
    MeasurementFailed {
        message: String,
        details: serde_json::Value,
    },

    /// Internal server error (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", None),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", None),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            ApiError::MeasurementFailed { details, .. } => (
                StatusCode::BAD_GATEWAY,
                "MEASUREMENT_FAILED",
                Some(details.clone()),
            ),
            ApiError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None)
            }
        };
        let message = match &self {
            ApiError::NotFound(m)
            | ApiError::Forbidden(m)
            | ApiError::Conflict(m)
            | ApiError::BadRequest(m)
            | ApiError::InternalError(m) => m.clone(),
            ApiError::MeasurementFailed { message, .. } => message.clone(),
        };
        let detail = ApiErrorDetail {
            code: code.to_string(),
            message,
            details,
        };

        let body = json!({
            "success": false,
            "error": detail,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::FeatureNotFound { .. } => ApiError::NotFound(err.to_string()),
            CoreError::DuplicateFeature { .. } | CoreError::AlreadyConcluded { .. } => {
                ApiError::Conflict(err.to_string())
            }
            CoreError::ParentNotFound { .. }
            | CoreError::CycleDetected { .. }
            | CoreError::IndexOutOfRange { .. } => ApiError::BadRequest(err.to_string()),
            CoreError::InvalidConclusion { .. } => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::FeatureNotFound(_) | StorageError::RecordNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            StorageError::AmbiguousPrefix { .. } | StorageError::IntegrityError { .. } => {
                ApiError::Conflict(err.to_string())
            }
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match &err {
            ConfigError::UnknownProject(_) => ApiError::NotFound(err.to_string()),
            ConfigError::Io { .. } => ApiError::InternalError(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(e) => e.into(),
            EngineError::Storage(e) => e.into(),
            EngineError::Config(e) => e.into(),
            EngineError::FeatureNotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::Forbidden { .. } => ApiError::Forbidden(err.to_string()),
            EngineError::BadArgument { .. } => ApiError::BadRequest(err.to_string()),
            EngineError::Update { ref feature, .. } => ApiError::MeasurementFailed {
                details: json!({ "feature": feature, "stage": "update" }),
                message: err.to_string(),
            },
            EngineError::PreHook {
                ref feature,
                ref hook,
                ..
            } => ApiError::MeasurementFailed {
                details: json!({ "feature": feature, "stage": "pre_hook", "hook": hook }),
                message: err.to_string(),
            },
            EngineError::Derive { .. } | EngineError::Serialize(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dysart_core::FeatureId;

    fn status(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn engine_errors_map_to_statuses() {
        assert_eq!(
            status(EngineError::FeatureNotFound("ghost".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(EngineError::Forbidden {
                feature: FeatureId::new("spec"),
                method: "update".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(EngineError::Storage(StorageError::AmbiguousPrefix {
                prefix: "ab".into(),
                matches: 2
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(EngineError::Core(CoreError::IndexOutOfRange { index: 3, len: 1 })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(EngineError::Update {
                feature: FeatureId::new("rabi"),
                source: dysart_engine::UpdateError::Failed("rig offline".into()),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(ConfigError::UnknownProject("nope".into())),
            StatusCode::NOT_FOUND
        );
    }
}
