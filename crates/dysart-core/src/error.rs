//! Core error types for dysart-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the feature data model: lookups, graph shape and
//! record lifecycle.

use thiserror::Error;

use crate::id::{CallRecordId, FeatureId};

/// Core errors produced by the dysart-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A feature id was not found in the graph.
    #[error("feature not found: {id}")]
    FeatureNotFound { id: FeatureId },

    /// A feature with this id is already registered.
    #[error("duplicate feature id: {id}")]
    DuplicateFeature { id: FeatureId },

    /// A parent reference could not be resolved.
    #[error("parent not found: feature={feature}, role={role}, parent={parent}")]
    ParentNotFound {
        feature: FeatureId,
        role: String,
        parent: FeatureId,
    },

    /// Adding or traversing a parent link would form a cycle.
    #[error("cycle detected at feature {feature}")]
    CycleDetected { feature: FeatureId },

    /// A signed snapshot index fell outside the recorded history.
    #[error("snapshot index {index} out of range ({len} snapshots recorded)")]
    IndexOutOfRange { index: isize, len: usize },

    /// A record already carries a terminal status.
    #[error("call record {id} is already concluded")]
    AlreadyConcluded { id: CallRecordId },

    /// A record cannot be concluded with a non-terminal status.
    #[error("invalid conclusion status: {status}")]
    InvalidConclusion { status: String },
}
