//! Core data model for DySART feature graphs.
//!
//! A *feature* is one measurable device property. Features form a directed
//! acyclic graph through role-labelled parent references; a feature's cached
//! results are only trustworthy while it and all of its ancestors are fresh.
//!
//! # Modules
//!
//! - [`id`]: identifier newtypes for features, call records and requests
//! - [`snapshot`]: one recorded set of results per physical re-measurement
//! - [`feature`]: the persisted feature document
//! - [`call_record`]: audit records for update invocations and requests
//! - [`expiration`]: pluggable FRESH/EXPIRED policies
//! - [`graph`]: the in-memory feature graph with parent resolution and cycle checks
//! - [`error`]: [`CoreError`]

pub mod call_record;
pub mod error;
pub mod expiration;
pub mod feature;
pub mod graph;
pub mod id;
pub mod snapshot;

pub use call_record::{CallRecord, CallStatus, RequestRecord, RECORD_ID_LEN};
pub use error::CoreError;
pub use expiration::{
    effective_expired, ExpirationHook, ExpirationInput, ExpirationPolicy, ExpirationStatus,
};
pub use feature::Feature;
pub use graph::{FeatureEdge, FeatureGraph};
pub use id::{CallRecordId, FeatureId, RequestId};
pub use snapshot::Snapshot;
