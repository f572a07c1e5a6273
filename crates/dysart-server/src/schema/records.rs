//! Audit record responses.

use serde::Serialize;

use dysart_core::CallRecord;

#[derive(Debug, Clone, Serialize)]
pub struct RecordsResponse {
    pub records: Vec<CallRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub record: CallRecord,
}
