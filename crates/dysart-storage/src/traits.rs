//! The [`FeatureStore`] trait defining the persistence contract.
//!
//! Three kinds of rows are stored: feature documents (overwritten on every
//! save), call records (inserted when opened, updated exactly once when
//! concluded, never deleted) and request records (insert-only).
//!
//! All backends implement this trait and are swappable without changing
//! engine logic. The trait is synchronous; callers serialize access.

use chrono::{DateTime, Utc};
use dysart_core::{
    CallRecord, CallRecordId, CallStatus, Feature, FeatureId, RequestId, RequestRecord,
};

use crate::error::StorageError;

/// The storage contract for features and their audit trail.
pub trait FeatureStore {
    // -------------------------------------------------------------------
    // Features
    // -------------------------------------------------------------------

    /// Inserts or overwrites a feature document.
    fn save_feature(&mut self, feature: &Feature) -> Result<(), StorageError>;

    /// Loads a feature, or `None` if it was never saved.
    fn find_feature(&self, id: &FeatureId) -> Result<Option<Feature>, StorageError>;

    /// Ids of all stored features, sorted.
    fn list_features(&self) -> Result<Vec<FeatureId>, StorageError>;

    /// Loads a feature that must exist.
    fn load_feature(&self, id: &FeatureId) -> Result<Feature, StorageError> {
        self.find_feature(id)?
            .ok_or_else(|| StorageError::FeatureNotFound(id.clone()))
    }

    // -------------------------------------------------------------------
    // Call records
    // -------------------------------------------------------------------

    /// Inserts a record, or updates it if it is stored but not concluded.
    ///
    /// Rewriting a concluded record is an [`StorageError::IntegrityError`].
    fn save_call_record(&mut self, record: &CallRecord) -> Result<(), StorageError>;

    fn get_call_record(&self, id: &CallRecordId) -> Result<Option<CallRecord>, StorageError>;

    /// All records whose id starts with `prefix`, compared case-insensitively.
    fn find_records_by_prefix(&self, prefix: &str) -> Result<Vec<CallRecord>, StorageError>;

    /// Records for one feature, oldest start time first.
    fn call_records_for(&self, feature: &FeatureId) -> Result<Vec<CallRecord>, StorageError>;

    /// Records still in `STARTED` with no stop time.
    fn incomplete_records(&self) -> Result<Vec<CallRecord>, StorageError>;

    /// Resolves a shortened id to exactly one record.
    ///
    /// Zero matches is [`StorageError::RecordNotFound`]; more than one is
    /// [`StorageError::AmbiguousPrefix`]. Never picks among several matches.
    fn find_record_by_prefix(&self, prefix: &str) -> Result<CallRecord, StorageError> {
        let mut matches = self.find_records_by_prefix(prefix)?;
        match matches.len() {
            0 => Err(StorageError::RecordNotFound {
                prefix: prefix.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            n => Err(StorageError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                matches: n,
            }),
        }
    }

    /// The `DONE` record with the latest stop time. Failed attempts are
    /// skipped, so they never restart a timeout.
    fn last_succeeded(&self, feature: &FeatureId) -> Result<Option<CallRecord>, StorageError> {
        Ok(self
            .call_records_for(feature)?
            .into_iter()
            .filter(|r| r.status == CallStatus::Done && r.stop_time.is_some())
            .max_by_key(|r| r.stop_time))
    }

    /// Shorthand for the stop time of [`FeatureStore::last_succeeded`].
    fn last_succeeded_time(
        &self,
        feature: &FeatureId,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.last_succeeded(feature)?.and_then(|r| r.stop_time))
    }

    // -------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------

    fn save_request(&mut self, request: &RequestRecord) -> Result<(), StorageError>;

    fn get_request(&self, id: &RequestId) -> Result<Option<RequestRecord>, StorageError>;
}

/// Lowercases a record-id prefix, or returns `None` if it contains
/// characters that can never appear in an id.
pub fn normalize_prefix(prefix: &str) -> Option<String> {
    prefix
        .chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| prefix.to_ascii_lowercase())
}

/// Rejects writes that would modify an already concluded record.
pub(crate) fn check_record_rewrite(
    stored: Option<&CallRecord>,
    incoming: &CallRecord,
) -> Result<(), StorageError> {
    match stored {
        Some(existing) if existing.is_concluded() && existing != incoming => {
            Err(StorageError::IntegrityError {
                reason: format!("call record {} is concluded and immutable", incoming.id),
            })
        }
        _ => Ok(()),
    }
}
