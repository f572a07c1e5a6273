//! In-memory implementation of [`FeatureStore`].
//!
//! [`InMemoryStore`] backs tests and throwaway sessions. It keeps the same
//! semantics as the SQLite backend: sorted feature listing, start-time
//! ordering of call records and immutability of concluded records.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use dysart_core::{CallRecord, CallRecordId, CallStatus, Feature, FeatureId, RequestId, RequestRecord};

use crate::error::StorageError;
use crate::traits::{check_record_rewrite, normalize_prefix, FeatureStore};

/// HashMap/BTreeMap-backed store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    features: BTreeMap<FeatureId, Feature>,
    /// Insertion-ordered so equal start times keep creation order.
    records: IndexMap<CallRecordId, CallRecord>,
    requests: HashMap<RequestId, RequestRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureStore for InMemoryStore {
    fn save_feature(&mut self, feature: &Feature) -> Result<(), StorageError> {
        self.features.insert(feature.id().clone(), feature.clone());
        Ok(())
    }

    fn find_feature(&self, id: &FeatureId) -> Result<Option<Feature>, StorageError> {
        Ok(self.features.get(id).cloned())
    }

    fn list_features(&self) -> Result<Vec<FeatureId>, StorageError> {
        Ok(self.features.keys().cloned().collect())
    }

    fn save_call_record(&mut self, record: &CallRecord) -> Result<(), StorageError> {
        check_record_rewrite(self.records.get(&record.id), record)?;
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_call_record(&self, id: &CallRecordId) -> Result<Option<CallRecord>, StorageError> {
        Ok(self.records.get(id).cloned())
    }

    fn find_records_by_prefix(&self, prefix: &str) -> Result<Vec<CallRecord>, StorageError> {
        let Some(prefix) = normalize_prefix(prefix) else {
            return Ok(Vec::new());
        };
        Ok(self
            .records
            .values()
            .filter(|r| r.id.matches_prefix(&prefix))
            .cloned()
            .collect())
    }

    fn call_records_for(&self, feature: &FeatureId) -> Result<Vec<CallRecord>, StorageError> {
        let mut out: Vec<CallRecord> = self
            .records
            .values()
            .filter(|r| &r.feature == feature)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.start_time);
        Ok(out)
    }

    fn incomplete_records(&self) -> Result<Vec<CallRecord>, StorageError> {
        let mut out: Vec<CallRecord> = self
            .records
            .values()
            .filter(|r| r.status == CallStatus::Started && r.stop_time.is_none())
            .cloned()
            .collect();
        out.sort_by_key(|r| r.start_time);
        Ok(out)
    }

    fn save_request(&mut self, request: &RequestRecord) -> Result<(), StorageError> {
        if self.requests.contains_key(&request.id) {
            return Err(StorageError::IntegrityError {
                reason: format!("request {} already recorded", request.id),
            });
        }
        self.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    fn get_request(&self, id: &RequestId) -> Result<Option<RequestRecord>, StorageError> {
        Ok(self.requests.get(id).cloned())
    }
}
