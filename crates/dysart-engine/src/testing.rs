//! Shared fixtures for engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};

use dysart_core::{
    CallRecord, CallRecordId, CallStatus, ExpirationPolicy, Feature, FeatureId, RequestId,
    RequestRecord, Snapshot,
};
use dysart_storage::{FeatureStore, InMemoryStore, StorageError};

use crate::error::{DeriveError, HookError, InstrumentError, UpdateError};
use crate::hooks::{Attachments, NamedHook, RefreshHook};
use crate::kind::{Derivation, FeatureKind, UpdateContext};
use crate::lab::Laboratory;

pub const COUNTER: &str = "Counter";

/// Counts update and derive calls; can be switched to fail.
#[derive(Clone, Default)]
pub struct Probe {
    pub updates: Arc<AtomicUsize>,
    pub derives: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    /// Feature ids in the order their updates ran.
    pub order: Arc<Mutex<Vec<FeatureId>>>,
}

impl Probe {
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn derives(&self) -> usize {
        self.derives.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn order(&self) -> Vec<FeatureId> {
        self.order.lock().unwrap().clone()
    }
}

/// Test kind: each update stores a sequence number; `doubled` derives from it.
pub struct CounterKind(pub Probe);

#[async_trait]
impl FeatureKind for CounterKind {
    fn name(&self) -> &str {
        COUNTER
    }

    fn accessors(&self) -> &'static [&'static str] {
        &["doubled", "label"]
    }

    async fn update(&self, ctx: &UpdateContext) -> Result<Snapshot, UpdateError> {
        if self.0.fail.load(Ordering::SeqCst) {
            return Err(InstrumentError::Measurement("rig offline".into()).into());
        }
        let n = self.0.updates.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.order.lock().unwrap().push(ctx.feature().id().clone());
        Ok([("value".to_string(), json!(n as f64))].into_iter().collect())
    }

    fn derive(&self, name: &str, d: &mut Derivation<'_>) -> Result<Value, DeriveError> {
        self.0.derives.fetch_add(1, Ordering::SeqCst);
        match name {
            "doubled" => Ok(json!(d.number("value")? * 2.0)),
            "label" => Ok(json!(format!("#{}", d.number("value")?))),
            other => Err(DeriveError::UnknownAccessor {
                kind: COUNTER.into(),
                name: other.into(),
            }),
        }
    }
}

/// Records the status of every record it is called with.
#[derive(Clone, Default)]
pub struct RecordingHook {
    pub seen: Arc<Mutex<Vec<(FeatureId, CallStatus)>>>,
}

#[async_trait]
impl RefreshHook for RecordingHook {
    async fn call(&self, record: &CallRecord) -> Result<(), HookError> {
        self.seen
            .lock()
            .unwrap()
            .push((record.feature.clone(), record.status));
        Ok(())
    }
}

pub struct FailingHook;

#[async_trait]
impl RefreshHook for FailingHook {
    async fn call(&self, _record: &CallRecord) -> Result<(), HookError> {
        Err(HookError("interlock open".into()))
    }
}

pub fn named(name: &str, hook: impl RefreshHook + 'static) -> NamedHook {
    NamedHook {
        name: name.to_string(),
        hook: Arc::new(hook),
    }
}

/// In-memory store whose feature saves fail while `fail_saves` is set.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    pub fail_saves: Arc<AtomicBool>,
}

impl FeatureStore for FlakyStore {
    fn save_feature(&mut self, feature: &Feature) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::IntegrityError {
                reason: "disk full".into(),
            });
        }
        self.inner.save_feature(feature)
    }

    fn find_feature(&self, id: &FeatureId) -> Result<Option<Feature>, StorageError> {
        self.inner.find_feature(id)
    }

    fn list_features(&self) -> Result<Vec<FeatureId>, StorageError> {
        self.inner.list_features()
    }

    fn save_call_record(&mut self, record: &CallRecord) -> Result<(), StorageError> {
        self.inner.save_call_record(record)
    }

    fn get_call_record(&self, id: &CallRecordId) -> Result<Option<CallRecord>, StorageError> {
        self.inner.get_call_record(id)
    }

    fn find_records_by_prefix(&self, prefix: &str) -> Result<Vec<CallRecord>, StorageError> {
        self.inner.find_records_by_prefix(prefix)
    }

    fn call_records_for(&self, feature: &FeatureId) -> Result<Vec<CallRecord>, StorageError> {
        self.inner.call_records_for(feature)
    }

    fn incomplete_records(&self) -> Result<Vec<CallRecord>, StorageError> {
        self.inner.incomplete_records()
    }

    fn save_request(&mut self, request: &RequestRecord) -> Result<(), StorageError> {
        self.inner.save_request(request)
    }

    fn get_request(&self, id: &RequestId) -> Result<Option<RequestRecord>, StorageError> {
        self.inner.get_request(id)
    }
}

/// A counter lab over a [`FlakyStore`]; the flag switches feature saves off.
pub fn flaky_lab() -> (Laboratory, Probe, Arc<AtomicBool>) {
    let probe = Probe::default();
    let store = FlakyStore::default();
    let fail_saves = store.fail_saves.clone();
    let mut lab = Laboratory::with_store(Box::new(store));
    lab.kinds.register(CounterKind(probe.clone()));
    (lab, probe, fail_saves)
}

/// An in-memory lab with the counter kind registered.
pub fn lab() -> (Laboratory, Probe) {
    let probe = Probe::default();
    let mut lab = Laboratory::in_memory();
    lab.kinds.register(CounterKind(probe.clone()));
    (lab, probe)
}

/// Adds a counter feature named after its id.
pub fn add(lab: &mut Laboratory, id: &str, parents: &[(&str, &str)]) -> FeatureId {
    add_with(lab, id, parents, Attachments::default())
}

pub fn add_with(
    lab: &mut Laboratory,
    id: &str,
    parents: &[(&str, &str)],
    attachments: Attachments,
) -> FeatureId {
    let mut feature = Feature::new(id, COUNTER);
    let roles: IndexMap<String, FeatureId> = parents
        .iter()
        .map(|(role, parent)| (role.to_string(), FeatureId::new(*parent)))
        .collect();
    feature.merge_parents(roles);
    lab.add_feature(id, feature, ExpirationPolicy::AlwaysFresh, attachments)
        .unwrap()
}
