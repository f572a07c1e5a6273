//! Backend-agnostic checks shared by the store test suites.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use dysart_core::{
    CallRecord, CallRecordId, CallStatus, Feature, FeatureId, RequestRecord, Snapshot,
};

use crate::error::StorageError;
use crate::traits::FeatureStore;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn record_with_id(id: &str, feature: &str, start: i64) -> CallRecord {
    let mut rec = CallRecord::start_at(FeatureId::new(feature), None, t(start));
    rec.id = CallRecordId(id.to_string());
    rec
}

pub fn feature_roundtrip(store: &mut impl FeatureStore) {
    let mut f = Feature::new("qb_rabi", "QubitRabi");
    f.merge_parents([("spec".to_string(), FeatureId::new("qb_spec"))]);
    f.set_setting("drive_power", json!(-20.0));
    let snap: Snapshot = [("fit".to_string(), json!([1.0, 2.0]))].into_iter().collect();
    f.record_result(snap);
    f.set_override(true);

    store.save_feature(&f).unwrap();
    store.save_feature(&Feature::new("qb_spec", "QubitSpectrum")).unwrap();

    let back = store.load_feature(&FeatureId::new("qb_rabi")).unwrap();
    assert_eq!(back, f);
    assert_eq!(
        store.list_features().unwrap(),
        vec![FeatureId::new("qb_rabi"), FeatureId::new("qb_spec")]
    );
    assert!(store.find_feature(&FeatureId::new("nope")).unwrap().is_none());
    assert!(matches!(
        store.load_feature(&FeatureId::new("nope")),
        Err(StorageError::FeatureNotFound(_))
    ));

    // overwrite
    f.set_override(false);
    store.save_feature(&f).unwrap();
    assert!(!store.load_feature(&FeatureId::new("qb_rabi")).unwrap().is_overridden());
}

pub fn prefix_lookup(store: &mut impl FeatureStore) {
    store.save_call_record(&record_with_id("abcd1111", "spec", 0)).unwrap();
    store.save_call_record(&record_with_id("abcd2222", "spec", 1)).unwrap();
    store.save_call_record(&record_with_id("ffee0000", "spec", 2)).unwrap();

    assert!(matches!(
        store.find_record_by_prefix("abcd"),
        Err(StorageError::AmbiguousPrefix { matches: 2, .. })
    ));
    assert!(matches!(
        store.find_record_by_prefix("0000"),
        Err(StorageError::RecordNotFound { .. })
    ));
    assert!(matches!(
        store.find_record_by_prefix("zz"),
        Err(StorageError::RecordNotFound { .. })
    ));
    let one = store.find_record_by_prefix("ABCD1").unwrap();
    assert_eq!(one.id.as_str(), "abcd1111");
    let exact = store.find_record_by_prefix("ffee0000").unwrap();
    assert_eq!(exact.id.as_str(), "ffee0000");
}

pub fn concluded_records_are_immutable(store: &mut impl FeatureStore) {
    let mut rec = CallRecord::start_at(FeatureId::new("spec"), None, t(0));
    store.save_call_record(&rec).unwrap();
    rec.conclude_at(CallStatus::Done, None, t(1)).unwrap();
    store.save_call_record(&rec).unwrap();
    // idempotent re-save is fine
    store.save_call_record(&rec).unwrap();

    let mut tampered = rec.clone();
    tampered.status = CallStatus::Failed;
    assert!(matches!(
        store.save_call_record(&tampered),
        Err(StorageError::IntegrityError { .. })
    ));
    let stored = store.get_call_record(&rec.id).unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Done);
    assert_eq!(stored.stop_time, Some(t(1)));
}

pub fn record_ordering_and_last_succeeded(store: &mut impl FeatureStore) {
    // the failure concludes last but must not count as a measurement
    let mut late = record_with_id("0003", "spec", 30);
    late.conclude_at(CallStatus::Failed, Some("boom".into()), t(60)).unwrap();
    let mut early = record_with_id("0001", "spec", 10);
    early.conclude_at(CallStatus::Done, None, t(50)).unwrap();
    let open = record_with_id("0002", "spec", 20);
    let other = record_with_id("0004", "rabi", 5);
    for r in [&late, &early, &open, &other] {
        store.save_call_record(r).unwrap();
    }

    let spec = FeatureId::new("spec");
    let ids: Vec<String> = store
        .call_records_for(&spec)
        .unwrap()
        .into_iter()
        .map(|r| r.id.0)
        .collect();
    assert_eq!(ids, vec!["0001", "0002", "0003"]);

    let last = store.last_succeeded(&spec).unwrap().unwrap();
    assert_eq!(last.id.as_str(), "0001");
    assert_eq!(store.last_succeeded_time(&spec).unwrap(), Some(t(50)));
    assert!(store.last_succeeded(&FeatureId::new("rabi")).unwrap().is_none());

    let failed = store.get_call_record(&late.id).unwrap().unwrap();
    assert_eq!(failed.info.as_deref(), Some("boom"));
}

pub fn failures_alone_never_succeed(store: &mut impl FeatureStore) {
    let mut failed = record_with_id("aa01", "spec", 0);
    failed.conclude_at(CallStatus::Failed, Some("rig offline".into()), t(1)).unwrap();
    store.save_call_record(&failed).unwrap();
    assert!(store.last_succeeded(&FeatureId::new("spec")).unwrap().is_none());
}

pub fn incomplete_records(store: &mut impl FeatureStore) {
    let mut done = record_with_id("aa", "spec", 0);
    done.conclude_at(CallStatus::Done, None, t(1)).unwrap();
    store.save_call_record(&done).unwrap();
    store.save_call_record(&record_with_id("bb", "rabi", 2)).unwrap();

    let open = store.incomplete_records().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id.as_str(), "bb");
}

pub fn requests(store: &mut impl FeatureStore) {
    let req = RequestRecord::new("/feature", Some("10.0.0.1".into()), json!({"feature": "spec"}));
    store.save_request(&req).unwrap();
    assert_eq!(store.get_request(&req.id).unwrap(), Some(req.clone()));
    assert!(store.save_request(&req).is_err());

    let rec = CallRecord::start(FeatureId::new("spec"), Some(req.id.clone()));
    store.save_call_record(&rec).unwrap();
    let back = store.get_call_record(&rec.id).unwrap().unwrap();
    assert_eq!(back.request, Some(req.id));
}
