//! End-to-end tests of the HTTP surface over a simulated qubit.

use std::io::Write;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tower::ServiceExt;

use dysart_core::{CallRecord, CallRecordId, FeatureId};
use dysart_engine::Laboratory;
use dysart_server::router::build_router;
use dysart_server::state::AppState;
use dysart_storage::{FeatureStore, InMemoryStore};

const QUBIT: &str = "\
name: qubit
features:
  spec:
    id: qb_spec
    kind: QubitSpectrum
  rabi:
    id: qb_rabi
    kind: QubitRabi
    parents: { spec: qb_spec }
  broken:
    kind: QubitSpectrum
    settings: { inject_fault: fridge warm }
";

async fn request_json(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    request_json(app, Method::POST, path, Some(body)).await
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    request_json(app, Method::GET, path, None).await
}

/// An app with the qubit project registered (not yet loaded).
fn qubit_app() -> (Router, tempfile::NamedTempFile) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(QUBIT.as_bytes()).unwrap();
    let mut projects = IndexMap::new();
    projects.insert("qubit".to_string(), file.path().to_path_buf());
    let state = AppState::from_lab(Laboratory::in_memory(), projects);
    (build_router(state), file)
}

async fn loaded_app() -> (Router, tempfile::NamedTempFile) {
    let (app, file) = qubit_app();
    let (status, body) = post_json(&app, "/project", json!({ "name": "qubit" })).await;
    assert_eq!(status, StatusCode::OK, "load failed: {body:?}");
    (app, file)
}

#[tokio::test]
async fn load_project_and_read_graph() {
    let (app, _file) = loaded_app().await;
    let (status, body) = get_json(&app, "/project/graph").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"], "qubit");
    assert_eq!(body["feature_ids"]["rabi"], "qb_rabi");
    assert_eq!(
        body["edges"],
        json!([{ "parent": "qb_spec", "child": "qb_rabi", "role": "spec" }])
    );
    let methods: Vec<&str> = body["methods"]["rabi"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert!(methods.contains(&"pi_time"));
    assert!(methods.contains(&"tree"));
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let (app, _file) = qubit_app();
    let (status, body) = post_json(&app, "/project", json!({ "name": "nope" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn accessor_call_refreshes_ancestors_once() {
    let (app, _file) = loaded_app().await;
    let (status, body) = post_json(
        &app,
        "/feature",
        json!({ "feature": "rabi", "method": "pi_time" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    assert_eq!(body["success"], true);
    let pi_time = body["result"].as_f64().unwrap();
    assert!((pi_time - 50.0).abs() < 5.0, "pi_time {pi_time}");
    let request = body["request"].as_str().unwrap().to_string();

    for name in ["spec", "rabi"] {
        let (status, body) = get_json(&app, &format!("/features/{name}/records")).await;
        assert_eq!(status, StatusCode::OK);
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1, "{name}: {records:?}");
        assert_eq!(records[0]["status"], "DONE");
        assert_eq!(records[0]["request"], request.as_str());
    }

    let (_, again) = post_json(
        &app,
        "/feature",
        json!({ "feature": "rabi", "method": "pi_time" }),
    )
    .await;
    assert_eq!(again["result"], json!(pi_time));
    let (_, body) = get_json(&app, "/features/rabi/records").await;
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn set_expired_marks_descendants_stale() {
    let (app, _file) = loaded_app().await;
    post_json(&app, "/feature", json!({ "feature": "rabi", "method": "pi_time" })).await;

    let (status, _) = post_json(
        &app,
        "/feature",
        json!({ "feature": "spec", "method": "set_expired", "args": [true] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_json(&app, "/features/rabi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stale"], json!(["qb_spec", "qb_rabi"]));
    assert_eq!(body["result_count"], 1);
    assert_eq!(body["overridden"], false);
}

#[tokio::test]
async fn unexposed_and_unknown_targets() {
    let (app, _file) = loaded_app().await;
    let (status, body) = post_json(
        &app,
        "/feature",
        json!({ "feature": "spec", "method": "update" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = post_json(
        &app,
        "/feature",
        json!({ "feature": "ghost", "method": "tree" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/features/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_index_is_a_bad_request() {
    let (app, _file) = loaded_app().await;
    let (status, body) = post_json(
        &app,
        "/feature",
        json!({ "feature": "spec", "method": "center_freq", "kwargs": { "index": 5 } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body:?}");
}

#[tokio::test]
async fn measurement_failure_is_bad_gateway_and_recorded() {
    let (app, _file) = loaded_app().await;
    let (status, body) = post_json(
        &app,
        "/feature",
        json!({ "feature": "broken", "method": "center_freq" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "MEASUREMENT_FAILED");
    assert_eq!(body["error"]["details"]["feature"], "broken");

    let (_, body) = get_json(&app, "/features/broken/records").await;
    let record = &body["records"][0];
    assert_eq!(record["status"], "FAILED");
    assert!(record["info"].as_str().unwrap().contains("fridge warm"));

    let (_, body) = get_json(&app, "/features/broken").await;
    assert_eq!(body["result_count"], 0);
}

#[tokio::test]
async fn record_prefix_lookup() {
    let mut store = InMemoryStore::new();
    for suffix in ["01", "02", "ff"] {
        let mut record = CallRecord::start(FeatureId::new("qb_spec"), None);
        record.id = CallRecordId(format!("abcd{suffix}{}", "0".repeat(34)));
        store.save_call_record(&record).unwrap();
    }
    let state = AppState::from_lab(Laboratory::with_store(Box::new(store)), IndexMap::new());
    let app = build_router(state);

    let (status, body) = get_json(&app, "/records/ABCDFF").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["record"]["id"].as_str().unwrap().starts_with("abcdff"));

    let (status, body) = get_json(&app, "/records/abcd").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = get_json(&app, "/records/0123").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get_json(&app, "/records/incomplete").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"].as_array().unwrap().len(), 3);
}
