//! Shared fixtures: a fraud-scoring bundle, its MLmodel descriptor, an
//! in-memory registry and an HTTP fake of the MLflow endpoints.
#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use predict_udf::registry::{ModelRegistry, RegistryError, BUNDLE_PATH, SIGNATURE_PATH};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const MODEL: &str = "fraud-detector";
pub const RUN_ID: &str = "run123";

pub const MLMODEL: &str = r#"artifact_path: mleap-model
flavors:
  mleap:
    mleap_version: 0.19.0
    model_data: mleap/model
run_id: run123
signature:
  inputs: '[{"name": "country", "type": "string"}, {"name": "amount", "type": "integer"}]'
  outputs: '[{"name": "risk", "type": "string"}]'
"#;

fn node(name: &str, model: serde_json::Value, inputs: serde_json::Value, outputs: serde_json::Value) -> Vec<(String, String)> {
    vec![
        (format!("root/{name}.node/model.json"), model.to_string()),
        (format!("root/{name}.node/node.json"), json!({"name": name, "shape": {"inputs": inputs, "outputs": outputs}}).to_string()),
    ]
}

/// country -> index, [country_idx, amount] -> features, tree on amount
/// (<= 50 is "low", above is "high").
pub fn fraud_bundle() -> Vec<u8> {
    let mut entries = vec![
        ("bundle.json".to_string(), json!({"uid": "b-1", "name": "fraud_pipeline", "format": "json", "version": "0.19.0"}).to_string()),
        ("root/model.json".to_string(), json!({"op": "pipeline", "attributes": {"nodes": {"type": "list", "string": ["idx", "assembler", "tree", "labels"]}}}).to_string()),
    ];
    entries.extend(node(
        "idx",
        json!({"op": "string_indexer", "attributes": {"labels_array_0": {"type": "list", "string": ["US", "PL"]}, "handle_invalid": {"string": "keep"}}}),
        json!([{"name": "country", "port": "input"}]),
        json!([{"name": "country_idx", "port": "output"}]),
    ));
    entries.extend(node(
        "assembler",
        json!({"op": "vector_assembler", "attributes": {}}),
        json!([{"name": "country_idx", "port": "input0"}, {"name": "amount", "port": "input1"}]),
        json!([{"name": "features", "port": "output"}]),
    ));
    entries.extend(node(
        "tree",
        json!({"op": "decision_tree_classifier", "attributes": {"num_features": {"long": 2}, "num_classes": {"long": 2}}}),
        json!([{"name": "features", "port": "features"}]),
        json!([{"name": "prediction", "port": "prediction"}, {"name": "probability", "port": "probability"}]),
    ));
    entries.push((
        "root/tree.node/tree.json".to_string(),
        json!([
            {"internal": {"split": {"continuous": {"feature": 1, "threshold": 50.0}}}},
            {"leaf": {"values": [1.0, 0.0]}},
            {"leaf": {"values": [0.0, 1.0]}}
        ])
        .to_string(),
    ));
    entries.extend(node(
        "labels",
        json!({"op": "index_to_string", "attributes": {"labels": {"type": "list", "string": ["low", "high"]}}}),
        json!([{"name": "prediction", "port": "input"}]),
        json!([{"name": "risk", "port": "output"}]),
    ));

    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in &entries {
        w.start_file(name.as_str(), zip::write::FileOptions::default()).unwrap();
        w.write_all(body.as_bytes()).unwrap();
    }
    w.finish().unwrap().into_inner()
}

/// Artifacts keyed by (run id, path), models mapped to production run ids.
#[derive(Clone, Default)]
pub struct Artifacts {
    pub production: HashMap<String, String>,
    pub files: HashMap<(String, String), Vec<u8>>,
}

impl Artifacts {
    pub fn fraud() -> Self {
        let mut a = Artifacts::default();
        a.production.insert(MODEL.into(), RUN_ID.into());
        a.files.insert((RUN_ID.into(), SIGNATURE_PATH.into()), MLMODEL.as_bytes().to_vec());
        a.files.insert((RUN_ID.into(), BUNDLE_PATH.into()), fraud_bundle());
        a
    }
}

/// Registry double that never touches the network.
#[derive(Default)]
pub struct FakeRegistry {
    pub artifacts: Artifacts,
    pub version_lookups: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(artifacts: Artifacts) -> Self { Self { artifacts, version_lookups: AtomicUsize::new(0) } }
}

impl ModelRegistry for FakeRegistry {
    fn production_run_id(&self, model: &str) -> Result<Option<String>, RegistryError> {
        self.version_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.artifacts.production.get(model).cloned())
    }

    fn download_artifact(&self, run_id: &str, path: &str, sink: &mut dyn Write) -> Result<u64, RegistryError> {
        let body = self
            .artifacts
            .files
            .get(&(run_id.to_string(), path.to_string()))
            .ok_or_else(|| RegistryError::Status { status: 404, url: path.to_string() })?;
        sink.write_all(body)?;
        Ok(body.len() as u64)
    }
}

#[derive(Deserialize)]
struct VersionsQuery {
    name: String,
    stages: String,
}

#[derive(Deserialize)]
struct ArtifactQuery {
    path: String,
    run_uuid: String,
}

struct FakeMlflow {
    artifacts: Artifacts,
    requests: Arc<AtomicUsize>,
}

async fn latest_versions(State(s): State<Arc<FakeMlflow>>, Query(q): Query<VersionsQuery>) -> Response {
    s.requests.fetch_add(1, Ordering::SeqCst);
    match s.artifacts.production.get(&q.name) {
        Some(run_id) if q.stages == "Production" => Json(json!({"model_versions": [
            {"name": q.name, "version": "3", "current_stage": "Production", "run_id": run_id}
        ]}))
        .into_response(),
        Some(_) => Json(json!({})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error_code": "RESOURCE_DOES_NOT_EXIST"}))).into_response(),
    }
}

async fn get_artifact(State(s): State<Arc<FakeMlflow>>, Query(q): Query<ArtifactQuery>) -> Response {
    s.requests.fetch_add(1, Ordering::SeqCst);
    match s.artifacts.files.get(&(q.run_uuid, q.path)) {
        Some(body) => body.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve the MLflow endpoints on a background thread with its own runtime.
/// Returns the base URL and a request counter.
pub fn spawn_registry(artifacts: Artifacts) -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let state = Arc::new(FakeMlflow { artifacts, requests: requests.clone() });
    let app = Router::new()
        .route("/api/2.0/mlflow/registered-models/get-latest-versions", get(latest_versions))
        .route("/get-artifact", get(get_artifact))
        .with_state(state);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    (format!("http://{addr}"), requests)
}
