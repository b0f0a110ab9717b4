//! Loader for zipped pipeline bundles in the JSON serialization layout:
//!
//! ```text
//! bundle.json                     manifest, `format` must be "json"
//! root/model.json                 {"op": "pipeline", "attributes": {"nodes": {"type": "list", "string": [...]}}}
//! root/<stage>.node/model.json    {"op": "<op>", "attributes": {...}}
//! root/<stage>.node/node.json     {"name": "<stage>", "shape": {"inputs": [...], "outputs": [...]}}
//! root/<stage>.node/tree.json     decision tree nodes (tree models only)
//! ```
//! Attribute values are tagged objects such as `{"string": "keep"}`,
//! `{"long": 3}`, `{"boolean": true}` or `{"type": "list", "string": [..]}`.

mod ops;
mod tree;

pub use ops::{HandleInvalid, Stage};
pub use tree::{Split, TreeNode};

use crate::pipeline::{LeapFrame, Pipeline, PipelineLoader, TransformError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bundle entry {0} missing")]
    MissingEntry(String),
    #[error("unsupported bundle format {0}")]
    UnsupportedFormat(String),
    #[error("stage {stage} uses unsupported op {op}")]
    UnsupportedOp { stage: String, op: String },
    #[error("stage {stage} is invalid: {reason}")]
    InvalidStage { stage: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    format: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeModel {
    op: String,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct NodeDescriptor {
    shape: NodeShape,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct NodeShape {
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Port {
    pub name: String,
    pub port: String,
}

impl NodeShape {
    pub fn input_port(&self, port: &str) -> Option<&Port> { self.inputs.iter().find(|p| p.port == port) }
    pub fn output_port(&self, port: &str) -> Option<&Port> { self.outputs.iter().find(|p| p.port == port) }

    pub fn first_input(&self, stage: &str) -> Result<String, BundleError> {
        self.inputs.first().map(|p| p.name.clone()).ok_or_else(|| BundleError::InvalidStage { stage: stage.to_string(), reason: "no input port".into() })
    }

    pub fn first_output(&self, stage: &str) -> Result<String, BundleError> {
        self.outputs.first().map(|p| p.name.clone()).ok_or_else(|| BundleError::InvalidStage { stage: stage.to_string(), reason: "no output port".into() })
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(transparent)]
pub(crate) struct Attributes(HashMap<String, serde_json::Value>);

impl Attributes {
    fn tagged(&self, key: &str, tag: &str) -> Option<&serde_json::Value> { self.0.get(key)?.get(tag) }

    pub fn string(&self, key: &str) -> Option<&str> { self.tagged(key, "string")?.as_str() }
    pub fn long(&self, key: &str) -> Option<i64> { self.tagged(key, "long")?.as_i64() }
    pub fn boolean(&self, key: &str) -> Option<bool> { self.tagged(key, "boolean")?.as_bool() }

    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.tagged(key, "string")?.as_array()?.iter().map(|v| v.as_str().map(str::to_string)).collect()
    }

    pub fn long_list(&self, key: &str) -> Option<Vec<i64>> {
        self.tagged(key, "long")?.as_array()?.iter().map(|v| v.as_i64()).collect()
    }
}

/// Stages applied in bundle order.
#[derive(Debug)]
pub struct BundlePipeline {
    name: String,
    stages: Vec<Stage>,
}

impl BundlePipeline {
    pub fn name(&self) -> &str { &self.name }
    pub fn stages(&self) -> &[Stage] { &self.stages }
}

impl Pipeline for BundlePipeline {
    fn transform(&self, frame: LeapFrame) -> Result<LeapFrame, TransformError> {
        self.stages.iter().try_fold(frame, |frame, stage| stage.apply(frame))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BundleLoader;

impl PipelineLoader for BundleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Pipeline>, BundleError> {
        let file = File::open(path)?;
        Ok(Box::new(read_bundle(file)?))
    }
}

/// Deserialize a bundle from any seekable zip source.
pub fn read_bundle<R: Read + Seek>(reader: R) -> Result<BundlePipeline, BundleError> {
    let mut archive = ZipArchive::new(reader)?;
    let manifest: Manifest = read_json(&mut archive, "bundle.json")?;
    if manifest.format != "json" {
        return Err(BundleError::UnsupportedFormat(manifest.format));
    }
    let root: NodeModel = read_json(&mut archive, "root/model.json")?;
    if root.op != "pipeline" {
        return Err(BundleError::UnsupportedOp { stage: "root".into(), op: root.op });
    }
    let nodes = root.attributes.string_list("nodes").ok_or_else(|| BundleError::MissingEntry("root/model.json#nodes".into()))?;

    let mut stages = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let dir = format!("root/{node}.node");
        let model: NodeModel = read_json(&mut archive, &format!("{dir}/model.json"))?;
        let descriptor: NodeDescriptor = read_json(&mut archive, &format!("{dir}/node.json"))?;
        let tree = if model.op == "decision_tree_classifier" {
            let raw = read_entry(&mut archive, &format!("{dir}/tree.json"))?;
            Some(TreeNode::from_preorder(&raw, node)?)
        } else {
            None
        };
        stages.push(Stage::build(node, &model.op, &model.attributes, &descriptor.shape, tree)?);
    }
    debug!(bundle = %manifest.name, version = ?manifest.version, stages = stages.len(), "bundle deserialized");
    Ok(BundlePipeline { name: manifest.name, stages })
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, BundleError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(BundleError::MissingEntry(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_json<R: Read + Seek, T: DeserializeOwned>(archive: &mut ZipArchive<R>, name: &str) -> Result<T, BundleError> {
    Ok(serde_json::from_slice(&read_entry(archive, name)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;
    use serde_json::json;
    use std::io::{Cursor, Write};

    fn zip(entries: &[(&str, String)]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            w.start_file(*name, zip::write::FileOptions::default()).unwrap();
            w.write_all(body.as_bytes()).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    fn manifest(format: &str) -> (&'static str, String) {
        ("bundle.json", json!({"uid": "b1", "name": "pipeline_test", "format": format, "version": "0.19.0"}).to_string())
    }

    fn root(nodes: &[&str]) -> (&'static str, String) {
        ("root/model.json", json!({"op": "pipeline", "attributes": {"nodes": {"type": "list", "string": nodes}}}).to_string())
    }

    fn indexer_entries() -> Vec<(&'static str, String)> {
        vec![
            ("root/idx.node/model.json", json!({"op": "string_indexer", "attributes": {
                "labels_length": {"long": 1},
                "labels_array_0": {"type": "list", "string": ["PL", "DE", "FR"]},
                "handle_invalid": {"string": "keep"}}}).to_string()),
            ("root/idx.node/node.json", json!({"name": "idx", "shape": {
                "inputs": [{"name": "country", "port": "input"}],
                "outputs": [{"name": "country_idx", "port": "output"}]}}).to_string()),
        ]
    }

    #[test]
    fn loads_and_runs_single_stage() {
        let mut entries = vec![manifest("json"), root(&["idx"])];
        entries.extend(indexer_entries());
        let pipeline = read_bundle(Cursor::new(zip(&entries))).unwrap();
        assert_eq!(pipeline.name(), "pipeline_test");
        assert_eq!(pipeline.stages().len(), 1);

        let frame = LeapFrame::new(vec!["country".into()], vec![vec![Value::Str("FR".into())]]);
        let out = pipeline.transform(frame).unwrap();
        assert_eq!(out.value(0, "country_idx").unwrap(), &Value::Double(2.0));
    }

    #[test]
    fn rejects_protobuf_bundles() {
        let entries = vec![manifest("protobuf"), root(&[])];
        assert!(matches!(read_bundle(Cursor::new(zip(&entries))), Err(BundleError::UnsupportedFormat(f)) if f == "protobuf"));
    }

    #[test]
    fn reports_missing_stage_entries() {
        let entries = vec![manifest("json"), root(&["ghost"])];
        assert!(matches!(read_bundle(Cursor::new(zip(&entries))), Err(BundleError::MissingEntry(e)) if e == "root/ghost.node/model.json"));
    }

    #[test]
    fn rejects_unknown_ops() {
        let entries = vec![
            manifest("json"),
            root(&["lr"]),
            ("root/lr.node/model.json", json!({"op": "logistic_regression", "attributes": {}}).to_string()),
            ("root/lr.node/node.json", json!({"name": "lr", "shape": {"inputs": [], "outputs": []}}).to_string()),
        ];
        assert!(matches!(read_bundle(Cursor::new(zip(&entries))), Err(BundleError::UnsupportedOp { op, .. }) if op == "logistic_regression"));
    }

    #[test]
    fn corrupt_archive_is_a_zip_error() {
        assert!(matches!(read_bundle(Cursor::new(b"not a zip".to_vec())), Err(BundleError::Zip(_))));
    }

    #[test]
    fn loader_reads_from_disk() {
        let mut entries = vec![manifest("json"), root(&["idx"])];
        entries.extend(indexer_entries());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&zip(&entries)).unwrap();
        let pipeline = BundleLoader.load(file.path()).unwrap();
        let frame = LeapFrame::new(vec!["country".into()], vec![vec![Value::Str("PL".into())]]);
        assert_eq!(pipeline.transform(frame).unwrap().value(0, "country_idx").unwrap(), &Value::Double(0.0));
    }
}
