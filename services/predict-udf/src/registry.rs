//! Model registry access: production version lookup and artifact download.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Write;
use thiserror::Error;
use tracing::debug;

pub const PRODUCTION_STAGE: &str = "Production";
/// Signature descriptor logged with the model.
pub const SIGNATURE_PATH: &str = "mleap-model/MLmodel";
/// Serialized pipeline bundle.
pub const BUNDLE_PATH: &str = "bundle.zip";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only view of a model registry. Calls block the current thread.
pub trait ModelRegistry: Send + Sync {
    /// Run id of the latest `Production` version, `None` when the model has
    /// no such version.
    fn production_run_id(&self, model: &str) -> Result<Option<String>, RegistryError>;

    /// Stream an artifact of `run_id` into `sink`, returning the byte count.
    fn download_artifact(&self, run_id: &str, path: &str, sink: &mut dyn Write) -> Result<u64, RegistryError>;

    fn fetch_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>, RegistryError> {
        let mut buf = Vec::new();
        self.download_artifact(run_id, path, &mut buf)?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub current_stage: Option<String>,
    pub run_id: String,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

/// MLflow tracking server REST client.
#[derive(Debug, Clone)]
pub struct MlflowRegistry {
    base_url: String,
    client: Client,
}

impl MlflowRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RegistryError> {
        Ok(Self::with_client(base_url, Client::builder().build()?))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), client }
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn latest_versions(&self, model: &str) -> Result<Vec<ModelVersion>, RegistryError> {
        let url = format!("{}/api/2.0/mlflow/registered-models/get-latest-versions", self.base_url);
        let resp = self.client.get(&url).query(&[("name", model), ("stages", PRODUCTION_STAGE)]).send()?;
        // unknown registered model
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(RegistryError::Status { status: resp.status().as_u16(), url });
        }
        Ok(resp.json::<LatestVersionsResponse>()?.model_versions)
    }
}

impl ModelRegistry for MlflowRegistry {
    fn production_run_id(&self, model: &str) -> Result<Option<String>, RegistryError> {
        let versions = self.latest_versions(model)?;
        let first = versions.into_iter().next();
        if let Some(v) = &first {
            debug!(model, version = %v.version, run_id = %v.run_id, stage = ?v.current_stage, "production version");
        }
        Ok(first.map(|v| v.run_id))
    }

    fn download_artifact(&self, run_id: &str, path: &str, sink: &mut dyn Write) -> Result<u64, RegistryError> {
        let url = format!("{}/get-artifact", self.base_url);
        let mut resp = self.client.get(&url).query(&[("path", path), ("run_uuid", run_id)]).send()?;
        if !resp.status().is_success() {
            return Err(RegistryError::Status { status: resp.status().as_u16(), url });
        }
        let n = std::io::copy(&mut resp, sink)?;
        debug!(run_id, path, bytes = n, "artifact downloaded");
        Ok(n)
    }
}
