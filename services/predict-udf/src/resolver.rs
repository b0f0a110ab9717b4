//! Resolves a model name into an executable record by walking the registry.

use crate::bundle::BundleError;
use crate::pipeline::{Pipeline, PipelineLoader};
use crate::registry::{ModelRegistry, RegistryError, BUNDLE_PATH, SIGNATURE_PATH};
use crate::schema::Schema;
use crate::signature::ModelSignature;
use predict_core::PREDICT_METRICS;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no {stage} version registered for model {model}", stage = crate::registry::PRODUCTION_STAGE)]
    NotFound { model: String },
    #[error("can't map type {declared} of input {field}")]
    UnsupportedType { field: String, declared: String },
    #[error("malformed signature: {0}")]
    Signature(String),
    #[error("bundle load failed: {0}")]
    BundleLoad(#[from] BundleError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::NotFound { .. } => "not_found",
            ResolveError::UnsupportedType { .. } => "unsupported_type",
            ResolveError::Signature(_) => "signature",
            ResolveError::BundleLoad(_) => "bundle",
            ResolveError::Registry(_) | ResolveError::Io(_) => "io",
        }
    }
}

/// Any resolution failure, tagged with the model it was for.
#[derive(Debug, Error)]
#[error("can't download model {model}: {source}")]
pub struct ResolutionError {
    pub model: String,
    #[source]
    pub source: ResolveError,
}

/// A model ready to serve. Immutable once built.
pub struct ModelRecord {
    run_id: String,
    pipeline: Box<dyn Pipeline>,
    input_schema: Schema,
    output_column: String,
}

impl ModelRecord {
    pub fn new(run_id: impl Into<String>, pipeline: Box<dyn Pipeline>, input_schema: Schema, output_column: impl Into<String>) -> Self {
        Self { run_id: run_id.into(), pipeline, input_schema, output_column: output_column.into() }
    }

    pub fn run_id(&self) -> &str { &self.run_id }
    pub fn pipeline(&self) -> &dyn Pipeline { self.pipeline.as_ref() }
    pub fn input_schema(&self) -> &Schema { &self.input_schema }
    pub fn output_column(&self) -> &str { &self.output_column }
}

impl fmt::Debug for ModelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRecord")
            .field("run_id", &self.run_id)
            .field("input_schema", &self.input_schema)
            .field("output_column", &self.output_column)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ModelResolver {
    registry: Arc<dyn ModelRegistry>,
    loader: Arc<dyn PipelineLoader>,
}

impl ModelResolver {
    pub fn new(registry: Arc<dyn ModelRegistry>, loader: Arc<dyn PipelineLoader>) -> Self { Self { registry, loader } }

    /// Fetch signature and bundle for the production version of `model`.
    /// No retries: the first failing step aborts.
    #[instrument(skip(self))]
    pub fn resolve(&self, model: &str) -> Result<ModelRecord, ResolutionError> {
        let start = Instant::now();
        let res = self.try_resolve(model);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        PREDICT_METRICS.resolution_latency_ms.observe(elapsed_ms);
        match &res {
            Ok(record) => {
                PREDICT_METRICS.resolutions_total.with_label_values(&["ok"]).inc();
                info!(run_id = record.run_id(), inputs = record.input_schema().len(), output = record.output_column(), elapsed_ms, "model resolved");
            }
            Err(e) => {
                PREDICT_METRICS.resolutions_total.with_label_values(&[e.kind()]).inc();
                warn!(error = %e, kind = e.kind(), elapsed_ms, "model resolution failed");
            }
        }
        res.map_err(|source| ResolutionError { model: model.to_string(), source })
    }

    fn try_resolve(&self, model: &str) -> Result<ModelRecord, ResolveError> {
        let run_id = self.registry.production_run_id(model)?.ok_or_else(|| ResolveError::NotFound { model: model.to_string() })?;
        debug!(%run_id, "production run resolved");

        let signature = ModelSignature::parse(&self.registry.fetch_artifact(&run_id, SIGNATURE_PATH)?)?;
        let input_schema = signature.input_schema()?;
        let output_column = signature.output_column()?.to_string();

        let pipeline = self.load_bundle(&run_id)?;
        Ok(ModelRecord::new(run_id, pipeline, input_schema, output_column))
    }

    /// Download the bundle into a temp file that is removed once loaded.
    fn load_bundle(&self, run_id: &str) -> Result<Box<dyn Pipeline>, ResolveError> {
        let suffix: String = run_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        let mut tmp = tempfile::Builder::new().prefix("mleap").suffix(&suffix).tempfile()?;
        let bytes = self.registry.download_artifact(run_id, BUNDLE_PATH, tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        debug!(path = %tmp.path().display(), bytes, "bundle written");
        Ok(self.loader.load(tmp.path())?)
    }
}
