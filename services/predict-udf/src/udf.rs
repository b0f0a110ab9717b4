//! The prediction callable: cache lookup, row binding and pipeline run.

use crate::bundle::BundleLoader;
use crate::cache::ModelCache;
use crate::pipeline::{LeapFrame, TransformError};
use crate::registry::{MlflowRegistry, RegistryError};
use crate::resolver::{ModelResolver, ResolutionError};
use crate::schema::{BindError, Param};
use predict_core::{UdfConfig, PREDICT_METRICS};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("invalid parameters for model {model}: {source}")]
    InvalidParams {
        model: String,
        #[source]
        source: BindError,
    },
    #[error("pipeline for model {model} failed: {source}")]
    Transform {
        model: String,
        #[source]
        source: TransformError,
    },
    #[error("model {model} produced no rows")]
    EmptyResult { model: String },
}

impl PredictError {
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::Resolution(e) => e.source.kind(),
            PredictError::InvalidParams { .. } => "invalid_params",
            PredictError::Transform { .. } => "transform",
            PredictError::EmptyResult { .. } => "empty_result",
        }
    }
}

/// Shared by every invoking thread. Cheap to clone behind an `Arc`.
pub struct PredictUdf {
    cache: Arc<ModelCache>,
    resolver: ModelResolver,
}

impl PredictUdf {
    pub fn new(resolver: ModelResolver, cache: Arc<ModelCache>) -> Self { Self { cache, resolver } }

    /// Wire the MLflow registry client and the zip bundle loader.
    pub fn from_config(cfg: &UdfConfig) -> Result<Self, RegistryError> {
        let registry = MlflowRegistry::new(cfg.registry_url.clone())?;
        let resolver = ModelResolver::new(Arc::new(registry), Arc::new(BundleLoader));
        Ok(Self::new(resolver, Arc::new(ModelCache::new())))
    }

    pub fn cache(&self) -> &Arc<ModelCache> { &self.cache }

    /// Score one row with the production version of `model`. Parameters are
    /// positional against the model's input schema.
    pub fn predict(&self, model: &str, params: &[Param]) -> Result<String, PredictError> {
        let res = self.try_predict(model, params);
        let outcome = match &res {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        PREDICT_METRICS.predictions_total.with_label_values(&[outcome]).inc();
        res
    }

    fn try_predict(&self, model: &str, params: &[Param]) -> Result<String, PredictError> {
        let record = self.cache.get_or_try_insert_with(model, || self.resolver.resolve(model))?;
        let row = record
            .input_schema()
            .bind(params)
            .map_err(|source| PredictError::InvalidParams { model: model.to_string(), source })?;
        let frame = LeapFrame::new(record.input_schema().names(), vec![row]);
        let transform_err = |source| PredictError::Transform { model: model.to_string(), source };
        let out = record.pipeline().transform(frame).map_err(transform_err)?;
        if out.is_empty() {
            return Err(PredictError::EmptyResult { model: model.to_string() });
        }
        let prediction = out.value(0, record.output_column()).map_err(transform_err)?.to_string();
        debug!(model, run_id = record.run_id(), %prediction, "prediction");
        Ok(prediction)
    }

    /// Host-facing form: failures are logged and surface as `None`.
    pub fn predict_or_null(&self, model: &str, params: &[Param]) -> Option<String> {
        match self.predict(model, params) {
            Ok(p) => Some(p),
            Err(e) => {
                error!(model, kind = e.kind(), error = %e, "prediction failed");
                None
            }
        }
    }

    /// Legacy two-list invocation: string params first, then int params.
    pub fn run(&self, model: &str, string_params: Vec<String>, int_params: Vec<i64>) -> Option<String> {
        self.predict_or_null(model, &legacy_params(string_params, int_params))
    }
}

pub fn legacy_params(string_params: Vec<String>, int_params: Vec<i64>) -> Vec<Param> {
    string_params.into_iter().map(Param::Str).chain(int_params.into_iter().map(Param::Int)).collect()
}
