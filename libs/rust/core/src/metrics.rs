//! Prometheus metrics for the model cache and prediction path.
//!
//! All metrics live in the default registry so the host server can expose
//! them with [`gather_metrics`].

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder};

pub struct PredictMetrics {
    /// Labelled `result` = `hit` | `miss`.
    pub cache_lookups_total: IntCounterVec,
    /// Labelled `outcome` = `ok` | `not_found` | `unsupported_type` | `bundle` | `io` | `signature`.
    pub resolutions_total: IntCounterVec,
    pub resolution_latency_ms: Histogram,
    /// Labelled `outcome` = `ok` or the failure kind.
    pub predictions_total: IntCounterVec,
}

pub static PREDICT_METRICS: Lazy<PredictMetrics> = Lazy::new(|| PredictMetrics {
    cache_lookups_total: register_int_counter_vec!(
        "predict_model_cache_lookups_total",
        "Model cache lookups by result",
        &["result"]
    )
    .expect("cache lookup counter registers once"),
    resolutions_total: register_int_counter_vec!(
        "predict_model_resolutions_total",
        "Registry resolutions by outcome",
        &["outcome"]
    )
    .expect("resolution counter registers once"),
    resolution_latency_ms: register_histogram!(
        "predict_model_resolution_latency_ms",
        "Time to resolve and load a model from the registry (ms)",
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .expect("resolution histogram registers once"),
    predictions_total: register_int_counter_vec!(
        "predict_predictions_total",
        "Prediction invocations by outcome",
        &["outcome"]
    )
    .expect("prediction counter registers once"),
});

/// Render the default registry in the Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    Lazy::force(&PREDICT_METRICS);
    let families = prometheus::gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
