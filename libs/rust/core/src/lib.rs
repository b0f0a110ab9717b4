//! Core shared utilities for the prediction UDF: tracing, configuration,
//! metrics and the readiness flag.

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::prelude::*;

pub mod metrics;
pub use metrics::{gather_metrics, PredictMetrics, PREDICT_METRICS};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Legacy variable carrying the registry base URL.
pub const REGISTRY_URL_ENV: &str = "MLFLOW_URL";
pub const CONFIG_FILE_ENV: &str = "PREDICT_CONFIG_FILE";
pub const JSON_LOG_ENV: &str = "PREDICT_JSON_LOG";

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `default_level`; `PREDICT_JSON_LOG=1|true` switches to JSON output. Safe
/// to call more than once.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    let json = std::env::var(JSON_LOG_ENV).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    install_tracing(service, default_level, json)
}

fn install_tracing(service: &str, default_level: &str, json: bool) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "predict_core", service, json, "tracing initialized");
    Ok(())
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct UdfConfig {
    pub service_name: String,
    /// Base URL of the model registry, e.g. `http://mlflow:5000`.
    pub registry_url: String,
    pub listen_port: u16,
    pub log_level: String,
}

/// Load configuration once at startup.
///
/// Sources in increasing precedence: defaults, the file named by
/// `PREDICT_CONFIG_FILE`, `PREDICT__*` environment variables, `MLFLOW_URL`.
pub fn load_config(service: &str) -> Result<UdfConfig> {
    let file = std::env::var(CONFIG_FILE_ENV).ok();
    let registry_url = std::env::var(REGISTRY_URL_ENV).ok().filter(|v| !v.trim().is_empty());
    build_config(service, file.as_deref(), None, registry_url)
}

/// `env` replaces the process environment as the `PREDICT__*` source when set.
fn build_config(service: &str, file: Option<&str>, env: Option<config::Map<String, String>>, registry_url: Option<String>) -> Result<UdfConfig> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("registry_url", "")?
        .set_default("listen_port", 8080)?
        .set_default("log_level", "info")?;
    if let Some(file) = file {
        builder = builder.add_source(config::File::with_name(file).required(false));
    }
    builder = builder
        .add_source(config::Environment::with_prefix("PREDICT").separator("__").try_parsing(true).source(env))
        .set_override_option("registry_url", registry_url)?;
    let cfg: UdfConfig = builder.build()?.try_deserialize()?;
    if cfg.registry_url.trim().is_empty() {
        return Err(anyhow!("registry url not configured (set {REGISTRY_URL_ENV} or PREDICT__REGISTRY_URL)"));
    }
    Ok(UdfConfig { registry_url: cfg.registry_url.trim_end_matches('/').to_string(), ..cfg })
}
