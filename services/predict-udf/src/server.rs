//! HTTP host surface for the prediction callable.

use crate::schema::Param;
use crate::udf::{legacy_params, PredictError, PredictUdf};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

/// Either one typed parameter list or the legacy string/int split.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawPredictRequest")]
pub enum PredictRequest {
    Typed { model: String, params: Vec<Param> },
    Legacy { model: String, string_params: Vec<String>, int_params: Vec<i64> },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPredictRequest {
    model: String,
    params: Option<Vec<Param>>,
    string_params: Option<Vec<String>>,
    int_params: Option<Vec<i64>>,
}

impl TryFrom<RawPredictRequest> for PredictRequest {
    type Error = String;

    fn try_from(raw: RawPredictRequest) -> Result<Self, Self::Error> {
        match (raw.params, raw.string_params, raw.int_params) {
            (Some(params), None, None) => Ok(PredictRequest::Typed { model: raw.model, params }),
            (None, strings, ints) => Ok(PredictRequest::Legacy {
                model: raw.model,
                string_params: strings.unwrap_or_default(),
                int_params: ints.unwrap_or_default(),
            }),
            _ => Err("params cannot be combined with string_params or int_params".to_string()),
        }
    }
}

impl PredictRequest {
    pub fn into_parts(self) -> (String, Vec<Param>) {
        match self {
            PredictRequest::Typed { model, params } => (model, params),
            PredictRequest::Legacy { model, string_params, int_params } => (model, legacy_params(string_params, int_params)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(udf: Arc<PredictUdf>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/live", get(|| async { Json(serde_json::json!({"live": true})) }))
        .route("/ready", get(|| async { Json(serde_json::json!({"ready": predict_core::is_ready()})) }))
        .route("/metrics", get(metrics))
        .with_state(udf)
}

fn status_for(err: &PredictError) -> StatusCode {
    match err.kind() {
        "not_found" => StatusCode::NOT_FOUND,
        "invalid_params" => StatusCode::BAD_REQUEST,
        "io" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn predict(State(udf): State<Arc<PredictUdf>>, Json(req): Json<PredictRequest>) -> Response {
    let (model, params) = req.into_parts();
    let res = tokio::task::spawn_blocking(move || {
        let res = udf.predict(&model, &params);
        if let Err(e) = &res {
            warn!(model = %model, kind = e.kind(), error = %e, "prediction failed");
        }
        res
    })
    .await;
    match res {
        Ok(Ok(prediction)) => Json(PredictResponse { prediction: Some(prediction), error: None }).into_response(),
        Ok(Err(e)) => (status_for(&e), Json(PredictResponse { prediction: None, error: Some(e.to_string()) })).into_response(),
        Err(join) => {
            error!(error = %join, "prediction task aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(PredictResponse { prediction: None, error: Some("prediction task aborted".into()) })).into_response()
        }
    }
}

async fn metrics() -> Response {
    match predict_core::gather_metrics() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response(),
    }
}
