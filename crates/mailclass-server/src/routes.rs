//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        FromRequest, Request, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info_span, Instrument};

use crate::state::AppState;
use mailclass_core::{PredictRequest, Prediction};

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn readiness(State(state): State<AppState>) -> Response {
    if state.server.is_loaded() {
        (
            StatusCode::OK,
            Json(json!({"status": "ready", "model_loaded": true})),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "loading", "model_loaded": false})),
        )
            .into_response()
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Classify one email
async fn predict(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Prediction>, AppError> {
    let request = read_predict_request(request).await?;

    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("predict", %request_id);

    async move {
        debug!(
            subject_chars = request.subject.chars().count(),
            body_chars = request.body.chars().count(),
            "Received prediction request"
        );

        let start = Instant::now();
        let prediction = state.server.predict(request).await?;
        let elapsed = start.elapsed();

        metrics::counter!("mailclass_predictions_total").increment(1);
        metrics::histogram!("mailclass_prediction_latency_us")
            .record(elapsed.as_micros() as f64);

        debug!(
            predicted_category = %prediction.predicted_category,
            latency_us = elapsed.as_micros() as u64,
            "Prediction served"
        );

        Ok(Json(prediction))
    }
    .instrument(span)
    .await
}

/// Parse the request body.
///
/// A body sent without a `Content-Type` header is read as JSON; any declared
/// content type goes through the `Json` extractor and must be JSON.
async fn read_predict_request(request: Request) -> Result<PredictRequest, AppError> {
    if request.headers().contains_key(header::CONTENT_TYPE) {
        let Json(payload) = Json::<PredictRequest>::from_request(request, &()).await?;
        return Ok(payload);
    }

    let bytes = Bytes::from_request(request, &()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn fallback() -> AppError {
    AppError::NotFound
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    InvalidRequest { status: StatusCode, message: String },

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Prediction(#[from] mailclass_core::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        AppError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        let status = match err.classify() {
            serde_json::error::Category::Data => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_REQUEST,
        };
        AppError::InvalidRequest {
            status,
            message: format!("Failed to deserialize the JSON body: {}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::InvalidRequest { status, message } => {
                metrics::counter!("mailclass_errors_total", "kind" => "invalid_request")
                    .increment(1);
                (status, "invalid_request_error", message)
            }
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "Not found".to_string(),
            ),
            AppError::Prediction(err) => {
                error!("Prediction failed: {}", err);
                metrics::counter!("mailclass_errors_total", "kind" => err.kind()).increment(1);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        });

        (status, Json(body)).into_response()
    }
}
