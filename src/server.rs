//! HTTP surface for the prediction service

use crate::error::{InferenceError, ServiceError};
use crate::metrics::{MetricsSnapshot, ServingMetrics};
use crate::models::inference::{InferenceService, ServiceState};
use crate::types::record::InputRecord;
use crate::types::response::{ErrorResponse, HealthResponse, ModelInfo, PredictionResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub metrics: Arc<ServingMetrics>,
}

impl AppState {
    pub fn new(service: Arc<InferenceService>, metrics: Arc<ServingMetrics>) -> Self {
        Self { service, metrics }
    }
}

/// Error paired with the id it was logged under
#[derive(Debug)]
pub struct ApiError {
    error: ServiceError,
    request_id: Uuid,
}

impl ApiError {
    fn new(error: ServiceError, request_id: Uuid) -> Self {
        Self { error, request_id }
    }

    fn status(&self) -> StatusCode {
        match &self.error {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::SchemaMismatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Inference(InferenceError::NotReady(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error.kind().to_string(),
            detail: self.error.caller_detail(),
            request_id: self.request_id.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Build the router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .route("/model", get(model_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn predict_handler(
    State(state): State<AppState>,
    payload: Result<Json<InputRecord>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let start = Instant::now();
    let request_id = Uuid::new_v4();

    let result = match payload {
        Ok(Json(record)) => state.service.predict(&record),
        Err(rejection) => Err(ServiceError::Validation(rejection.body_text())),
    };

    match result {
        Ok(prediction) => {
            state
                .metrics
                .record_prediction(start.elapsed(), &prediction.species);
            Ok(Json(PredictionResponse {
                predicted_species: prediction.species,
            }))
        }
        Err(e) => {
            state.metrics.record_failure(start.elapsed(), e.kind());
            match &e {
                ServiceError::Validation(detail) => {
                    warn!(request_id = %request_id, detail = %detail, "Rejected prediction request")
                }
                _ => error!(request_id = %request_id, error = %e, "Prediction failed"),
            }
            Err(ApiError::new(e, request_id))
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let ready = state.service.is_ready();
    Json(HealthResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        ready,
    })
}

async fn model_handler(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    state.service.model_info().map(Json).ok_or_else(|| {
        let reason = match state.service.state() {
            ServiceState::Uninitialized { reason } => reason.clone(),
            ServiceState::Ready { .. } => String::new(),
        };
        ApiError::new(InferenceError::NotReady(reason).into(), Uuid::new_v4())
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
