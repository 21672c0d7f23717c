//! Response bodies returned by the HTTP surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_species: String,
}

/// Failure body for any non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind (`validation_error`, `model_not_ready`, ...)
    pub error: String,

    /// Human-readable diagnosis: which field, which file
    pub detail: String,

    /// Correlates the response with server-side log lines
    pub request_id: String,
}

/// Liveness and readiness in one body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when ready, `degraded` when the model failed to load
    pub status: String,
    pub ready: bool,
}

/// Description of the loaded artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub format: String,
    pub model_path: String,
    pub classes_path: String,
    pub classes: Vec<String>,
    pub feature_names: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}
