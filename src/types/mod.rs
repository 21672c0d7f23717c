//! Type definitions for the prediction service

pub mod record;
pub mod response;

pub use record::{InputRecord, Island, Sex};
pub use response::{ErrorResponse, HealthResponse, ModelInfo, PredictionResponse};
