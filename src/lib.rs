//! Penguin Species Prediction Service
//!
//! Serves species predictions for penguin measurements from a pre-trained
//! gradient-boosted tree classifier, keeping serving-time feature encoding
//! identical to the columns the model was trained on.

pub mod config;
pub mod error;
pub mod feature_encoder;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{ArtifactLoadError, InferenceError, ServiceError};
pub use feature_encoder::{FeatureEncoder, FeatureVector, FEATURE_NAMES};
pub use models::inference::{InferenceService, Prediction};
pub use types::record::{InputRecord, Island, Sex};
