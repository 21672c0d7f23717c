//! Prediction artifact and inference components

pub mod classes;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod xgboost;

pub use classes::ClassVocabulary;
pub use inference::{InferenceService, Prediction, ServiceState};
pub use loader::{ArtifactLoader, Classifier, PredictionArtifact};
pub use xgboost::XgbClassifier;
