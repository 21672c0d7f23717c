//! Error taxonomy for loading and serving predictions

use std::path::PathBuf;
use thiserror::Error;

/// Failure to bring the prediction artifact up at startup.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    /// File missing or unreadable
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File read but its contents are not a usable artifact
    #[error("malformed artifact {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Label list has no entries
    #[error("class vocabulary {} is empty", .path.display())]
    EmptyVocabulary { path: PathBuf },

    /// Same label listed twice, so index-to-label mapping is ambiguous
    #[error("class vocabulary {} lists '{label}' more than once", .path.display())]
    DuplicateLabel { path: PathBuf, label: String },

    /// Classifier output space does not line up with the label list
    #[error("model predicts {model_classes} classes but vocabulary has {vocabulary_classes} labels")]
    ClassCountMismatch {
        model_classes: usize,
        vocabulary_classes: usize,
    },

    /// Classifier was trained on a different column layout
    #[error("model feature layout does not match serving schema: {0}")]
    FeatureMismatch(String),

    /// Format not compiled into this binary
    #[error("model format '{0}' is not supported by this build")]
    UnsupportedFormat(String),
}

/// Per-request failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input record rejected before encoding
    #[error("validation error: {0}")]
    Validation(String),

    /// Encoder output disagrees with the canonical feature layout
    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Prediction could not be produced
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
}

/// Reasons a validated, encoded record still fails to produce a label.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Artifact never loaded; carries the startup failure
    #[error("model is not loaded: {0}")]
    NotReady(String),

    /// Classifier returned an index with no label
    #[error("predicted class index {index} is outside vocabulary of {len} labels")]
    IndexOutOfRange { index: usize, len: usize },

    /// Classifier backend failed while evaluating
    #[error("classifier evaluation failed: {0}")]
    Backend(String),
}

impl ArtifactLoadError {
    /// Names the file at fault without the underlying I/O or parser text,
    /// which only goes to the server log
    pub fn summary(&self) -> String {
        match self {
            ArtifactLoadError::Io { path, .. } => {
                format!("file {} could not be read", path.display())
            }
            ArtifactLoadError::Malformed { path, .. } => {
                format!("file {} is not a valid model artifact", path.display())
            }
            other => other.to_string(),
        }
    }
}

impl ServiceError {
    /// Short machine-readable kind used in responses and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::SchemaMismatch(_) => "schema_mismatch",
            ServiceError::Inference(InferenceError::NotReady(_)) => "model_not_ready",
            ServiceError::Inference(_) => "inference_error",
        }
    }

    /// Message returned to the caller. Backend failures are reduced to a
    /// fixed sentence; the full error is logged with the request id.
    pub fn caller_detail(&self) -> String {
        match self {
            ServiceError::Inference(InferenceError::Backend(_)) => {
                "inference error: classifier evaluation failed".to_string()
            }
            other => other.to_string(),
        }
    }
}
