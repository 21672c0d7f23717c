//! Prediction artifact loading

use crate::config::{ModelConfig, ModelFormat};
use crate::error::{ArtifactLoadError, InferenceError};
use crate::feature_encoder::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::models::classes::ClassVocabulary;
use crate::models::xgboost::XgbClassifier;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A trained classifier, seen only through its decision.
///
/// Implementations must be safe to call from many requests at once.
pub trait Classifier: Send + Sync {
    /// Class index for one encoded record
    fn predict_index(&self, features: &FeatureVector) -> Result<usize, InferenceError>;

    /// Size of the class-index space the classifier predicts into
    fn num_classes(&self) -> usize;

    /// Number of input columns the classifier was trained on
    fn feature_count(&self) -> usize;

    /// Column names recorded at training time, when the format keeps them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Short format name for logs and `/model`
    fn format(&self) -> &'static str;
}

/// Loaded classifier with its provenance
#[derive(Clone)]
pub struct PredictionArtifact {
    classifier: Arc<dyn Classifier>,
    model_path: PathBuf,
    loaded_at: DateTime<Utc>,
}

impl PredictionArtifact {
    /// Wrap an already constructed classifier
    pub fn new(classifier: Arc<dyn Classifier>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            classifier,
            model_path: model_path.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn predict_index(&self, features: &FeatureVector) -> Result<usize, InferenceError> {
        self.classifier.predict_index(features)
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }

    pub fn format(&self) -> &'static str {
        self.classifier.format()
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl std::fmt::Debug for PredictionArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionArtifact")
            .field("format", &self.format())
            .field("model_path", &self.model_path)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Loader for the classifier and its class vocabulary
pub struct ArtifactLoader {
    format: ModelFormat,
    classes_has_header: bool,
}

impl ArtifactLoader {
    /// Create a loader for the given format
    pub fn new(format: ModelFormat) -> Self {
        Self {
            format,
            classes_has_header: true,
        }
    }

    /// Create a loader from model configuration
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            format: config.format,
            classes_has_header: config.classes_has_header,
        }
    }

    /// Set whether the label file starts with a header row
    pub fn with_classes_header(mut self, has_header: bool) -> Self {
        self.classes_has_header = has_header;
        self
    }

    /// Load the classifier and label list, then check they fit together.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        model_path: P,
        classes_path: Q,
    ) -> Result<(PredictionArtifact, ClassVocabulary), ArtifactLoadError> {
        let model_path = model_path.as_ref();
        let classes_path = classes_path.as_ref();

        info!(
            format = self.format.as_str(),
            model = %model_path.display(),
            classes = %classes_path.display(),
            "Loading prediction artifact"
        );

        let classifier = self.load_classifier(model_path)?;
        let vocabulary = ClassVocabulary::load(classes_path, self.classes_has_header)?;

        check_alignment(classifier.as_ref(), &vocabulary)?;

        let artifact = PredictionArtifact::new(classifier, model_path);
        info!(
            format = artifact.format(),
            classes = vocabulary.len(),
            "Prediction artifact ready"
        );
        Ok((artifact, vocabulary))
    }

    fn load_classifier(&self, path: &Path) -> Result<Arc<dyn Classifier>, ArtifactLoadError> {
        match self.format {
            ModelFormat::Xgboost => Ok(Arc::new(XgbClassifier::load(path)?)),
            #[cfg(feature = "onnx")]
            ModelFormat::Onnx => Ok(Arc::new(crate::models::onnx::OnnxClassifier::load(path)?)),
            #[cfg(not(feature = "onnx"))]
            ModelFormat::Onnx => Err(ArtifactLoadError::UnsupportedFormat(
                self.format.as_str().to_string(),
            )),
        }
    }
}

/// Verify what the files let us verify about index and column alignment.
pub fn check_alignment(
    classifier: &dyn Classifier,
    vocabulary: &ClassVocabulary,
) -> Result<(), ArtifactLoadError> {
    if classifier.num_classes() != vocabulary.len() {
        return Err(ArtifactLoadError::ClassCountMismatch {
            model_classes: classifier.num_classes(),
            vocabulary_classes: vocabulary.len(),
        });
    }

    if classifier.feature_count() != FEATURE_COUNT {
        return Err(ArtifactLoadError::FeatureMismatch(format!(
            "model has {} features, serving schema has {}",
            classifier.feature_count(),
            FEATURE_COUNT
        )));
    }

    match classifier.feature_names() {
        Some(names) => {
            if names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
                return Err(ArtifactLoadError::FeatureMismatch(format!(
                    "model columns {:?}, serving columns {:?}",
                    names, FEATURE_NAMES
                )));
            }
        }
        None => {
            warn!("Model does not record feature names; column order is assumed to match");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::xgboost::tests::SPECIES_MODEL;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_species_artifact() {
        let model = write_temp(SPECIES_MODEL);
        let classes = write_temp("0\nAdelie\nChinstrap\nGentoo\n");

        let (artifact, vocabulary) = ArtifactLoader::new(ModelFormat::Xgboost)
            .load(model.path(), classes.path())
            .unwrap();

        assert_eq!(artifact.format(), "xgboost");
        assert_eq!(artifact.num_classes(), 3);
        assert_eq!(vocabulary.get(2), Some("Gentoo"));
    }

    #[test]
    fn test_missing_model_file() {
        let classes = write_temp("0\nAdelie\nChinstrap\nGentoo\n");

        let err = ArtifactLoader::new(ModelFormat::Xgboost)
            .load("/nonexistent/model.json", classes.path())
            .unwrap_err();
        assert!(matches!(err, ArtifactLoadError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/model.json"));
    }

    #[test]
    fn test_malformed_model_file() {
        let model = write_temp("{\"learner\": 12}");
        let classes = write_temp("0\nAdelie\nChinstrap\nGentoo\n");

        let err = ArtifactLoader::new(ModelFormat::Xgboost)
            .load(model.path(), classes.path())
            .unwrap_err();
        assert!(matches!(err, ArtifactLoadError::Malformed { .. }));
    }

    #[test]
    fn test_class_count_mismatch() {
        let model = write_temp(SPECIES_MODEL);
        // header flag off: the stray `0` row becomes a fourth label
        let classes = write_temp("0\nAdelie\nChinstrap\nGentoo\n");

        let err = ArtifactLoader::new(ModelFormat::Xgboost)
            .with_classes_header(false)
            .load(model.path(), classes.path())
            .unwrap_err();
        assert!(matches!(
            err,
            ArtifactLoadError::ClassCountMismatch {
                model_classes: 3,
                vocabulary_classes: 4
            }
        ));
    }

    #[test]
    fn test_feature_order_mismatch() {
        let swapped = SPECIES_MODEL.replace(
            r#""sex_Female", "sex_Male""#,
            r#""sex_Male", "sex_Female""#,
        );
        let model = write_temp(&swapped);
        let classes = write_temp("0\nAdelie\nChinstrap\nGentoo\n");

        let err = ArtifactLoader::new(ModelFormat::Xgboost)
            .load(model.path(), classes.path())
            .unwrap_err();
        assert!(matches!(err, ArtifactLoadError::FeatureMismatch(_)));
    }

    #[test]
    fn test_feature_names_optional() {
        let unnamed = SPECIES_MODEL.replace(r#""feature_names""#, r#""unused_names""#);
        let model = write_temp(&unnamed);
        let classes = write_temp("0\nAdelie\nChinstrap\nGentoo\n");

        assert!(ArtifactLoader::new(ModelFormat::Xgboost)
            .load(model.path(), classes.path())
            .is_ok());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_requires_feature() {
        let model = write_temp("");
        let classes = write_temp("Adelie\n");

        let err = ArtifactLoader::new(ModelFormat::Onnx)
            .load(model.path(), classes.path())
            .unwrap_err();
        assert!(matches!(err, ArtifactLoadError::UnsupportedFormat(_)));
    }
}
