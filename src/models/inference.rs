//! Inference service: validate, encode, classify, look up the label

use crate::config::ModelConfig;
use crate::error::{InferenceError, ServiceError};
use crate::feature_encoder::{FeatureEncoder, FEATURE_NAMES};
use crate::models::classes::ClassVocabulary;
use crate::models::loader::{ArtifactLoader, PredictionArtifact};
use crate::types::record::InputRecord;
use crate::types::response::ModelInfo;
use tracing::{debug, error, info};

/// Result of a successful prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Predicted species label
    pub species: String,
    /// Class index the classifier produced
    pub class_index: usize,
}

/// Lifecycle state, fixed when the service is built at startup
#[derive(Debug)]
pub enum ServiceState {
    /// Artifact failed to load; carries the caller-safe reason
    Uninitialized { reason: String },
    /// Artifact and vocabulary loaded and checked
    Ready {
        artifact: PredictionArtifact,
        classes: ClassVocabulary,
        classes_path: String,
    },
}

/// Prediction entry point shared by every request.
///
/// Holds only immutable state, so `predict` can run concurrently without
/// locks.
#[derive(Debug)]
pub struct InferenceService {
    state: ServiceState,
    encoder: FeatureEncoder,
}

impl InferenceService {
    /// Service backed by an already loaded artifact
    pub fn ready(artifact: PredictionArtifact, classes: ClassVocabulary) -> Self {
        Self {
            state: ServiceState::Ready {
                artifact,
                classes,
                classes_path: String::new(),
            },
            encoder: FeatureEncoder::new(),
        }
    }

    /// Service that rejects every prediction with `reason`
    pub fn uninitialized(reason: impl Into<String>) -> Self {
        Self {
            state: ServiceState::Uninitialized {
                reason: reason.into(),
            },
            encoder: FeatureEncoder::new(),
        }
    }

    /// Load the artifact described by `config`.
    ///
    /// A load failure is logged and yields an `Uninitialized` service rather
    /// than an error, so the process still comes up and reports the failure
    /// on each request.
    pub fn start(config: &ModelConfig) -> Self {
        let loader = ArtifactLoader::from_config(config);
        match loader.load(&config.model_path, &config.classes_path) {
            Ok((artifact, classes)) => {
                info!(
                    model = %config.model_path,
                    classes = ?classes.labels(),
                    "Inference service ready"
                );
                Self {
                    state: ServiceState::Ready {
                        artifact,
                        classes,
                        classes_path: config.classes_path.clone(),
                    },
                    encoder: FeatureEncoder::new(),
                }
            }
            Err(e) => {
                error!(
                    model = %config.model_path,
                    classes = %config.classes_path,
                    error = %e,
                    "Failed to load model or target classes; serving without a model"
                );
                Self::uninitialized(e.summary())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ServiceState::Ready { .. })
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Predict the species for one record.
    pub fn predict(&self, record: &InputRecord) -> Result<Prediction, ServiceError> {
        record.validate()?;

        let (artifact, classes) = match &self.state {
            ServiceState::Ready {
                artifact, classes, ..
            } => (artifact, classes),
            ServiceState::Uninitialized { reason } => {
                error!(input = ?record, reason = %reason, "Prediction requested without a model");
                return Err(InferenceError::NotReady(reason.clone()).into());
            }
        };

        let features = self.encoder.encode(record).map_err(|e| {
            error!(input = ?record, error = %e, "Feature encoding drifted from training schema");
            e
        })?;
        debug!(features = ?features.values(), "Record encoded");

        let index = artifact.predict_index(&features).map_err(|e| {
            error!(input = ?record, error = %e, "Classifier evaluation failed");
            ServiceError::from(e)
        })?;

        let species = classes.get(index).ok_or_else(|| {
            error!(
                input = ?record,
                index = index,
                classes = classes.len(),
                "Predicted class index has no label"
            );
            ServiceError::from(InferenceError::IndexOutOfRange {
                index,
                len: classes.len(),
            })
        })?;

        info!(
            input = ?record,
            predicted_species = %species,
            class_index = index,
            "Prediction served"
        );

        Ok(Prediction {
            species: species.to_string(),
            class_index: index,
        })
    }

    /// Description of the loaded artifact, if any
    pub fn model_info(&self) -> Option<ModelInfo> {
        match &self.state {
            ServiceState::Ready {
                artifact,
                classes,
                classes_path,
            } => Some(ModelInfo {
                format: artifact.format().to_string(),
                model_path: artifact.model_path().display().to_string(),
                classes_path: classes_path.clone(),
                classes: classes.labels().to_vec(),
                feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                loaded_at: artifact.loaded_at(),
            }),
            ServiceState::Uninitialized { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_encoder::FeatureVector;
    use crate::models::loader::Classifier;
    use crate::models::xgboost::XgbClassifier;
    use crate::types::record::{Island, Sex};
    use std::sync::Arc;

    /// Classifier that always answers with the same index
    struct FixedClassifier(usize);

    impl Classifier for FixedClassifier {
        fn predict_index(&self, _features: &FeatureVector) -> Result<usize, InferenceError> {
            Ok(self.0)
        }

        fn num_classes(&self) -> usize {
            3
        }

        fn feature_count(&self) -> usize {
            9
        }

        fn format(&self) -> &'static str {
            "fixed"
        }
    }

    fn species() -> ClassVocabulary {
        ClassVocabulary::new(vec![
            "Adelie".to_string(),
            "Chinstrap".to_string(),
            "Gentoo".to_string(),
        ])
    }

    fn service_returning(index: usize) -> InferenceService {
        let artifact = PredictionArtifact::new(Arc::new(FixedClassifier(index)), "fixed");
        InferenceService::ready(artifact, species())
    }

    fn record() -> InputRecord {
        InputRecord::new(39.1, 18.7, 181.0, 3750.0, Sex::Male, Island::Torgersen)
    }

    #[test]
    fn test_index_maps_to_label() {
        let prediction = service_returning(2).predict(&record()).unwrap();
        assert_eq!(prediction.species, "Gentoo");
        assert_eq!(prediction.class_index, 2);
    }

    #[test]
    fn test_index_out_of_range() {
        let err = service_returning(3).predict(&record()).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Inference(InferenceError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_uninitialized_always_fails() {
        let service = InferenceService::uninitialized("model.json: not found");
        assert!(!service.is_ready());
        assert!(service.model_info().is_none());

        for sex in Sex::ALL {
            for island in Island::ALL {
                let record = InputRecord::new(45.0, 15.0, 200.0, 4000.0, sex, island);
                let err = service.predict(&record).unwrap_err();
                assert!(matches!(err, ServiceError::Inference(InferenceError::NotReady(_))));
                assert!(err.to_string().contains("model.json"));
            }
        }
    }

    #[test]
    fn test_validation_runs_before_readiness() {
        let service = InferenceService::uninitialized("not loaded");
        let bad = InputRecord::new(f64::NAN, 18.7, 181.0, 3750.0, Sex::Male, Island::Dream);

        assert!(matches!(
            service.predict(&bad).unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn test_ready_service_labels_every_combination() {
        let model = XgbClassifier::from_json_str(crate::models::xgboost::tests::SPECIES_MODEL)
            .unwrap();
        let artifact = PredictionArtifact::new(Arc::new(model), "model.json");
        let service = InferenceService::ready(artifact, species());

        for sex in Sex::ALL {
            for island in Island::ALL {
                for bill in [35.0, 42.0, 55.0] {
                    let record = InputRecord::new(bill, 17.0, 200.0, 4200.0, sex, island);
                    let prediction = service.predict(&record).unwrap();
                    assert!(species().labels().contains(&prediction.species));
                }
            }
        }
    }

    #[test]
    fn test_model_info_when_ready() {
        let info = service_returning(0).model_info().unwrap();
        assert_eq!(info.format, "fixed");
        assert_eq!(info.classes.len(), 3);
        assert_eq!(info.feature_names.len(), 9);
    }
}
