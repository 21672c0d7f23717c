//! ONNX Runtime backend for exported classifiers

use crate::error::{ArtifactLoadError, InferenceError};
use crate::feature_encoder::{FeatureVector, FEATURE_COUNT};
use crate::models::loader::Classifier;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Classifier exported to ONNX (e.g. via onnxmltools), run with ONNX Runtime.
pub struct OnnxClassifier {
    /// Running a session needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    label_output: Option<String>,
    probability_output: String,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Load a classifier graph from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        let malformed = |reason: String| ArtifactLoadError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(ArtifactLoadError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "model file not found"),
            });
        }

        let session = build_session(path).map_err(|e| malformed(format!("{:#}", e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| malformed("graph has no inputs".to_string()))?;

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| malformed("graph has no outputs".to_string()))?;

        let mut classifier = Self {
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
            num_classes: 0,
        };

        // Run once with a zero row to learn the width of the output space
        let (_, sample) = classifier
            .run(&[0.0; FEATURE_COUNT], true)
            .map_err(|e| malformed(format!("trial inference failed: {}", e)))?;
        classifier.num_classes = sample.len();

        info!(
            path = %path.display(),
            input = %classifier.input_name,
            probabilities = %classifier.probability_output,
            classes = classifier.num_classes,
            "ONNX model loaded"
        );
        Ok(classifier)
    }

    /// Run the graph on one row, returning the label output (when the graph
    /// has one) and, if asked for, the class probabilities
    fn run(
        &self,
        row: &[f32],
        with_probabilities: bool,
    ) -> Result<(Option<i64>, Vec<f32>), String> {
        let shape = vec![1_i64, row.len() as i64];
        let input = Tensor::from_array((shape, row.to_vec())).map_err(|e| e.to_string())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock error: {}", e))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| e.to_string())?;

        let label = match &self.label_output {
            Some(name) => match outputs.get(name.as_str()) {
                Some(output) => {
                    let (_, data) = output
                        .try_extract_tensor::<i64>()
                        .map_err(|e| e.to_string())?;
                    data.first().copied()
                }
                None => None,
            },
            None => None,
        };

        if !with_probabilities {
            return Ok((label, Vec::new()));
        }

        let output = outputs
            .get(self.probability_output.as_str())
            .ok_or_else(|| format!("missing output '{}'", self.probability_output))?;
        Ok((label, extract_probabilities(output)?))
    }
}

/// Probabilities for the single input row, ordered by class index.
///
/// Plain classifiers emit a float tensor. onnxmltools and skl2onnx exports
/// wrap it in a ZipMap, `seq(map(int64, float))`, unless told not to.
fn extract_probabilities(output: &DynValue) -> Result<Vec<f32>, String> {
    if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
        return Ok(data.to_vec());
    }

    let dtype = output.dtype();
    if !DynSequenceValueType::can_downcast(&dtype) {
        return Err(format!("unsupported probability output type {:?}", dtype));
    }

    let allocator = Allocator::default();
    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| format!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| e.to_string())?;
    let map = maps
        .first()
        .ok_or_else(|| "empty probability sequence".to_string())?;

    let mut pairs: Vec<(i64, f32)> = map
        .try_extract_key_values::<i64, f32>()
        .map_err(|e| e.to_string())?
        .into_iter()
        .collect();
    pairs.sort_by_key(|&(class, _)| class);
    debug!(pairs = ?pairs, "Extracted probabilities from seq(map)");

    Ok(pairs.into_iter().map(|(_, p)| p).collect())
}

fn build_session(path: &Path) -> anyhow::Result<Session> {
    use anyhow::Context;

    ort::init().commit()?;
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .commit_from_file(path)
        .context(format!("Failed to load model from {:?}", path))?;
    Ok(session)
}

impl Classifier for OnnxClassifier {
    fn predict_index(&self, features: &FeatureVector) -> Result<usize, InferenceError> {
        let row = features.to_f32();
        let (label, probabilities) = self
            .run(&row, self.label_output.is_none())
            .map_err(InferenceError::Backend)?;

        if let Some(label) = label {
            return usize::try_from(label)
                .map_err(|_| InferenceError::Backend(format!("negative label {}", label)));
        }

        let index = probabilities
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
            .0;
        debug!(probabilities = ?probabilities, index = index, "ONNX inference complete");
        Ok(index)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    fn format(&self) -> &'static str {
        "onnx"
    }
}
