//! Feature encoding for penguin species model inference.
//!
//! Turns one [`InputRecord`] into the exact column layout the classifier was
//! trained on. Training one-hot encodes `sex` and `island` over the whole
//! dataset, so every dummy column exists there. Expanding a single record
//! only produces the dummy for the value that is present; the encoder
//! reindexes onto [`FEATURE_NAMES`] and fills the rest with zeros.

use crate::error::ServiceError;
use crate::types::record::InputRecord;

/// Number of model input columns
pub const FEATURE_COUNT: usize = 9;

/// Model input columns in training order.
///
/// This is the only place column order is defined; the loader checks model
/// metadata against it and `/model` publishes it for the training side.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "bill_length_mm",
    "bill_depth_mm",
    "flipper_length_mm",
    "body_mass_g",
    "sex_Female",
    "sex_Male",
    "island_Biscoe",
    "island_Dream",
    "island_Torgersen",
];

/// Leading columns copied verbatim from the record
const CONTINUOUS_COUNT: usize = 4;

/// Categorical fields expanded into dummy columns
pub const CATEGORICAL_FAMILIES: [&str; 2] = ["sex", "island"];

/// Dummy column name for a categorical value, e.g. `island_Dream`
pub fn dummy_column(family: &str, label: &str) -> String {
    format!("{}_{}", family, label)
}

/// Canonical numeric representation of one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Slot values in [`FEATURE_NAMES`] order
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Single-precision copy, the width tree ensembles are evaluated in
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Encoder that transforms records into model input features.
///
/// Stateless; one instance is shared by all requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a record into the canonical feature vector.
    ///
    /// Fails with [`ServiceError::SchemaMismatch`] only if the expansion no
    /// longer lines up with [`FEATURE_NAMES`], which means the category
    /// vocabulary and the column list have drifted apart.
    pub fn encode(&self, record: &InputRecord) -> Result<FeatureVector, ServiceError> {
        reindex(&expand(record))
    }
}

/// Per-record expansion: continuous columns plus one dummy per family.
fn expand(record: &InputRecord) -> Vec<(String, f64)> {
    let mut columns: Vec<(String, f64)> = record
        .measurements()
        .iter()
        .map(|&(name, value)| (name.to_string(), value))
        .collect();

    columns.push((dummy_column("sex", record.sex.column_label()), 1.0));
    columns.push((dummy_column("island", record.island.column_label()), 1.0));

    columns
}

/// Place expanded columns into canonical slots, zero-filling absent dummies.
pub(crate) fn reindex(columns: &[(String, f64)]) -> Result<FeatureVector, ServiceError> {
    let mut values = [0.0; FEATURE_COUNT];
    let mut present = [false; FEATURE_COUNT];
    let mut unexpected = Vec::new();

    for (name, value) in columns {
        match FEATURE_NAMES.iter().position(|n| n == name) {
            Some(slot) => {
                values[slot] = *value;
                present[slot] = true;
            }
            None => unexpected.push(name.clone()),
        }
    }

    if !unexpected.is_empty() {
        return Err(ServiceError::SchemaMismatch(format!(
            "unexpected columns {:?}",
            unexpected
        )));
    }

    let missing: Vec<&str> = FEATURE_NAMES[..CONTINUOUS_COUNT]
        .iter()
        .zip(&present)
        .filter(|(_, &seen)| !seen)
        .map(|(&name, _)| name)
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::SchemaMismatch(format!(
            "missing columns {:?}",
            missing
        )));
    }

    // Exactly one hot slot per family
    for family in CATEGORICAL_FAMILIES {
        let prefix = format!("{}_", family);
        let hot = FEATURE_NAMES
            .iter()
            .zip(&values)
            .filter(|(name, _)| name.starts_with(&prefix))
            .filter(|(_, &v)| v == 1.0)
            .count();
        if hot != 1 {
            return Err(ServiceError::SchemaMismatch(format!(
                "{} one-hot slots set for '{}'",
                hot, family
            )));
        }
    }

    Ok(FeatureVector { values })
}
