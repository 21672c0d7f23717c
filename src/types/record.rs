//! Penguin measurement records and their categorical vocabularies

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sex of the measured penguin.
///
/// Wire values are lowercase; the training dataset spells them capitalized,
/// which is what the one-hot column names use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Every accepted value
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    /// Value as sent by callers
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }

    /// Value as spelled in the training data and its dummy column names
    pub fn column_label(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Island where the penguin was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Island {
    Torgersen,
    Biscoe,
    Dream,
}

impl Island {
    /// Every accepted value
    pub const ALL: [Island; 3] = [Island::Torgersen, Island::Biscoe, Island::Dream];

    pub fn as_str(&self) -> &'static str {
        match self {
            Island::Torgersen => "Torgersen",
            Island::Biscoe => "Biscoe",
            Island::Dream => "Dream",
        }
    }

    /// Island names are spelled the same on the wire and in training data
    pub fn column_label(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Island {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One biometric observation submitted for classification.
///
/// Extra fields in the payload (the dataset's `year`, for instance) are
/// ignored; every field below is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Culmen length in millimetres
    pub bill_length_mm: f64,

    /// Culmen depth in millimetres
    pub bill_depth_mm: f64,

    /// Flipper length in millimetres
    pub flipper_length_mm: f64,

    /// Body mass in grams
    pub body_mass_g: f64,

    pub sex: Sex,

    pub island: Island,
}

impl InputRecord {
    /// Create a record from its six fields
    pub fn new(
        bill_length_mm: f64,
        bill_depth_mm: f64,
        flipper_length_mm: f64,
        body_mass_g: f64,
        sex: Sex,
        island: Island,
    ) -> Self {
        Self {
            bill_length_mm,
            bill_depth_mm,
            flipper_length_mm,
            body_mass_g,
            sex,
            island,
        }
    }

    /// Continuous measurements paired with their column names, in schema order
    pub fn measurements(&self) -> [(&'static str, f64); 4] {
        [
            ("bill_length_mm", self.bill_length_mm),
            ("bill_depth_mm", self.bill_depth_mm),
            ("flipper_length_mm", self.flipper_length_mm),
            ("body_mass_g", self.body_mass_g),
        ]
    }

    /// Check the invariants serde cannot express.
    ///
    /// Categorical fields are already closed enums once deserialized, so only
    /// finiteness of the measurements is left to verify.
    pub fn validate(&self) -> Result<(), ServiceError> {
        for (name, value) in self.measurements() {
            if !value.is_finite() {
                return Err(ServiceError::Validation(format!(
                    "field `{}` must be a finite number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
