//! Error types for the SDCA gateway and solver

use thiserror::Error;

/// Input rejected before the solver is invoked
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("dataset batch is empty")]
    EmptyBatch,

    #[error("num_classes must be at least 2, got {0}")]
    TooFewClasses(usize),

    #[error("training dataset has no observations")]
    EmptyTrainingSet,

    #[error(
        "dataset {dataset}: label vector length {labels} does not match \
         feature matrix observation count {observations}"
    )]
    LengthMismatch {
        dataset: usize,
        labels: usize,
        observations: usize,
    },

    #[error(
        "dataset {dataset}: label {label} at observation {observation} \
         is outside [0, {num_classes})"
    )]
    LabelOutOfRange {
        dataset: usize,
        observation: usize,
        label: i32,
        num_classes: usize,
    },

    #[error("dataset {dataset}: expected {expected} features, got {actual}")]
    FeatureMismatch {
        dataset: usize,
        expected: usize,
        actual: usize,
    },

    #[error("dataset {dataset}: non-finite value at feature {feature}, observation {observation}")]
    NonFiniteFeature {
        dataset: usize,
        feature: usize,
        observation: usize,
    },

    #[error("k must be in [1, num_classes = {num_classes}], got {k}")]
    KOutOfRange { k: usize, num_classes: usize },

    #[error("C must be strictly positive and finite, got {0}")]
    NonPositiveC(f64),

    #[error("observation has {actual} features, the model expects {expected}")]
    ObservationWidth { expected: usize, actual: usize },

    #[error("feature buffer has {actual} elements, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum SdcaError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Solver failed: {0}")]
    SolverFailure(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SdcaError {
    /// Returns the validation error if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            SdcaError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SdcaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message() {
        let err: SdcaError = ValidationError::LengthMismatch {
            dataset: 1,
            labels: 3,
            observations: 4,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("dataset 1"));
        assert!(msg.contains("length 3"));
        assert!(msg.contains("count 4"));
    }

    #[test]
    fn test_label_out_of_range_message() {
        let err = ValidationError::LabelOutOfRange {
            dataset: 0,
            observation: 2,
            label: 7,
            num_classes: 3,
        };
        assert_eq!(
            err.to_string(),
            "dataset 0: label 7 at observation 2 is outside [0, 3)"
        );
    }

    #[test]
    fn test_as_validation() {
        let err = SdcaError::SolverFailure("diverged".to_string());
        assert!(err.as_validation().is_none());

        let err: SdcaError = ValidationError::EmptyBatch.into();
        assert_eq!(err.as_validation(), Some(&ValidationError::EmptyBatch));
    }
}
