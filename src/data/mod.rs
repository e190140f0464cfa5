//! Dense datasets and text-format loaders
//!
//! [`matrix`] holds the in-memory data model handed to the solver gateway.
//! The LibSVM and CSV readers parse text files into a [`DataSource`] which is
//! then densified into a [`Dataset`] with [`LoadOptions`].

pub mod csv;
pub mod libsvm;
pub mod matrix;

pub use self::csv::*;
pub use self::libsvm::*;
pub use self::matrix::*;

use crate::core::{Result, SdcaError};

/// How a text source is turned into a dense dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Force the number of features (test sets must match the training set)
    pub num_features: Option<usize>,
    /// Labels in the file start at 1 rather than 0
    pub one_based_labels: bool,
}

impl LoadOptions {
    pub fn with_num_features(mut self, num_features: usize) -> Self {
        self.num_features = Some(num_features);
        self
    }

    pub fn with_one_based_labels(mut self, one_based: bool) -> Self {
        self.one_based_labels = one_based;
        self
    }

    fn resolve_num_features(&self, dim: usize) -> Result<usize> {
        match self.num_features {
            Some(n) if n < dim => Err(SdcaError::ParseError(format!(
                "data has {dim} features but {n} were requested"
            ))),
            Some(n) => Ok(n),
            None => Ok(dim),
        }
    }

    fn convert_labels(&self, labels: &[i32]) -> Vec<i32> {
        if self.one_based_labels {
            labels.iter().map(|&y| y.saturating_sub(1)).collect()
        } else {
            labels.to_vec()
        }
    }
}

/// Parse a class label written as an integer (`3`, `+3` or `3.0`)
fn parse_label(s: &str) -> Result<i32> {
    if let Ok(label) = s.parse::<i32>() {
        return Ok(label);
    }
    match s.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 => Ok(v as i32),
        _ => Err(SdcaError::ParseError(format!("Invalid label: {s}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("3").unwrap(), 3);
        assert_eq!(parse_label("+2").unwrap(), 2);
        assert_eq!(parse_label("1.0").unwrap(), 1);
        assert!(parse_label("1.5").is_err());
        assert!(parse_label("cat").is_err());
    }

    #[test]
    fn test_load_options() {
        let options = LoadOptions::default().with_one_based_labels(true);
        assert_eq!(options.convert_labels(&[1, 2, 3]), vec![0, 1, 2]);
        assert_eq!(options.resolve_num_features(4).unwrap(), 4);

        let options = options.with_num_features(6);
        assert_eq!(options.resolve_num_features(4).unwrap(), 6);
        assert!(options.resolve_num_features(7).is_err());
    }

    #[test]
    fn test_one_based_shift_saturates() {
        let options = LoadOptions::default().with_one_based_labels(true);
        assert_eq!(options.convert_labels(&[i32::MIN, 0]), vec![i32::MIN, -1]);
    }
}
