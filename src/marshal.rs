//! Conversion between caller datasets and the optimizer's native buffers
//!
//! The native form of a dataset is a contiguous column-major feature buffer
//! (`data[f + num_features * i]`) plus `usize` labels. The weight matrix comes
//! back column-major with shape `[num_features × num_classes]`.

use crate::core::{Result, SdcaError, ValidationError};
use crate::data::{Dataset, DatasetBatch, FeatureMatrix, Layout};

/// One dataset in the optimizer's layout
#[derive(Debug, Clone, PartialEq)]
pub struct NativeDataset {
    features: Vec<f64>,
    labels: Vec<usize>,
    num_features: usize,
}

impl NativeDataset {
    pub fn new(features: Vec<f64>, labels: Vec<usize>, num_features: usize) -> Result<Self> {
        let expected = num_features * labels.len();
        if features.len() != expected {
            return Err(ValidationError::BufferSize {
                expected,
                actual: features.len(),
            }
            .into());
        }
        Ok(Self {
            features,
            labels,
            num_features,
        })
    }

    pub fn features(&self) -> &[f64] {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_observations(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn observation(&self, i: usize) -> &[f64] {
        &self.features[self.num_features * i..self.num_features * (i + 1)]
    }
}

/// Everything the optimizer sees of a `solve` call
#[derive(Debug, Clone, PartialEq)]
pub struct NativeProblem {
    datasets: Vec<NativeDataset>,
    num_classes: usize,
}

impl NativeProblem {
    pub fn new(datasets: Vec<NativeDataset>, num_classes: usize) -> Self {
        Self {
            datasets,
            num_classes,
        }
    }

    /// The dataset trained on; `None` only for an empty problem
    pub fn training(&self) -> Option<&NativeDataset> {
        self.datasets.first()
    }

    pub fn datasets(&self) -> &[NativeDataset] {
        &self.datasets
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_features(&self) -> usize {
        self.training().map_or(0, NativeDataset::num_features)
    }
}

/// Copy a dataset into the native layout
pub fn marshal_dataset(dataset: &Dataset) -> Result<NativeDataset> {
    let features = dataset.features().to_layout(Layout::ColumnMajor).into_vec();
    let labels = dataset
        .labels()
        .as_slice()
        .iter()
        .map(|&y| {
            usize::try_from(y).map_err(|_| {
                SdcaError::Configuration(format!("cannot marshal negative label {y}"))
            })
        })
        .collect::<Result<Vec<usize>>>()?;
    NativeDataset::new(features, labels, dataset.num_features())
}

/// Marshal every dataset of a batch, training set first
pub fn marshal_batch(batch: &DatasetBatch, num_classes: usize) -> Result<NativeProblem> {
    let datasets = batch
        .iter()
        .map(marshal_dataset)
        .collect::<Result<Vec<_>>>()?;
    Ok(NativeProblem::new(datasets, num_classes))
}

/// Rebuild a caller dataset in the requested layout
pub fn unmarshal_dataset(native: &NativeDataset, layout: Layout) -> Result<Dataset> {
    let features = FeatureMatrix::from_column_major(
        native.features.clone(),
        native.num_features,
        native.num_observations(),
    )?
    .to_layout(layout);
    let labels: Vec<i32> = native.labels.iter().map(|&y| y as i32).collect();
    Ok(Dataset::new(features, labels))
}

/// Check the shape of a weight buffer returned by the optimizer
pub fn unmarshal_weights(
    weights: Vec<f64>,
    num_features: usize,
    num_classes: usize,
) -> Result<Vec<f64>> {
    let expected = num_features * num_classes;
    if weights.len() != expected {
        return Err(SdcaError::SolverFailure(format!(
            "optimizer returned {} weights, expected {} ({} features × {} classes)",
            weights.len(),
            expected,
            num_features,
            num_classes
        )));
    }
    Ok(weights)
}

/// Check the optimizer's `[num_classes × num_examples]` dual variables
pub fn unmarshal_dual_variables(
    dual_variables: Vec<f64>,
    num_classes: usize,
    num_examples: usize,
) -> Result<Vec<f64>> {
    let expected = num_classes * num_examples;
    if dual_variables.len() != expected {
        return Err(SdcaError::SolverFailure(format!(
            "optimizer returned {} dual variables, expected {} ({} classes × {} examples)",
            dual_variables.len(),
            expected,
            num_classes,
            num_examples
        )));
    }
    Ok(dual_variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_major_dataset() -> Dataset {
        // 2 features, 3 observations stored feature by feature
        let features =
            FeatureMatrix::from_row_major(vec![0.1, -2.5, 1e-300, 3.0, f64::MIN_POSITIVE, 7.25], 2, 3)
                .unwrap();
        Dataset::new(features, vec![2, 0, 1])
    }

    #[test]
    fn test_marshal_is_column_major() {
        let native = marshal_dataset(&row_major_dataset()).unwrap();
        assert_eq!(native.observation(0), &[0.1, 3.0]);
        assert_eq!(native.observation(2), &[1e-300, 7.25]);
        assert_eq!(native.labels(), &[2, 0, 1]);
    }

    #[test]
    fn test_round_trip_bit_exact() {
        for layout in [Layout::RowMajor, Layout::ColumnMajor] {
            let original = row_major_dataset();
            let original = Dataset::new(
                original.features().to_layout(layout),
                original.labels().as_slice().to_vec(),
            );
            let native = marshal_dataset(&original).unwrap();
            let restored = unmarshal_dataset(&native, layout).unwrap();

            assert_eq!(restored.labels(), original.labels());
            let bits = |d: &Dataset| -> Vec<u64> {
                d.features().as_slice().iter().map(|v| v.to_bits()).collect()
            };
            assert_eq!(bits(&restored), bits(&original));
        }
    }

    #[test]
    fn test_marshal_batch_keeps_order() {
        let train = row_major_dataset();
        let test = Dataset::new(FeatureMatrix::zeros(2, 1), vec![1]);
        let batch = DatasetBatch::new().with(train).with(test);
        let problem = marshal_batch(&batch, 3).unwrap();

        assert_eq!(problem.datasets().len(), 2);
        assert_eq!(problem.num_features(), 2);
        assert_eq!(problem.training().unwrap().num_observations(), 3);
        assert_eq!(problem.datasets()[1].labels(), &[1]);
    }

    #[test]
    fn test_unmarshal_weights_checks_shape() {
        assert!(unmarshal_weights(vec![0.0; 6], 3, 2).is_ok());
        assert!(matches!(
            unmarshal_weights(vec![0.0; 5], 3, 2),
            Err(SdcaError::SolverFailure(_))
        ));
    }
}
