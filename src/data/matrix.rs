//! Dense feature matrices, label vectors and dataset batches
//!
//! A feature matrix has the logical shape `[num_features × num_observations]`:
//! one column per observation. The solver's native layout is column-major,
//! so each observation's feature vector is contiguous:
//!
//! ```text
//! column-major: data[f + num_features * i]
//! row-major:    data[i + num_observations * f]
//! ```
//!
//! Matrices built from row-major buffers keep that layout until they are
//! marshalled (see [`crate::marshal`]).

use crate::core::{Result, ValidationError};
use serde::{Deserialize, Serialize};

/// Storage order of a feature buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Observations contiguous (native)
    ColumnMajor,
    /// Features contiguous
    RowMajor,
}

/// Dense `f64` matrix of shape `[num_features × num_observations]`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    num_features: usize,
    num_observations: usize,
    layout: Layout,
}

impl FeatureMatrix {
    /// Wrap a buffer stored in the given layout
    pub fn new(
        data: Vec<f64>,
        num_features: usize,
        num_observations: usize,
        layout: Layout,
    ) -> Result<Self> {
        let expected = num_features * num_observations;
        if data.len() != expected {
            return Err(ValidationError::BufferSize {
                expected,
                actual: data.len(),
            }
            .into());
        }
        Ok(Self {
            data,
            num_features,
            num_observations,
            layout,
        })
    }

    pub fn from_column_major(
        data: Vec<f64>,
        num_features: usize,
        num_observations: usize,
    ) -> Result<Self> {
        Self::new(data, num_features, num_observations, Layout::ColumnMajor)
    }

    pub fn from_row_major(
        data: Vec<f64>,
        num_features: usize,
        num_observations: usize,
    ) -> Result<Self> {
        Self::new(data, num_features, num_observations, Layout::RowMajor)
    }

    /// Build a column-major matrix from per-observation feature vectors
    pub fn from_observations(num_features: usize, observations: &[Vec<f64>]) -> Result<Self> {
        let mut data = Vec::with_capacity(num_features * observations.len());
        for x in observations {
            if x.len() != num_features {
                return Err(ValidationError::BufferSize {
                    expected: num_features,
                    actual: x.len(),
                }
                .into());
            }
            data.extend_from_slice(x);
        }
        Self::from_column_major(data, num_features, observations.len())
    }

    pub fn zeros(num_features: usize, num_observations: usize) -> Self {
        Self {
            data: vec![0.0; num_features * num_observations],
            num_features,
            num_observations,
            layout: Layout::ColumnMajor,
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Raw buffer in this matrix's layout
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    fn index(&self, feature: usize, observation: usize) -> usize {
        match self.layout {
            Layout::ColumnMajor => feature + self.num_features * observation,
            Layout::RowMajor => observation + self.num_observations * feature,
        }
    }

    /// Value of one feature of one observation
    ///
    /// # Panics
    /// Panics if either index is out of range
    pub fn get(&self, feature: usize, observation: usize) -> f64 {
        assert!(feature < self.num_features && observation < self.num_observations);
        self.data[self.index(feature, observation)]
    }

    /// Copy of one observation's feature vector
    pub fn observation(&self, observation: usize) -> Vec<f64> {
        match self.layout {
            Layout::ColumnMajor => {
                let start = self.num_features * observation;
                self.data[start..start + self.num_features].to_vec()
            }
            Layout::RowMajor => (0..self.num_features)
                .map(|f| self.get(f, observation))
                .collect(),
        }
    }

    /// `(feature, observation)` of the first NaN or infinite value in storage order
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        let pos = self.data.iter().position(|v| !v.is_finite())?;
        Some(match self.layout {
            Layout::ColumnMajor => (pos % self.num_features, pos / self.num_features),
            Layout::RowMajor => (pos / self.num_observations, pos % self.num_observations),
        })
    }

    /// Same matrix stored in another layout
    pub fn to_layout(&self, layout: Layout) -> Self {
        if layout == self.layout {
            return self.clone();
        }
        let mut data = vec![0.0; self.data.len()];
        for i in 0..self.num_observations {
            for f in 0..self.num_features {
                let target = match layout {
                    Layout::ColumnMajor => f + self.num_features * i,
                    Layout::RowMajor => i + self.num_observations * f,
                };
                data[target] = self.data[self.index(f, i)];
            }
        }
        Self {
            data,
            num_features: self.num_features,
            num_observations: self.num_observations,
            layout,
        }
    }
}

/// Zero-based class labels, one per observation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelVector(Vec<i32>);

impl LabelVector {
    pub fn new(labels: Vec<i32>) -> Self {
        Self(labels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }
}

impl From<Vec<i32>> for LabelVector {
    fn from(labels: Vec<i32>) -> Self {
        Self(labels)
    }
}

/// Feature matrix paired with its labels
///
/// Construction does not check shapes; the gateway validates every dataset
/// before use so that mismatches surface as validation errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: FeatureMatrix,
    labels: LabelVector,
}

impl Dataset {
    pub fn new(features: FeatureMatrix, labels: impl Into<LabelVector>) -> Self {
        Self {
            features,
            labels: labels.into(),
        }
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn labels(&self) -> &LabelVector {
        &self.labels
    }

    pub fn num_features(&self) -> usize {
        self.features.num_features()
    }

    pub fn num_observations(&self) -> usize {
        self.features.num_observations()
    }
}

/// Ordered datasets sharing one feature space; the first one is trained on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetBatch {
    datasets: Vec<Dataset>,
}

impl DatasetBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dataset (builder style)
    pub fn with(mut self, dataset: Dataset) -> Self {
        self.datasets.push(dataset);
        self
    }

    pub fn push(&mut self, dataset: Dataset) {
        self.datasets.push(dataset);
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn training(&self) -> Option<&Dataset> {
        self.datasets.first()
    }

    pub fn get(&self, i: usize) -> Option<&Dataset> {
        self.datasets.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dataset> {
        self.datasets.iter()
    }
}

impl From<Vec<Dataset>> for DatasetBatch {
    fn from(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }
}

impl<'a> IntoIterator for &'a DatasetBatch {
    type Item = &'a Dataset;
    type IntoIter = std::slice::Iter<'a, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.iter()
    }
}
