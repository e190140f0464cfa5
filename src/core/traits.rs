//! Core traits for the SDCA solver

use crate::core::error::Result;
use crate::data::{Dataset, LoadOptions};

/// Labeled data read from a text format, convertible to a dense dataset
pub trait DataSource {
    /// Number of observations
    fn len(&self) -> usize;

    /// Number of features seen in the source (largest feature index + 1)
    fn dim(&self) -> usize;

    /// Labels exactly as read
    fn raw_labels(&self) -> &[i32];

    /// Convert to a dense column-major dataset
    fn to_dataset(&self, options: &LoadOptions) -> Result<Dataset>;

    /// Check if the source is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trained linear multiclass model
///
/// Every observation must have exactly `num_features()` values.
pub trait Classifier: Send + Sync {
    fn num_classes(&self) -> usize;

    fn num_features(&self) -> usize;

    /// Per-class scores of a single observation
    fn scores(&self, x: &[f64]) -> Result<Vec<f64>>;

    /// Class with the highest score (lowest index on ties)
    fn predict(&self, x: &[f64]) -> Result<usize> {
        let scores = self.scores(x)?;
        let mut best = 0;
        for (c, &s) in scores.iter().enumerate().skip(1) {
            if s > scores[best] {
                best = c;
            }
        }
        Ok(best)
    }

    /// The `k` highest-scoring classes, best first
    fn top_k(&self, x: &[f64], k: usize) -> Result<Vec<usize>> {
        let scores = self.scores(x)?;
        let mut classes: Vec<usize> = (0..scores.len()).collect();
        classes.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        classes.truncate(k);
        Ok(classes)
    }

    /// Predict every observation of a dataset
    fn predict_dataset(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        (0..dataset.num_observations())
            .map(|i| self.predict(&dataset.features().observation(i)))
            .collect()
    }
}
