//! Trained multiclass linear model

use crate::core::{
    Classifier, Evaluation, ObjectiveKind, Record, Result, SdcaError, SolverStatus,
    ValidationError,
};
use crate::data::Dataset;
use crate::utils::blas;
use serde::{Deserialize, Serialize};

/// Result of a successful `solve` call
///
/// `weights` is column-major with shape `[num_features × num_classes]`: column
/// `c` holds the weight vector of class `c` and the scores of an observation
/// `x` are `W' * x`. `dual_variables` is column-major with shape
/// `[num_classes × num_examples]` over the training set, and `W = X * A'`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelData")]
pub struct Model {
    weights: Vec<f64>,
    num_features: usize,
    num_classes: usize,
    num_examples: usize,
    dual_variables: Vec<f64>,
    k: usize,
    c: f64,
    objective: ObjectiveKind,
    status: SolverStatus,
    epoch: usize,
    summary: Record,
    records: Vec<Record>,
    evals: Vec<Evaluation>,
}

/// Unchecked serialized form of [`Model`]
#[derive(Deserialize)]
struct ModelData {
    weights: Vec<f64>,
    num_features: usize,
    num_classes: usize,
    #[serde(default)]
    num_examples: usize,
    #[serde(default)]
    dual_variables: Vec<f64>,
    k: usize,
    c: f64,
    objective: ObjectiveKind,
    status: SolverStatus,
    epoch: usize,
    summary: Record,
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    evals: Vec<Evaluation>,
}

impl TryFrom<ModelData> for Model {
    type Error = SdcaError;

    fn try_from(data: ModelData) -> Result<Self> {
        let model = Self {
            weights: data.weights,
            num_features: data.num_features,
            num_classes: data.num_classes,
            num_examples: data.num_examples,
            dual_variables: data.dual_variables,
            k: data.k,
            c: data.c,
            objective: data.objective,
            status: data.status,
            epoch: data.epoch,
            summary: data.summary,
            records: data.records,
            evals: data.evals,
        };
        model.check()?;
        Ok(model)
    }
}

/// Training-side facts a model carries besides its weights
#[derive(Debug, Clone)]
pub(crate) struct ModelParts {
    pub num_features: usize,
    pub num_classes: usize,
    pub num_examples: usize,
    pub dual_variables: Vec<f64>,
    pub k: usize,
    pub c: f64,
    pub objective: ObjectiveKind,
    pub status: SolverStatus,
    pub epoch: usize,
    pub summary: Record,
    pub records: Vec<Record>,
    pub evals: Vec<Evaluation>,
}

impl Model {
    pub(crate) fn new(weights: Vec<f64>, parts: ModelParts) -> Result<Self> {
        let model = Self {
            weights,
            num_features: parts.num_features,
            num_classes: parts.num_classes,
            num_examples: parts.num_examples,
            dual_variables: parts.dual_variables,
            k: parts.k,
            c: parts.c,
            objective: parts.objective,
            status: parts.status,
            epoch: parts.epoch,
            summary: parts.summary,
            records: parts.records,
            evals: parts.evals,
        };
        model.check()?;
        Ok(model)
    }

    /// Reject buffers that do not match the declared shapes
    fn check(&self) -> Result<()> {
        if self.weights.len() != self.num_features * self.num_classes {
            return Err(SdcaError::SerializationError(format!(
                "model has {} weights, expected {} × {}",
                self.weights.len(),
                self.num_features,
                self.num_classes
            )));
        }
        if self.dual_variables.len() != self.num_classes * self.num_examples {
            return Err(SdcaError::SerializationError(format!(
                "model has {} dual variables, expected {} × {}",
                self.dual_variables.len(),
                self.num_classes,
                self.num_examples
            )));
        }
        Ok(())
    }

    /// Column-major `[num_features × num_classes]` weights
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight(&self, feature: usize, class: usize) -> f64 {
        self.weights[feature + self.num_features * class]
    }

    /// Weight vector of one class
    pub fn class_weights(&self, class: usize) -> &[f64] {
        &self.weights[self.num_features * class..self.num_features * (class + 1)]
    }

    /// Column-major `[num_classes × num_examples]` dual variables
    pub fn dual_variables(&self) -> &[f64] {
        &self.dual_variables
    }

    pub fn dual_variable(&self, class: usize, example: usize) -> f64 {
        self.dual_variables[class + self.num_classes * example]
    }

    /// Number of training examples behind the dual variables
    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn objective(&self) -> ObjectiveKind {
        self.objective
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Number of epochs run
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Objective values at the last evaluation
    pub fn summary(&self) -> &Record {
        &self.summary
    }

    pub fn primal(&self) -> f64 {
        self.summary.primal
    }

    pub fn dual(&self) -> f64 {
        self.summary.dual
    }

    pub fn absolute_gap(&self) -> f64 {
        self.summary.absolute_gap
    }

    pub fn relative_gap(&self) -> f64 {
        self.summary.relative_gap
    }

    pub fn wall_time(&self) -> f64 {
        self.summary.wall_time
    }

    /// Convergence records, oldest first; empty unless requested
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Dataset evaluations, oldest first; empty unless requested
    pub fn evals(&self) -> &[Evaluation] {
        &self.evals
    }

    /// Fraction of a dataset's observations whose label is among the `k`
    /// highest-scoring classes
    pub fn top_k_accuracy(&self, dataset: &Dataset, k: usize) -> Result<f64> {
        let n = dataset.num_observations();
        if n == 0 {
            return Ok(0.0);
        }
        let labels = dataset.labels().as_slice();
        let mut hits = 0;
        for (i, &label) in labels.iter().enumerate().take(n) {
            let top = self.top_k(&dataset.features().observation(i), k)?;
            if label >= 0 && top.contains(&(label as usize)) {
                hits += 1;
            }
        }
        Ok(hits as f64 / n as f64)
    }

    pub fn accuracy(&self, dataset: &Dataset) -> Result<f64> {
        self.top_k_accuracy(dataset, 1)
    }
}

impl Classifier for Model {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn scores(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.num_features {
            return Err(ValidationError::ObservationWidth {
                expected: self.num_features,
                actual: x.len(),
            }
            .into());
        }
        let mut out = vec![0.0; self.num_classes];
        blas::gemv_t(&self.weights, self.num_features, x, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn record(epoch: usize) -> Record {
        Record {
            epoch,
            primal: 1.0,
            dual: 0.5,
            absolute_gap: 0.5,
            relative_gap: 0.5,
            primal_loss: 1.0,
            dual_loss: 0.5,
            regularizer: 0.0,
            wall_time: 0.0,
            solve_wall_time: 0.0,
            eval_wall_time: 0.0,
            cpu_time: 0.0,
            solve_cpu_time: 0.0,
            eval_cpu_time: 0.0,
        }
    }

    /// 2 features, 3 classes; class c scores feature c (class 2 scores nothing)
    pub fn model() -> Model {
        let parts = ModelParts {
            num_features: 2,
            num_classes: 3,
            num_examples: 2,
            dual_variables: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            k: 1,
            c: 1.0,
            objective: ObjectiveKind::TopKSvm,
            status: SolverStatus::Solved,
            epoch: 10,
            summary: record(10),
            records: Vec::new(),
            evals: Vec::new(),
        };
        Model::new(vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0], parts).unwrap()
    }
}
