//! Solver gateway
//!
//! The gateway is the only entry point to training. A `solve` call validates
//! the dataset batch and the configuration, marshals every dataset into the
//! optimizer's native layout, invokes the optimizer exactly once and wraps
//! what comes back into an immutable [`Model`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rsdca::{Dataset, DatasetBatch, FeatureMatrix, Gateway};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 2 features, 4 observations, one observation per column
//! let features = FeatureMatrix::from_column_major(
//!     vec![2.0, 0.0, 0.0, 2.0, 3.0, 0.0, 0.0, 3.0],
//!     2,
//!     4,
//! )?;
//! let batch = DatasetBatch::new().with(Dataset::new(features, vec![0, 1, 0, 1]));
//!
//! let model = Gateway::new()
//!     .with_c(1.0)
//!     .with_k(1)
//!     .with_records(true)
//!     .solve(&batch, 2)?;
//!
//! println!("status: {}, gap: {:e}", model.status(), model.relative_gap());
//! # Ok(())
//! # }
//! ```

use crate::core::{
    LogLevel, ObjectiveKind, Result, SdcaError, SolverConfig, SolverStatus, Summation,
    ValidationError,
};
use crate::data::{Dataset, DatasetBatch};
use crate::marshal::{marshal_batch, unmarshal_dual_variables, unmarshal_weights};
use crate::model::{Model, ModelParts};
use crate::optimizer::{NativeParams, Optimizer, SdcaOptimizer};
use log::{debug, warn};

/// Validating front end of an [`Optimizer`], configured builder style
pub struct Gateway<O: Optimizer = SdcaOptimizer> {
    optimizer: O,
    config: SolverConfig,
}

impl Gateway<SdcaOptimizer> {
    /// Gateway to the SDCA optimizer with default parameters
    pub fn new() -> Self {
        Self {
            optimizer: SdcaOptimizer::new(),
            config: SolverConfig::default(),
        }
    }
}

impl Default for Gateway<SdcaOptimizer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Optimizer> Gateway<O> {
    /// Gateway to a custom optimizer
    pub fn with_optimizer(optimizer: O) -> Self {
        Self {
            optimizer,
            config: SolverConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.config.k = k;
        self
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    pub fn with_objective(mut self, objective: ObjectiveKind) -> Self {
        self.config.objective = objective;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.config.log_level = log_level;
        self
    }

    /// Keep every convergence record in the model
    pub fn with_records(mut self, enabled: bool) -> Self {
        self.config.return_records = enabled;
        self
    }

    /// Keep every dataset evaluation in the model
    pub fn with_evals(mut self, enabled: bool) -> Self {
        self.config.return_evals = enabled;
        self
    }

    /// Set the relative duality gap tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    /// Evaluate the duality gap before the first epoch
    pub fn with_check_on_start(mut self, enabled: bool) -> Self {
        self.config.check_on_start = enabled;
        self
    }

    pub fn with_summation(mut self, summation: Summation) -> Self {
        self.config.summation = summation;
        self
    }

    pub fn with_check_epoch(mut self, check_epoch: usize) -> Self {
        self.config.check_epoch = check_epoch;
        self
    }

    pub fn with_max_epoch(mut self, max_epoch: usize) -> Self {
        self.config.max_epoch = max_epoch;
        self
    }

    /// Set the process CPU time budget in seconds (0 = unlimited)
    pub fn with_max_cpu_time(mut self, seconds: f64) -> Self {
        self.config.max_cpu_time = seconds;
        self
    }

    /// Set the wall clock budget in seconds (0 = unlimited)
    pub fn with_max_wall_time(mut self, seconds: f64) -> Self {
        self.config.max_wall_time = seconds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// Train a model on the first dataset of `batch`, scoring the others
    pub fn solve(&self, batch: &DatasetBatch, num_classes: usize) -> Result<Model> {
        validate(batch, num_classes, &self.config)?;

        let problem = marshal_batch(batch, num_classes)?;
        let params = NativeParams::from(&self.config);
        let num_features = problem.num_features();
        let num_examples = problem.training().map_or(0, |t| t.num_observations());
        if self.config.log_level >= LogLevel::Debug {
            debug!(
                "gateway: marshalled {} dataset(s), {} features, {} classes for {}",
                problem.datasets().len(),
                num_features,
                num_classes,
                self.optimizer.name()
            );
        }

        let output = self.optimizer.optimize(&problem, &params)?;

        if output.status == SolverStatus::Failed {
            return Err(SdcaError::SolverFailure(format!(
                "optimizer reported status {} after {} epoch(s)",
                output.status, output.epoch
            )));
        }
        if !(output.summary.primal.is_finite() && output.summary.dual.is_finite()) {
            return Err(SdcaError::SolverFailure(format!(
                "non-finite objective (primal = {}, dual = {})",
                output.summary.primal, output.summary.dual
            )));
        }
        let weights = unmarshal_weights(output.weights, num_features, num_classes)?;
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(SdcaError::SolverFailure(
                "optimizer returned non-finite weights".to_string(),
            ));
        }
        let dual_variables =
            unmarshal_dual_variables(output.dual_variables, num_classes, num_examples)?;
        if output.status.is_warning() {
            warn!(
                "solver stopped without reaching the gap tolerance: status {} after {} epoch(s), relative gap {:e}",
                output.status, output.epoch, output.summary.relative_gap
            );
        }

        Model::new(
            weights,
            ModelParts {
                num_features,
                num_classes,
                num_examples,
                dual_variables,
                k: self.config.k,
                c: self.config.c,
                objective: self.config.objective,
                status: output.status,
                epoch: output.epoch,
                summary: output.summary,
                records: if self.config.return_records {
                    output.records
                } else {
                    Vec::new()
                },
                evals: if self.config.return_evals {
                    output.evals
                } else {
                    Vec::new()
                },
            },
        )
    }
}

/// Train with the SDCA optimizer
pub fn solve(batch: &DatasetBatch, num_classes: usize, config: &SolverConfig) -> Result<Model> {
    Gateway::new().with_config(config.clone()).solve(batch, num_classes)
}

/// Check a batch and configuration before anything is marshalled
pub fn validate(batch: &DatasetBatch, num_classes: usize, config: &SolverConfig) -> Result<()> {
    let train = batch.training().ok_or(ValidationError::EmptyBatch)?;
    if num_classes < 2 {
        return Err(ValidationError::TooFewClasses(num_classes).into());
    }
    config.validate(num_classes)?;

    let num_features = train.num_features();
    for (index, dataset) in batch.iter().enumerate() {
        validate_dataset(index, dataset, num_features, num_classes)?;
    }
    if train.num_observations() == 0 {
        return Err(ValidationError::EmptyTrainingSet.into());
    }
    Ok(())
}

fn validate_dataset(
    index: usize,
    dataset: &Dataset,
    num_features: usize,
    num_classes: usize,
) -> Result<()> {
    let labels = dataset.labels().as_slice();
    if labels.len() != dataset.num_observations() {
        return Err(ValidationError::LengthMismatch {
            dataset: index,
            labels: labels.len(),
            observations: dataset.num_observations(),
        }
        .into());
    }
    if let Some((observation, &label)) = labels
        .iter()
        .enumerate()
        .find(|(_, y)| **y < 0 || **y as usize >= num_classes)
    {
        return Err(ValidationError::LabelOutOfRange {
            dataset: index,
            observation,
            label,
            num_classes,
        }
        .into());
    }
    if dataset.num_features() != num_features {
        return Err(ValidationError::FeatureMismatch {
            dataset: index,
            expected: num_features,
            actual: dataset.num_features(),
        }
        .into());
    }
    if let Some((feature, observation)) = dataset.features().first_non_finite() {
        return Err(ValidationError::NonFiniteFeature {
            dataset: index,
            feature,
            observation,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Classifier;
    use crate::data::FeatureMatrix;
    use crate::marshal::NativeProblem;
    use crate::model::test_support::record;
    use crate::optimizer::NativeOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed output and counts its invocations
    struct CountingOptimizer {
        calls: AtomicUsize,
        status: SolverStatus,
        weights: Option<Vec<f64>>,
        dual_variables: Option<Vec<f64>>,
    }

    impl CountingOptimizer {
        fn new(status: SolverStatus) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status,
                weights: None,
                dual_variables: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Optimizer for CountingOptimizer {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn optimize(&self, problem: &NativeProblem, _params: &NativeParams) -> Result<NativeOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let weights = self
                .weights
                .clone()
                .unwrap_or_else(|| vec![0.0; problem.num_features() * problem.num_classes()]);
            let n = problem.training().map_or(0, |t| t.num_observations());
            let dual_variables = self
                .dual_variables
                .clone()
                .unwrap_or_else(|| vec![0.0; problem.num_classes() * n]);
            Ok(NativeOutput {
                weights,
                dual_variables,
                status: self.status,
                epoch: 2,
                summary: record(2),
                records: vec![record(1), record(2)],
                evals: Vec::new(),
            })
        }
    }

    fn batch() -> DatasetBatch {
        let features = FeatureMatrix::from_column_major(
            vec![2.0, 0.0, 1.0, 0.0, 2.0, 1.0, 3.0, 0.0, 1.0, 0.0, 3.0, 1.0],
            3,
            4,
        )
        .unwrap();
        DatasetBatch::new().with(Dataset::new(features, vec![0, 1, 0, 1]))
    }

    fn validation_error(result: Result<Model>) -> ValidationError {
        match result {
            Err(SdcaError::Validation(e)) => e,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_builder_pattern() {
        let gateway = Gateway::new()
            .with_c(2.0)
            .with_k(2)
            .with_epsilon(0.01)
            .with_max_epoch(50)
            .with_records(true)
            .with_check_on_start(true)
            .with_max_cpu_time(5.0)
            .with_summation(Summation::Kahan);

        assert_eq!(gateway.config().c, 2.0);
        assert_eq!(gateway.config().k, 2);
        assert_eq!(gateway.config().epsilon, 0.01);
        assert_eq!(gateway.config().max_epoch, 50);
        assert!(gateway.config().return_records);
        assert!(!gateway.config().return_evals);
        assert!(gateway.config().check_on_start);
        assert_eq!(gateway.config().max_cpu_time, 5.0);
        assert_eq!(gateway.config().summation, Summation::Kahan);
    }

    #[test]
    fn test_optimizer_invoked_once() {
        let gateway = Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::Solved));
        let model = gateway.solve(&batch(), 2).unwrap();
        assert_eq!(gateway.optimizer().calls(), 1);
        assert_eq!(model.weights().len(), 3 * 2);
        assert_eq!(model.num_features(), 3);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_empty_batch_not_forwarded() {
        let gateway = Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::Solved));
        let err = validation_error(gateway.solve(&DatasetBatch::new(), 2));
        assert_eq!(err, ValidationError::EmptyBatch);
        assert_eq!(gateway.optimizer().calls(), 0);
    }

    #[test]
    fn test_k_above_num_classes_not_forwarded() {
        let gateway =
            Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::Solved)).with_k(3);
        let err = validation_error(gateway.solve(&batch(), 2));
        assert_eq!(err, ValidationError::KOutOfRange { k: 3, num_classes: 2 });
        assert_eq!(gateway.optimizer().calls(), 0);
    }

    #[test]
    fn test_too_few_classes() {
        let err = validation_error(Gateway::new().solve(&batch(), 1));
        assert_eq!(err, ValidationError::TooFewClasses(1));
    }

    #[test]
    fn test_label_out_of_range_names_dataset() {
        let test = Dataset::new(FeatureMatrix::zeros(3, 2), vec![1, 5]);
        let err = validation_error(Gateway::new().solve(&batch().with(test), 2));
        assert_eq!(
            err,
            ValidationError::LabelOutOfRange {
                dataset: 1,
                observation: 1,
                label: 5,
                num_classes: 2
            }
        );
    }

    #[test]
    fn test_length_mismatch() {
        let bad = Dataset::new(FeatureMatrix::zeros(3, 4), vec![0, 1, 0]);
        let gateway = Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::Solved));
        let result = gateway.solve(&DatasetBatch::new().with(bad), 2);
        let message = result.as_ref().unwrap_err().to_string();
        assert!(message.contains('3') && message.contains('4'));
        assert_eq!(
            validation_error(result),
            ValidationError::LengthMismatch {
                dataset: 0,
                labels: 3,
                observations: 4
            }
        );
        assert_eq!(gateway.optimizer().calls(), 0);
    }

    #[test]
    fn test_feature_mismatch() {
        let test = Dataset::new(FeatureMatrix::zeros(2, 1), vec![0]);
        let err = validation_error(Gateway::new().solve(&batch().with(test), 2));
        assert_eq!(
            err,
            ValidationError::FeatureMismatch {
                dataset: 1,
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_non_finite_feature() {
        let features =
            FeatureMatrix::from_column_major(vec![1.0, f64::INFINITY, 0.0, 1.0], 2, 2).unwrap();
        let batch = DatasetBatch::new().with(Dataset::new(features, vec![0, 1]));
        let err = validation_error(Gateway::new().solve(&batch, 2));
        assert_eq!(
            err,
            ValidationError::NonFiniteFeature {
                dataset: 0,
                feature: 1,
                observation: 0
            }
        );
    }

    #[test]
    fn test_empty_training_set() {
        let batch = DatasetBatch::new().with(Dataset::new(FeatureMatrix::zeros(3, 0), Vec::new()));
        let err = validation_error(Gateway::new().solve(&batch, 2));
        assert_eq!(err, ValidationError::EmptyTrainingSet);
    }

    #[test]
    fn test_invalid_c() {
        let err = validation_error(Gateway::new().with_c(0.0).solve(&batch(), 2));
        assert_eq!(err, ValidationError::NonPositiveC(0.0));
    }

    #[test]
    fn test_failed_status_is_error() {
        let gateway = Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::Failed));
        assert!(matches!(
            gateway.solve(&batch(), 2),
            Err(SdcaError::SolverFailure(_))
        ));
    }

    #[test]
    fn test_wrong_weight_count_is_error() {
        let mut optimizer = CountingOptimizer::new(SolverStatus::Solved);
        optimizer.weights = Some(vec![0.0; 5]);
        let gateway = Gateway::with_optimizer(optimizer);
        assert!(matches!(
            gateway.solve(&batch(), 2),
            Err(SdcaError::SolverFailure(_))
        ));
    }

    #[test]
    fn test_wrong_dual_variable_count_is_error() {
        let mut optimizer = CountingOptimizer::new(SolverStatus::Solved);
        optimizer.dual_variables = Some(vec![0.0; 3]);
        let gateway = Gateway::with_optimizer(optimizer);
        assert!(matches!(
            gateway.solve(&batch(), 2),
            Err(SdcaError::SolverFailure(_))
        ));
    }

    #[test]
    fn test_dual_variables_kept() {
        let model = Gateway::new().with_max_epoch(5).solve(&batch(), 2).unwrap();
        assert_eq!(model.num_examples(), 4);
        assert_eq!(model.dual_variables().len(), 2 * 4);
        // W = X * A'
        let train = batch();
        let x = train.training().unwrap().features();
        for f in 0..3 {
            for c in 0..2 {
                let w: f64 = (0..4)
                    .map(|i| x.observation(i)[f] * model.dual_variable(c, i))
                    .sum();
                assert!((w - model.weight(f, c)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_non_convergence_is_success() {
        let gateway = Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::MaxEpoch));
        let model = gateway.solve(&batch(), 2).unwrap();
        assert_eq!(model.status(), SolverStatus::MaxEpoch);
    }

    #[test]
    fn test_records_kept_only_when_requested() {
        let gateway = Gateway::with_optimizer(CountingOptimizer::new(SolverStatus::Solved));
        assert!(gateway.solve(&batch(), 2).unwrap().records().is_empty());

        let gateway = gateway.with_records(true);
        let model = gateway.solve(&batch(), 2).unwrap();
        assert_eq!(model.records().len(), 2);
        assert_eq!(model.records()[0].epoch, 1);
    }

    #[test]
    fn test_free_function_solves_separable_data() {
        let config = SolverConfig::default();
        let batch = batch();
        let model = solve(&batch, 2, &config).unwrap();
        let train = batch.training().unwrap();
        assert_eq!(model.predict_dataset(train).unwrap(), vec![0, 1, 0, 1]);
    }
}
