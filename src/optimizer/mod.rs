//! Optimizer boundary
//!
//! The gateway hands a marshalled [`NativeProblem`] and [`NativeParams`] to an
//! [`Optimizer`] exactly once per `solve` call and gets back a
//! [`NativeOutput`]. [`SdcaOptimizer`] is the stochastic dual coordinate
//! ascent engine shipped with the crate; other engines (or test doubles)
//! plug in through the same trait.

use crate::core::{
    Evaluation, LogLevel, ObjectiveKind, Record, Result, SdcaError, SolverConfig, SolverStatus,
    StoppingCriteria, Summation,
};
use crate::marshal::NativeProblem;
use crate::objective::build_objective;
use crate::solver::SdcaSolver;

/// Scalars passed to the optimizer along with the data
#[derive(Debug, Clone, PartialEq)]
pub struct NativeParams {
    pub k: usize,
    pub c: f64,
    pub objective: ObjectiveKind,
    pub summation: Summation,
    pub log_level: LogLevel,
    pub criteria: StoppingCriteria,
    pub seed: u64,
    pub return_records: bool,
    pub return_evals: bool,
}

impl From<&SolverConfig> for NativeParams {
    fn from(config: &SolverConfig) -> Self {
        Self {
            k: config.k,
            c: config.c,
            objective: config.objective,
            summation: config.summation,
            log_level: config.log_level,
            criteria: config.stopping_criteria(),
            seed: config.seed,
            return_records: config.return_records,
            return_evals: config.return_evals,
        }
    }
}

/// What an optimizer returns
#[derive(Debug, Clone, PartialEq)]
pub struct NativeOutput {
    /// Column-major `[num_features × num_classes]`
    pub weights: Vec<f64>,
    /// Column-major `[num_classes × num_observations]` dual variables of the
    /// training set
    pub dual_variables: Vec<f64>,
    pub status: SolverStatus,
    /// Number of completed epochs
    pub epoch: usize,
    /// State at the last duality gap evaluation
    pub summary: Record,
    /// Every gap evaluation, oldest first (empty unless requested)
    pub records: Vec<Record>,
    /// Every dataset evaluation, oldest first (empty unless requested)
    pub evals: Vec<Evaluation>,
}

/// A numerical engine that trains a linear multiclass model
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn optimize(&self, problem: &NativeProblem, params: &NativeParams) -> Result<NativeOutput>;
}

/// Stochastic dual coordinate ascent on the L2-regularized objectives
#[derive(Debug, Clone, Copy, Default)]
pub struct SdcaOptimizer;

impl SdcaOptimizer {
    pub fn new() -> Self {
        Self
    }
}

impl Optimizer for SdcaOptimizer {
    fn name(&self) -> &'static str {
        "stochastic dual coordinate ascent"
    }

    fn optimize(&self, problem: &NativeProblem, params: &NativeParams) -> Result<NativeOutput> {
        if problem.training().is_none() {
            return Err(SdcaError::SolverFailure("no training data".to_string()));
        }
        if problem.num_classes() < 2 {
            return Err(SdcaError::SolverFailure(format!(
                "need at least 2 classes, got {}",
                problem.num_classes()
            )));
        }

        let objective = build_objective(params.objective, params.k, params.c, problem.num_classes());
        let solver = SdcaSolver::new(problem, objective, params)?;
        Ok(solver.solve())
    }
}
