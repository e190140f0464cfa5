//! Core type definitions for the SDCA solver

use serde::{Deserialize, Serialize};
use std::fmt;

/// Solver state at the end of (or during) an optimization run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    None,
    Solving,
    /// Relative duality gap reached epsilon
    Solved,
    /// Dual objective stopped increasing
    NoProgress,
    MaxEpoch,
    MaxCpuTime,
    MaxWallTime,
    /// Hard numerical failure (negative gap, non-finite objective)
    Failed,
}

impl SolverStatus {
    pub fn name(&self) -> &'static str {
        match self {
            SolverStatus::None => "none",
            SolverStatus::Solving => "solving",
            SolverStatus::Solved => "solved",
            SolverStatus::NoProgress => "no_progress",
            SolverStatus::MaxEpoch => "max_epoch",
            SolverStatus::MaxCpuTime => "max_cpu_time",
            SolverStatus::MaxWallTime => "max_wall_time",
            SolverStatus::Failed => "failed",
        }
    }

    /// Terminated because a budget ran out or progress stalled
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            SolverStatus::NoProgress
                | SolverStatus::MaxEpoch
                | SolverStatus::MaxCpuTime
                | SolverStatus::MaxWallTime
        )
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When to stop the epoch loop
#[derive(Debug, Clone, PartialEq)]
pub struct StoppingCriteria {
    /// Relative duality gap tolerance
    pub epsilon: f64,
    /// Evaluate the duality gap once before the first epoch
    pub check_on_start: bool,
    /// Evaluate the duality gap every `check_epoch` epochs (0 = only at the end)
    pub check_epoch: usize,
    /// Maximum number of epochs
    pub max_epoch: usize,
    /// Process CPU time budget in seconds (0 = unlimited)
    pub max_cpu_time: f64,
    /// Wall clock budget in seconds (0 = unlimited)
    pub max_wall_time: f64,
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        Self {
            epsilon: 1e-3,
            check_on_start: false,
            check_epoch: 10,
            max_epoch: 1000,
            max_cpu_time: 0.0,
            max_wall_time: 0.0,
        }
    }
}

impl fmt::Display for StoppingCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epsilon = {}, check_on_start = {}, check_epoch = {}, max_epoch = {}, \
             max_cpu_time = {}, max_wall_time = {}",
            self.epsilon,
            self.check_on_start,
            self.check_epoch,
            self.max_epoch,
            self.max_cpu_time,
            self.max_wall_time
        )
    }
}

/// Convergence snapshot taken whenever the duality gap is evaluated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub epoch: usize,
    pub primal: f64,
    pub dual: f64,
    pub absolute_gap: f64,
    pub relative_gap: f64,
    pub primal_loss: f64,
    pub dual_loss: f64,
    pub regularizer: f64,
    /// Seconds
    pub wall_time: f64,
    pub solve_wall_time: f64,
    pub eval_wall_time: f64,
    /// Process CPU seconds
    #[serde(default)]
    pub cpu_time: f64,
    #[serde(default)]
    pub solve_cpu_time: f64,
    #[serde(default)]
    pub eval_cpu_time: f64,
}

/// Loss and top-k accuracies of the current model on one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEvaluation {
    /// Primal loss (scaled by the objective's loss coefficient)
    pub loss: f64,
    /// `accuracy[k - 1]` is the top-k accuracy, for k = 1..=num_classes
    pub accuracy: Vec<f64>,
}

impl DatasetEvaluation {
    /// Top-k accuracy, 0 when k is out of range
    pub fn top_k_accuracy(&self, k: usize) -> f64 {
        if k == 0 {
            return 0.0;
        }
        self.accuracy.get(k - 1).copied().unwrap_or(0.0)
    }
}

/// Evaluation checkpoint covering every dataset of the batch, training set first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub epoch: usize,
    pub datasets: Vec<DatasetEvaluation>,
}

impl Evaluation {
    pub fn training(&self) -> Option<&DatasetEvaluation> {
        self.datasets.first()
    }
}

/// Duality gap relative to the larger objective magnitude
pub fn relative_gap(primal: f64, dual: f64, gap: f64) -> f64 {
    let max = primal.abs().max(dual.abs());
    if max > 0.0 {
        if max < f64::INFINITY {
            gap / max
        } else {
            f64::INFINITY
        }
    } else {
        0.0
    }
}
