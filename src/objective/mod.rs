//! L2-regularized multiclass objectives
//!
//! An objective supplies the per-example dual update and the losses used to
//! compute the duality gap. All per-example slices passed to an objective
//! have the ground-truth class at index 0; the solver swaps it there and back.

pub mod topk_hinge;
pub mod topk_svm;

pub use self::topk_hinge::TopKHinge;
pub use self::topk_svm::TopKSvm;

use crate::core::ObjectiveKind;
use crate::utils::blas;

/// Primal and dual objective values at one checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObjectiveValues {
    pub primal: f64,
    pub dual: f64,
    pub gap: f64,
    pub primal_loss: f64,
    pub dual_loss: f64,
    pub regularizer: f64,
}

/// Loss-specific part of the SDCA solver
pub trait Objective: Send + Sync {
    /// Human readable description including parameters
    fn describe(&self) -> String;

    /// Multiplier applied to the summed primal loss
    fn loss_coefficient(&self) -> f64;

    /// Maximize the dual over one example's variables
    ///
    /// `variables` holds the example's dual variables and `scores` the current
    /// scores `W'x`, ground truth first. `norm2` is `<x, x>` and is positive.
    fn update_dual_variables(
        &self,
        norm2: f64,
        variables: &mut [f64],
        scores: &[f64],
        scratch: &mut Vec<f64>,
    );

    /// Unscaled primal loss of one example; `scores` is used as scratch space
    fn primal_loss(&self, scores: &mut [f64]) -> f64;

    /// Dual loss of one example
    fn dual_loss(&self, variables: &[f64]) -> f64 {
        variables[0]
    }

    /// Combine the summed losses and `<W, W>` into objective values
    fn combine(&self, primal_loss: f64, dual_loss: f64, regularizer: f64) -> ObjectiveValues {
        let primal_loss = primal_loss * self.loss_coefficient();
        let gap = primal_loss - dual_loss + regularizer;
        let half = 0.5 * regularizer;
        ObjectiveValues {
            primal: primal_loss + half,
            dual: dual_loss - half,
            gap,
            primal_loss,
            dual_loss,
            regularizer: half,
        }
    }
}

/// Build the objective for `kind`
///
/// `k` is clamped to `num_classes - 1`: the loss only ranks the classes
/// other than the ground truth.
pub fn build_objective(
    kind: ObjectiveKind,
    k: usize,
    c: f64,
    num_classes: usize,
) -> Box<dyn Objective> {
    let k = k.clamp(1, num_classes.saturating_sub(1).max(1));
    match kind {
        ObjectiveKind::TopKSvm => Box::new(TopKSvm::new(k, c)),
        ObjectiveKind::TopKHinge => Box::new(TopKHinge::new(k, c)),
        ObjectiveKind::MultiSvm => Box::new(TopKHinge::multiclass(c)),
    }
}

/// Shift the scores of the non ground-truth classes to `1 + s_j - s_y`
pub(crate) fn hinge_margins(scores: &mut [f64]) -> &mut [f64] {
    let a = 1.0 - scores[0];
    let (_, rest) = scores.split_at_mut(1);
    blas::add_scalar(a, rest);
    rest
}

/// Prepare `a * scores - variables` shifted for the projection; shared by
/// the hinge-type updates
pub(crate) fn prepare_update(norm2: f64, variables: &mut [f64], scores: &[f64]) {
    let a = 1.0 / norm2;
    blas::axpby(a, scores, -1.0, variables);
    let shift = a - variables[0];
    blas::add_scalar(shift, &mut variables[1..]);
}

/// Recover the dual variables from the projected ones
pub(crate) fn finish_update(c: f64, variables: &mut [f64]) {
    let sum: f64 = variables[1..].iter().sum();
    variables[0] = c.min(sum);
    blas::scal(-1.0, &mut variables[1..]);
}
