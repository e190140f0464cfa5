//! Top-k multiclass SVM
//!
//! Primal loss `max{0, sum of the k largest (1 + s_j - s_y)}`, scaled by `C/k`.
//! The dual update projects onto the biased top-k simplex.

use super::{finish_update, hinge_margins, prepare_update, Objective};
use crate::prox::{prox_with, thresholds_topk_simplex_biased};

#[derive(Debug, Clone, PartialEq)]
pub struct TopKSvm {
    k: usize,
    c: f64,
}

impl TopKSvm {
    pub fn new(k: usize, c: f64) -> Self {
        Self { k, c }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Objective for TopKSvm {
    fn describe(&self) -> String {
        format!("topk_svm (k = {}, C = {})", self.k, self.c)
    }

    fn loss_coefficient(&self) -> f64 {
        self.c / self.k as f64
    }

    fn update_dual_variables(
        &self,
        norm2: f64,
        variables: &mut [f64],
        scores: &[f64],
        scratch: &mut Vec<f64>,
    ) {
        let (k, rhs, rho) = (self.k, self.c, 1.0);
        prepare_update(norm2, variables, scores);
        prox_with(&mut variables[1..], scratch, |x| {
            thresholds_topk_simplex_biased(x, k, rhs, rho)
        });
        finish_update(rhs, variables);
    }

    fn primal_loss(&self, scores: &mut [f64]) -> f64 {
        let margins = hinge_margins(scores);
        let k = self.k.min(margins.len());
        margins.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
        margins[..k].iter().sum::<f64>().max(0.0)
    }
}
