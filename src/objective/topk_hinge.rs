//! Top-k hinge loss and the Crammer-Singer multiclass SVM
//!
//! Primal loss `sum of the k largest max{0, 1 + s_j - s_y}`, scaled by `C/k`.
//! The dual update is a biased knapsack projection with `hi = C/k`.
//! With `k = 1` this is the multiclass SVM of Crammer and Singer.

use super::{finish_update, hinge_margins, prepare_update, Objective};
use crate::prox::{prox_with, thresholds_knapsack_le_biased};

#[derive(Debug, Clone, PartialEq)]
pub struct TopKHinge {
    k: usize,
    c: f64,
    multiclass: bool,
}

impl TopKHinge {
    pub fn new(k: usize, c: f64) -> Self {
        Self {
            k,
            c,
            multiclass: false,
        }
    }

    /// Crammer-Singer multiclass SVM
    pub fn multiclass(c: f64) -> Self {
        Self {
            k: 1,
            c,
            multiclass: true,
        }
    }
}

impl Objective for TopKHinge {
    fn describe(&self) -> String {
        if self.multiclass {
            format!("msvm (C = {})", self.c)
        } else {
            format!("l2_topk_hinge (k = {}, C = {})", self.k, self.c)
        }
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
        let (lo, hi, rhs, rho) = (0.0, self.loss_coefficient(), self.c, 1.0);
        prepare_update(norm2, variables, scores);
        prox_with(&mut variables[1..], scratch, |x| {
            thresholds_knapsack_le_biased(x, lo, hi, rhs, rho)
        });
        finish_update(rhs, variables);
    }

    fn primal_loss(&self, scores: &mut [f64]) -> f64 {
        let margins = hinge_margins(scores);
        let k = self.k.min(margins.len());
        margins.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
        margins[..k].iter().filter(|&&m| m > 0.0).sum()
    }
}
