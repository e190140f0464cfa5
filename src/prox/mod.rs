//! Proximal operators used by the dual updates
//!
//! Every operator here solves a separable problem whose solution has the
//! form `x_i = max(lo, min(a_i - t, hi))`. The `thresholds_*` functions
//! compute `(t, lo, hi)` on a scratch slice, permuting it so that the
//! elements clipped to `hi` come first and those clipped to `lo` come last;
//! [`Thresholds::apply`] then maps the original vector in place.

pub mod knapsack;
pub mod topk;

pub use self::knapsack::{thresholds_knapsack_eq, thresholds_knapsack_le_biased};
pub use self::topk::{
    thresholds_topk_cone_biased, thresholds_topk_simplex_biased, topk_cone_special_cases,
    ConeProjection,
};

/// Solution parameters of a clipped-shift projection
///
/// `first..last` is the index range of the scratch slice (after the threshold
/// computation permuted it) holding the unclipped elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub t: f64,
    pub lo: f64,
    pub hi: f64,
    pub first: usize,
    pub last: usize,
}

impl Thresholds {
    pub fn new(t: f64, lo: f64, hi: f64, first: usize, last: usize) -> Self {
        Self {
            t,
            lo,
            hi,
            first,
            last,
        }
    }

    /// The projection that maps everything to zero
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0, 0)
    }

    #[inline]
    pub fn map(&self, x: f64) -> f64 {
        self.lo.max((x - self.t).min(self.hi))
    }

    /// Overwrite `x` with its projection
    pub fn apply(&self, x: &mut [f64]) {
        for v in x.iter_mut() {
            *v = self.map(*v);
        }
    }
}

/// Compute thresholds on a copy of `x` held in `scratch`, then project `x`
pub fn prox_with<F>(x: &mut [f64], scratch: &mut Vec<f64>, compute: F) -> Thresholds
where
    F: FnOnce(&mut [f64]) -> Thresholds,
{
    scratch.clear();
    scratch.extend_from_slice(x);
    let thresholds = compute(scratch.as_mut_slice());
    thresholds.apply(x);
    thresholds
}

/// Move elements satisfying `pred` to the front; returns how many there are
pub(crate) fn partition<F: Fn(f64) -> bool>(x: &mut [f64], pred: F) -> usize {
    let mut first = 0;
    for i in 0..x.len() {
        if pred(x[i]) {
            x.swap(first, i);
            first += 1;
        }
    }
    first
}

pub(crate) fn sort_descending(x: &mut [f64]) {
    x.sort_unstable_by(|a, b| b.total_cmp(a));
}
