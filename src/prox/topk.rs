//! Top-k cone and simplex projections
//!
//! The biased top-k simplex is the feasible set of the top-k SVM dual:
//! `{x : <1, x> <= rhs, 0 <= x_i <= <1, x> / k}`. With the extra
//! `rho * <1, x>^2 / 2` term the problem is
//! `min 0.5 * (<x, x> + rho * <1, x>^2) - <a, x>`.

use super::knapsack::thresholds_knapsack_eq;
use super::{sort_descending, Thresholds};

/// Outcome of the cheap top-k cone checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConeProjection {
    /// The projection is zero
    Zero(Thresholds),
    /// The `k` largest elements share the value `hi`, the rest are zero
    Constant(Thresholds),
    /// Neither; a full search is needed
    General,
}

/// Detect the zero and constant cases of a top-k cone projection
///
/// `div` is `k` for the plain cone and `k + rho * k^2` for the biased one.
/// Partially orders `x` so its `k` largest elements come first.
pub fn topk_cone_special_cases(x: &mut [f64], k: usize, div: f64) -> ConeProjection {
    let n = x.len();
    debug_assert!(k >= 1 && k <= n);
    x.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));

    let eps = 16.0 * f64::EPSILON;
    let sum_k_largest: f64 = x[..k].iter().sum();
    if sum_k_largest <= eps {
        return ConeProjection::Zero(Thresholds::zero());
    }

    let hi = sum_k_largest / div;
    let t = x[k - 1] - hi;
    let max_rest = x[k..].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if k == n || t >= max_rest - eps {
        return ConeProjection::Constant(Thresholds::new(t, 0.0, hi, k, k));
    }

    ConeProjection::General
}

/// Biased top-k cone projection by search over sorted data
fn topk_cone_biased_search(x: &mut [f64], k: usize, rho: f64) -> Thresholds {
    sort_descending(x);

    let n = x.len();
    let kf = k as f64;
    let mut k_minus_num_u = kf;
    let mut num_u_plus_rho_k2 = rho * kf * kf;
    let mut min_u = f64::INFINITY;
    let mut sum_u = 0.0;
    let eps = 16.0 * f64::EPSILON;

    // Grow U starting with empty
    let mut m_first = 0;
    loop {
        let mut min_m = f64::INFINITY;
        let mut max_m = f64::NEG_INFINITY;
        let mut sum_m = 0.0;
        let mut num_m_sum_u = 0.0;
        let mut d = k_minus_num_u * k_minus_num_u;
        let k_minus_num_u_sum_u = k_minus_num_u * sum_u;

        // Grow M starting with empty
        let mut m_last = m_first;
        loop {
            //  t = ((|U| + rho k^2) sum_M - (k - |U|) sum_U) / D
            // hi = (|M| sum_U + (k - |U|) sum_M) / D
            //  D = (k - |U|)^2 + (|U| + rho k^2) |M|
            let t = (num_u_plus_rho_k2 * sum_m - k_minus_num_u_sum_u) / d;
            let hi = (num_m_sum_u + k_minus_num_u * sum_m) / d;
            let tt = hi + t;
            if max_m - eps <= tt
                && tt <= min_u + eps
                && t <= min_m + eps
                && (m_last == n || x[m_last] - eps <= t)
            {
                return Thresholds::new(t, 0.0, hi, m_first, m_last);
            }

            if m_last == n {
                break;
            }
            min_m = x[m_last];
            max_m = x[m_first];
            sum_m += min_m;
            num_m_sum_u += sum_u;
            d += num_u_plus_rho_k2;
            m_last += 1;
        }

        if m_first == k {
            break;
        }
        min_u = x[m_first];
        sum_u += min_u;
        k_minus_num_u -= 1.0;
        num_u_plus_rho_k2 += 1.0;
        m_first += 1;
    }

    Thresholds::zero()
}

/// Projection onto the biased top-k cone `{x : 0 <= x_i <= <1, x> / k}`
pub fn thresholds_topk_cone_biased(x: &mut [f64], k: usize, rho: f64) -> Thresholds {
    let kf = k as f64;
    match topk_cone_special_cases(x, k, kf + rho * kf * kf) {
        ConeProjection::Zero(t) | ConeProjection::Constant(t) => t,
        ConeProjection::General => topk_cone_biased_search(x, k, rho),
    }
}

/// Whether the knapsack solution with upper set `u` violates the cone
/// optimality condition, so the sum constraint is not active
fn is_topk_simplex_biased_lt(u: &[f64], t: f64, k: f64, rhs: f64, rho: f64, eps: f64) -> bool {
    if u.is_empty() {
        t < rho * rhs - eps
    } else {
        let num_u = u.len() as f64;
        let sum_u: f64 = u.iter().sum();
        k * (sum_u + (k - num_u) * t) < rhs * (num_u + rho * k * k) - eps
    }
}

/// Projection onto the biased top-k simplex
/// `{x : <1, x> <= rhs, 0 <= x_i <= <1, x> / k}`
pub fn thresholds_topk_simplex_biased(x: &mut [f64], k: usize, rhs: f64, rho: f64) -> Thresholds {
    let kf = k as f64;
    let eps = f64::EPSILON * rhs.abs().max(1.0);

    match topk_cone_special_cases(x, k, kf + rho * kf * kf) {
        ConeProjection::Zero(t) => t,
        ConeProjection::Constant(t) => {
            if kf * t.hi > rhs + eps {
                thresholds_knapsack_eq(x, 0.0, rhs / kf, rhs)
            } else {
                t
            }
        }
        ConeProjection::General => {
            let t = thresholds_knapsack_eq(x, 0.0, rhs / kf, rhs);
            if is_topk_simplex_biased_lt(&x[..t.first], t.t, kf, rhs, rho, eps) {
                topk_cone_biased_search(x, k, rho)
            } else {
                t
            }
        }
    }
}
