//! Continuous quadratic knapsack projections
//!
//! The equality case uses variable fixing (Kiwiel, "Variable fixing
//! algorithms for the continuous quadratic knapsack problem", 2008).

use super::{partition, sort_descending, Thresholds};

/// Euclidean projection onto `{x : <1, x> = rhs, lo <= x_i <= hi}`
///
/// `x` is permuted: on return `x[..first]` are clipped to `hi` and
/// `x[last..]` to `lo`.
pub fn thresholds_knapsack_eq(x: &mut [f64], lo: f64, hi: f64, rhs: f64) -> Thresholds {
    let n = x.len();
    if n == 0 {
        return Thresholds::new(0.0, lo, hi, 0, 0);
    }

    let mut t = (x.iter().sum::<f64>() - rhs) / n as f64;
    let (mut m_first, mut m_last) = (0, n);

    for _ in 0..n {
        // Feasibility check
        let tt = lo + t;
        let lo_it = m_first + partition(&mut x[m_first..m_last], |v| v > tt);
        let infeas_lo = (m_last - lo_it) as f64 * tt - x[lo_it..m_last].iter().sum::<f64>();

        let tt = hi + t;
        let hi_it = m_first + partition(&mut x[m_first..lo_it], |v| v > tt);
        let infeas_hi = x[m_first..hi_it].iter().sum::<f64>() - (hi_it - m_first) as f64 * tt;

        // Variable fixing with the incremental multiplier update
        let delta = if infeas_lo > infeas_hi {
            m_last = lo_it;
            infeas_lo
        } else if infeas_lo < infeas_hi {
            m_first = hi_it;
            -infeas_hi
        } else {
            m_first = hi_it;
            m_last = lo_it;
            break;
        };

        let size = m_last - m_first;
        if size == 0 {
            break;
        }
        t += delta / size as f64;
    }

    Thresholds::new(t, lo, hi, m_first, m_last)
}

/// Solve `min 0.5 * (<x, x> + rho * <1, x>^2) - <a, x>`
/// subject to `<1, x> <= rhs` and `lo <= x_i <= hi`
pub fn thresholds_knapsack_le_biased(
    x: &mut [f64],
    lo: f64,
    hi: f64,
    rhs: f64,
    rho: f64,
) -> Thresholds {
    let eps = f64::EPSILON * rhs.abs().max(1.0);

    // Active sum constraint
    let t = thresholds_knapsack_eq(x, lo, hi, rhs);
    if t.t >= rho * rhs - eps {
        return t;
    }

    knapsack_le_biased_search(x, lo, hi, rhs, rho)
}

fn knapsack_le_biased_search(x: &mut [f64], lo: f64, hi: f64, rhs: f64, rho: f64) -> Thresholds {
    let eps = f64::EPSILON * rhs.abs().max(1.0);
    sort_descending(x);

    let n = x.len();
    let rho_rhs = rho * rhs;
    let rho_inverse = 1.0 / rho;
    let mut num_u = 0.0;
    let mut min_u = f64::INFINITY;

    // Grow U starting with empty
    let mut m_first = 0;
    loop {
        let mut min_m = f64::INFINITY;
        let mut max_m = f64::NEG_INFINITY;
        let (mut num_m, mut sum_m) = (0.0, 0.0);
        let mut num_l = n as f64 - num_u;

        // Grow M starting with empty
        let mut m_last = m_first;
        loop {
            // t = (lo * |L| + hi * |U| + sum_M) / (1/rho + |M|)
            let t = (lo * num_l + hi * num_u + sum_m) / (rho_inverse + num_m);
            if t <= rho_rhs + eps {
                let tt = hi + t;
                if max_m - eps <= tt && tt <= min_u + eps {
                    let tt = lo + t;
                    if tt <= min_m + eps && (m_last == n || x[m_last] - eps <= tt) {
                        return Thresholds::new(t, lo, hi, m_first, m_last);
                    }
                }
            }

            if m_last == n {
                break;
            }
            min_m = x[m_last];
            max_m = x[m_first];
            sum_m += min_m;
            num_l -= 1.0;
            num_m += 1.0;
            m_last += 1;
        }

        if m_first == n {
            break;
        }
        min_u = x[m_first];
        num_u += 1.0;
        m_first += 1;
    }

    Thresholds::new(0.0, 0.0, 0.0, 0, 0)
}
