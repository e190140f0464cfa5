//! Utility functions for the SDCA solver

/// Dense level-1/2/3 kernels on column-major `f64` buffers
pub mod blas {
    #[inline]
    pub fn dot(x: &[f64], y: &[f64]) -> f64 {
        x.iter().zip(y).map(|(a, b)| a * b).sum()
    }

    /// Sum of absolute values
    #[inline]
    pub fn asum(x: &[f64]) -> f64 {
        x.iter().map(|v| v.abs()).sum()
    }

    /// `y += a * x`
    #[inline]
    pub fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
        for (yi, &xi) in y.iter_mut().zip(x) {
            *yi += a * xi;
        }
    }

    /// `y = a * x + b * y`
    #[inline]
    pub fn axpby(a: f64, x: &[f64], b: f64, y: &mut [f64]) {
        for (yi, &xi) in y.iter_mut().zip(x) {
            *yi = a * xi + b * *yi;
        }
    }

    #[inline]
    pub fn scal(a: f64, x: &mut [f64]) {
        for v in x.iter_mut() {
            *v *= a;
        }
    }

    #[inline]
    pub fn add_scalar(a: f64, x: &mut [f64]) {
        for v in x.iter_mut() {
            *v += a;
        }
    }

    /// `out = W' * x` for a `rows × cols` column-major `W`
    pub fn gemv_t(w: &[f64], rows: usize, x: &[f64], out: &mut [f64]) {
        for (c, o) in out.iter_mut().enumerate() {
            *o = dot(&w[rows * c..rows * (c + 1)], x);
        }
    }

    /// `W += x * y'` for a `rows × cols` column-major `W`
    pub fn ger(x: &[f64], y: &[f64], w: &mut [f64]) {
        let rows = x.len();
        for (c, &yc) in y.iter().enumerate() {
            if yc != 0.0 {
                axpy(yc, x, &mut w[rows * c..rows * (c + 1)]);
            }
        }
    }

    /// `W = X * A'` with `X` of shape `d × n` and `A` of shape `t × n`
    pub fn gemm_nt(x: &[f64], d: usize, a: &[f64], t: usize, w: &mut [f64]) {
        w.iter_mut().for_each(|v| *v = 0.0);
        let n = if d == 0 { 0 } else { x.len() / d };
        for i in 0..n {
            ger(&x[d * i..d * (i + 1)], &a[t * i..t * (i + 1)], w);
        }
    }
}

/// Compensated and plain accumulation of long sums
pub mod sum {
    use crate::core::Summation;

    /// Running sum of `f64` terms
    #[derive(Debug, Clone, Copy)]
    pub struct Accumulator {
        summation: Summation,
        sum: f64,
        compensation: f64,
    }

    impl Accumulator {
        pub fn new(summation: Summation) -> Self {
            Self {
                summation,
                sum: 0.0,
                compensation: 0.0,
            }
        }

        #[inline]
        pub fn add(&mut self, value: f64) {
            match self.summation {
                Summation::Standard => self.sum += value,
                Summation::Kahan => {
                    let y = value - self.compensation;
                    let t = self.sum + y;
                    self.compensation = (t - self.sum) - y;
                    self.sum = t;
                }
            }
        }

        pub fn value(&self) -> f64 {
            self.sum
        }
    }

    /// `<x, y>` accumulated with `summation`
    pub fn dot(summation: Summation, x: &[f64], y: &[f64]) -> f64 {
        let mut acc = Accumulator::new(summation);
        for (a, b) in x.iter().zip(y) {
            acc.add(a * b);
        }
        acc.value()
    }
}

/// Wall clock and process CPU timing
pub mod timing {
    use cpu_time::ProcessTime;
    use std::time::Instant;

    /// A point in time on some clock
    pub trait Clock: Copy {
        fn now() -> Self;

        /// Seconds since `self`
        fn seconds_since(&self) -> f64;
    }

    impl Clock for Instant {
        fn now() -> Self {
            Instant::now()
        }

        fn seconds_since(&self) -> f64 {
            self.elapsed().as_secs_f64()
        }
    }

    impl Clock for ProcessTime {
        fn now() -> Self {
            ProcessTime::now()
        }

        fn seconds_since(&self) -> f64 {
            self.elapsed().as_secs_f64()
        }
    }

    /// Accumulating stopwatch, wall clock by default
    #[derive(Debug, Clone)]
    pub struct Stopwatch<C: Clock = Instant> {
        elapsed: f64,
        mark: Option<C>,
    }

    /// Stopwatch over the CPU time of the whole process
    pub type CpuStopwatch = Stopwatch<ProcessTime>;

    impl<C: Clock> Default for Stopwatch<C> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<C: Clock> Stopwatch<C> {
        pub fn new() -> Self {
            Self {
                elapsed: 0.0,
                mark: None,
            }
        }

        /// Reset and start running
        pub fn start(&mut self) {
            self.elapsed = 0.0;
            self.resume();
        }

        pub fn resume(&mut self) {
            self.mark = Some(C::now());
        }

        /// Stop running and add the time since the last resume
        pub fn stop(&mut self) {
            if let Some(mark) = self.mark.take() {
                self.elapsed += mark.seconds_since();
            }
        }

        /// Seconds accumulated so far, including a running interval
        pub fn elapsed(&self) -> f64 {
            self.elapsed + self.mark.map_or(0.0, |m| m.seconds_since())
        }
    }
}

/// Label statistics
pub mod stats {
    /// Number of observations per class; labels outside `[0, num_classes)` are ignored
    pub fn class_counts(labels: &[i32], num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for &y in labels {
            if y >= 0 && (y as usize) < num_classes {
                counts[y as usize] += 1;
            }
        }
        counts
    }

    /// Smallest number of classes that covers every label (largest label + 1)
    pub fn infer_num_classes(labels: &[i32]) -> usize {
        labels.iter().copied().max().map_or(0, |m| (m.max(-1) + 1) as usize)
    }

    /// Ratio of the largest to the smallest non-empty class
    pub fn imbalance_ratio(counts: &[usize]) -> f64 {
        let present: Vec<usize> = counts.iter().copied().filter(|&c| c > 0).collect();
        match (present.iter().max(), present.iter().min()) {
            (Some(&max), Some(&min)) => max as f64 / min as f64,
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Summation;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gemv_t() {
        // W is 2 × 3 column-major
        let w = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = vec![0.0; 3];
        blas::gemv_t(&w, 2, &[1.0, -1.0], &mut out);
        assert_eq!(out, vec![-1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_ger_and_gemm() {
        // X: 2 features, 2 observations; A: 2 classes, 2 observations
        let x = vec![1.0, 0.0, 0.0, 2.0];
        let a = vec![0.5, -0.5, -1.0, 1.0];
        let mut w = vec![9.0; 4];
        blas::gemm_nt(&x, 2, &a, 2, &mut w);
        // W[:, c] = sum_i x_i * a[c, i]
        assert_eq!(w, vec![0.5, -2.0, -0.5, 2.0]);
    }

    #[test]
    fn test_axpby_and_asum() {
        let mut y = vec![1.0, -2.0];
        blas::axpby(2.0, &[1.0, 1.0], -1.0, &mut y);
        assert_eq!(y, vec![1.0, 4.0]);
        assert_abs_diff_eq!(blas::asum(&[-1.0, 2.0, -3.0]), 6.0);
    }

    #[test]
    fn test_stopwatch_accumulates() {
        let mut watch: timing::Stopwatch = timing::Stopwatch::new();
        assert_eq!(watch.elapsed(), 0.0);
        watch.start();
        watch.stop();
        let first = watch.elapsed();
        watch.resume();
        watch.stop();
        assert!(watch.elapsed() >= first);
    }

    #[test]
    fn test_cpu_stopwatch_accumulates() {
        let mut watch = timing::CpuStopwatch::new();
        watch.start();
        let mut x = 0.0_f64;
        for i in 0..100_000 {
            x += (i as f64).sqrt();
        }
        assert!(x > 0.0);
        watch.stop();
        let first = watch.elapsed();
        assert!(first >= 0.0);
        watch.resume();
        assert!(watch.elapsed() >= first);
    }

    #[test]
    fn test_kahan_sum_recovers_small_terms() {
        // 1 + 1e-16 * 10 loses every small term in plain summation
        let mut plain = sum::Accumulator::new(Summation::Standard);
        let mut kahan = sum::Accumulator::new(Summation::Kahan);
        for v in std::iter::once(1.0).chain(std::iter::repeat(1e-16).take(10)) {
            plain.add(v);
            kahan.add(v);
        }
        assert_eq!(plain.value(), 1.0);
        assert!(kahan.value() > 1.0);
        assert_abs_diff_eq!(kahan.value(), 1.0 + 1e-15, epsilon = 3e-16);
        assert_eq!(sum::dot(Summation::Kahan, &[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }

    #[test]
    fn test_class_counts() {
        let counts = stats::class_counts(&[0, 2, 2, 1, 2, 7, -1], 3);
        assert_eq!(counts, vec![1, 1, 3]);
        assert_eq!(stats::infer_num_classes(&[0, 2, 1]), 3);
        assert_eq!(stats::infer_num_classes(&[]), 0);
        assert_abs_diff_eq!(stats::imbalance_ratio(&counts), 3.0);
        assert_abs_diff_eq!(stats::imbalance_ratio(&[0, 0]), 1.0);
    }
}
