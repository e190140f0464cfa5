//! Stochastic dual coordinate ascent (SDCA) solver
//!
//! Trains `W` (`d × T`, column-major) by maximizing the dual over one example
//! at a time. The dual variables `A` (`T × n`) are kept in sync with the
//! primal ones through `W = X * A'`. Every `check_epoch` epochs the duality
//! gap is evaluated and the stopping criteria are checked.

use crate::core::{
    relative_gap, DatasetEvaluation, Evaluation, LogLevel, Record, Result, SdcaError,
    SolverStatus,
};
use crate::marshal::{NativeDataset, NativeProblem};
use crate::objective::{Objective, ObjectiveValues};
use crate::optimizer::{NativeOutput, NativeParams};
use crate::utils::blas;
use crate::utils::sum::{self, Accumulator};
use crate::utils::timing::{CpuStopwatch, Stopwatch};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Dual objective must grow at least by this factor between checks
const SUFFICIENT_INCREASE: f64 = 1.0 - 16.0 * f64::EPSILON;

/// Negative gaps within this relative tolerance are attributed to roundoff
const NEGATIVE_GAP_TOLERANCE: f64 = 1e3 * f64::EPSILON;

/// Single-run SDCA state over one marshalled problem
pub struct SdcaSolver<'a> {
    params: &'a NativeParams,
    objective: Box<dyn Objective>,
    train: &'a NativeDataset,
    datasets: &'a [NativeDataset],
    num_classes: usize,
    num_features: usize,

    weights: Vec<f64>,
    dual_variables: Vec<f64>,
    norms: Vec<f64>,
    examples: Vec<usize>,
    rng: StdRng,

    scores: Vec<f64>,
    vars_before: Vec<f64>,
    scratch: Vec<f64>,
    diff_tolerance: f64,

    status: SolverStatus,
    epoch: usize,
    current: ObjectiveValues,
    summary: Option<Record>,
    records: Vec<Record>,
    evals: Vec<Evaluation>,
    solve_watch: Stopwatch,
    eval_watch: Stopwatch,
    solve_cpu_watch: CpuStopwatch,
    eval_cpu_watch: CpuStopwatch,
}

impl<'a> SdcaSolver<'a> {
    pub fn new(
        problem: &'a NativeProblem,
        objective: Box<dyn Objective>,
        params: &'a NativeParams,
    ) -> Result<Self> {
        let train = problem
            .training()
            .ok_or_else(|| SdcaError::SolverFailure("no training data".to_string()))?;
        let num_classes = problem.num_classes();
        let num_features = train.num_features();
        let n = train.num_observations();

        let norms = (0..n)
            .map(|i| {
                let x = train.observation(i);
                blas::dot(x, x)
            })
            .collect();

        Ok(Self {
            params,
            objective,
            train,
            datasets: problem.datasets(),
            num_classes,
            num_features,
            weights: vec![0.0; num_features * num_classes],
            dual_variables: vec![0.0; num_classes * n],
            norms,
            examples: (0..n).collect(),
            rng: StdRng::seed_from_u64(params.seed),
            scores: vec![0.0; num_classes],
            vars_before: vec![0.0; num_classes],
            scratch: Vec::with_capacity(num_classes),
            diff_tolerance: 2.0 * num_classes as f64 * f64::EPSILON,
            status: SolverStatus::None,
            epoch: 0,
            current: ObjectiveValues {
                primal: f64::INFINITY,
                dual: f64::NEG_INFINITY,
                gap: f64::INFINITY,
                ..ObjectiveValues::default()
            },
            summary: None,
            records: Vec::new(),
            evals: Vec::new(),
            solve_watch: Stopwatch::new(),
            eval_watch: Stopwatch::new(),
            solve_cpu_watch: CpuStopwatch::new(),
            eval_cpu_watch: CpuStopwatch::new(),
        })
    }

    /// Run epochs until a stopping criterion is met
    pub fn solve(mut self) -> NativeOutput {
        let criteria = self.params.criteria.clone();
        if self.params.log_level >= LogLevel::Info {
            info!(
                "sdca: {} (examples = {}, features = {}, classes = {}; {})",
                self.objective.describe(),
                self.train.num_observations(),
                self.num_features,
                self.num_classes,
                criteria
            );
        }

        self.status = SolverStatus::Solving;
        self.solve_watch.start();
        self.solve_cpu_watch.start();
        let mut recompute_gap = false;

        if criteria.check_on_start {
            self.compute_duality_gap();
        }

        while self.status == SolverStatus::Solving {
            self.examples.shuffle(&mut self.rng);
            for idx in 0..self.examples.len() {
                let i = self.examples[idx];
                self.solve_example(i);
            }
            self.epoch += 1;
            self.solve_watch.stop();
            self.solve_cpu_watch.stop();
            recompute_gap = true;

            if criteria.check_epoch > 0 && self.epoch % criteria.check_epoch == 0 {
                self.compute_duality_gap();
                recompute_gap = false;
            } else if self.params.log_level >= LogLevel::Debug {
                debug!(
                    "  epoch: {:3}, solve_wall_time: {:.6}, eval_wall_time: {:.6}, cpu_time: {:.6}",
                    self.epoch,
                    self.solve_watch.elapsed(),
                    self.eval_watch.elapsed(),
                    self.cpu_time()
                );
            }

            if self.status == SolverStatus::Solving {
                if self.epoch >= criteria.max_epoch {
                    self.status = SolverStatus::MaxEpoch;
                    self.debug_warning(format_args!("epoch limit: {}", self.epoch));
                } else if criteria.max_cpu_time > 0.0 && self.cpu_time() >= criteria.max_cpu_time {
                    self.status = SolverStatus::MaxCpuTime;
                    self.debug_warning(format_args!("cpu time limit: {:.6}", self.cpu_time()));
                } else if criteria.max_wall_time > 0.0 && self.wall_time() >= criteria.max_wall_time
                {
                    self.status = SolverStatus::MaxWallTime;
                    self.debug_warning(format_args!("wall time limit: {:.6}", self.wall_time()));
                }
            }
            self.solve_watch.resume();
            self.solve_cpu_watch.resume();
        }
        self.solve_watch.stop();
        self.solve_cpu_watch.stop();

        if recompute_gap {
            self.compute_duality_gap();
        }

        if self.params.log_level >= LogLevel::Info {
            info!(
                "sdca: status: {} (epoch = {}, relative_gap = {:e}, solve_wall_time: {:.6}, \
                 eval_wall_time: {:.6}, cpu_time: {:.6})",
                self.status,
                self.epoch,
                relative_gap(self.current.primal, self.current.dual, self.current.gap),
                self.solve_watch.elapsed(),
                self.eval_watch.elapsed(),
                self.cpu_time()
            );
        }

        let summary = match self.summary.take() {
            Some(record) => record,
            None => self.make_record(),
        };
        NativeOutput {
            weights: self.weights,
            dual_variables: self.dual_variables,
            status: self.status,
            epoch: self.epoch,
            summary,
            records: if self.params.return_records {
                self.records
            } else {
                Vec::new()
            },
            evals: if self.params.return_evals {
                self.evals
            } else {
                Vec::new()
            },
        }
    }

    fn wall_time(&self) -> f64 {
        self.solve_watch.elapsed() + self.eval_watch.elapsed()
    }

    fn cpu_time(&self) -> f64 {
        self.solve_cpu_watch.elapsed() + self.eval_cpu_watch.elapsed()
    }

    fn debug_warning(&self, message: std::fmt::Arguments<'_>) {
        if self.params.log_level >= LogLevel::Debug {
            debug!("  (warning) {message}");
        }
    }

    fn solve_example(&mut self, i: usize) {
        let norm2 = self.norms[i];
        if norm2 <= 0.0 {
            return;
        }

        let t = self.num_classes;
        let d = self.num_features;
        let train = self.train;
        let label = train.labels()[i];
        let x = train.observation(i);

        // scores = W' * x_i
        blas::gemv_t(&self.weights, d, x, &mut self.scores);

        let vars = &mut self.dual_variables[t * i..t * (i + 1)];
        self.vars_before.copy_from_slice(vars);

        // Ground truth first
        vars.swap(0, label);
        self.scores.swap(0, label);
        self.objective
            .update_dual_variables(norm2, vars, &self.scores, &mut self.scratch);
        vars.swap(0, label);

        // W += x_i * (a_i - a_i_before)'
        blas::axpby(1.0, vars, -1.0, &mut self.vars_before);
        if blas::asum(&self.vars_before) > self.diff_tolerance {
            blas::ger(x, &self.vars_before, &mut self.weights);
        }
    }

    fn compute_duality_gap(&mut self) {
        let dual_before = self.current.dual;

        self.eval_watch.resume();
        self.eval_cpu_watch.resume();
        self.evaluate_solution();
        self.eval_watch.stop();
        self.eval_cpu_watch.stop();

        let ObjectiveValues {
            primal, dual, gap, ..
        } = self.current;
        let max = primal.abs().max(dual.abs());
        if !(primal.is_finite() && dual.is_finite() && gap.is_finite()) {
            self.status = SolverStatus::Failed;
            self.debug_warning(format_args!(
                "failed due to non-finite objective: primal = {primal}, dual = {dual}"
            ));
        } else if gap <= max * self.params.criteria.epsilon {
            self.status = SolverStatus::Solved;
            if gap < -max * NEGATIVE_GAP_TOLERANCE {
                self.status = SolverStatus::Failed;
                self.debug_warning(format_args!("failed due to negative duality gap: {gap}"));
            }
        } else if dual < SUFFICIENT_INCREASE * dual_before {
            self.status = SolverStatus::NoProgress;
            self.debug_warning(format_args!(
                "no progress due to insufficient dual objective increase: {}",
                dual - dual_before
            ));
        }

        let record = self.make_record();
        if self.params.log_level >= LogLevel::Verbose {
            info!(
                "  epoch: {:3}, primal: {:.10}, dual: {:.10}, absolute_gap: {:e}, relative_gap: {:e}, wall_time: {:.6}",
                record.epoch,
                record.primal,
                record.dual,
                record.absolute_gap,
                record.relative_gap,
                record.wall_time
            );
        }
        self.records.push(record.clone());
        self.summary = Some(record);
    }

    fn make_record(&self) -> Record {
        let v = &self.current;
        Record {
            epoch: self.epoch,
            primal: v.primal,
            dual: v.dual,
            absolute_gap: v.gap,
            relative_gap: relative_gap(v.primal, v.dual, v.gap),
            primal_loss: v.primal_loss,
            dual_loss: v.dual_loss,
            regularizer: v.regularizer,
            wall_time: self.wall_time(),
            solve_wall_time: self.solve_watch.elapsed(),
            eval_wall_time: self.eval_watch.elapsed(),
            cpu_time: self.cpu_time(),
            solve_cpu_time: self.solve_cpu_watch.elapsed(),
            eval_cpu_time: self.eval_cpu_watch.elapsed(),
        }
    }

    /// Recompute `W` from `A`, then the objectives and every dataset's metrics
    fn evaluate_solution(&mut self) {
        let t = self.num_classes;
        let d = self.num_features;
        let train = self.train;
        blas::gemm_nt(train.features(), d, &self.dual_variables, t, &mut self.weights);

        let summation = self.params.summation;
        let regularizer = sum::dot(summation, &self.weights, &self.weights);
        let mut dual_loss = Accumulator::new(summation);
        let mut train_loss = Accumulator::new(summation);
        let mut accuracy = vec![0.0; t];

        for i in 0..train.num_observations() {
            let label = train.labels()[i];
            blas::gemv_t(&self.weights, d, train.observation(i), &mut self.scores);
            self.scores.swap(0, label);
            count_rank(&self.scores, &mut accuracy);

            let vars = &self.dual_variables[t * i..t * (i + 1)];
            self.vars_before.copy_from_slice(vars);
            self.vars_before.swap(0, label);
            dual_loss.add(self.objective.dual_loss(&self.vars_before));
            train_loss.add(self.objective.primal_loss(&mut self.scores));
        }

        self.current = self
            .objective
            .combine(train_loss.value(), dual_loss.value(), regularizer);
        finish_accuracy(&mut accuracy, train.num_observations());

        let mut datasets = vec![DatasetEvaluation {
            loss: self.current.primal_loss,
            accuracy,
        }];
        let all: &'a [NativeDataset] = self.datasets;
        let tests = &all[1..];
        for test in tests {
            datasets.push(self.evaluate_test(test));
        }
        self.evals.push(Evaluation {
            epoch: self.epoch,
            datasets,
        });
    }

    fn evaluate_test(&mut self, test: &NativeDataset) -> DatasetEvaluation {
        let t = self.num_classes;
        let mut accuracy = vec![0.0; t];
        let mut loss = Accumulator::new(self.params.summation);
        for i in 0..test.num_observations() {
            blas::gemv_t(&self.weights, self.num_features, test.observation(i), &mut self.scores);
            self.scores.swap(0, test.labels()[i]);
            count_rank(&self.scores, &mut accuracy);
            loss.add(self.objective.primal_loss(&mut self.scores));
        }
        finish_accuracy(&mut accuracy, test.num_observations());
        DatasetEvaluation {
            loss: loss.value() * self.objective.loss_coefficient(),
            accuracy,
        }
    }
}

/// Count how many other classes score at least as high as the ground truth
/// (at index 0); ties count against the prediction
fn count_rank(scores: &[f64], counts: &mut [f64]) {
    let rank = scores[1..].iter().filter(|&&s| s >= scores[0]).count();
    counts[rank] += 1.0;
}

/// Turn rank counts into top-k accuracies
fn finish_accuracy(counts: &mut [f64], num_examples: usize) {
    let mut total = 0.0;
    for c in counts.iter_mut() {
        total += *c;
        *c = total;
    }
    if num_examples > 0 {
        blas::scal(1.0 / num_examples as f64, counts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectiveKind, SolverConfig, Summation};
    use crate::objective::build_objective;
    use approx::assert_abs_diff_eq;
    use log::{Level, LevelFilter, Log, Metadata};
    use std::cell::RefCell;
    use std::sync::Once;

    thread_local! {
        static CAPTURED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    /// Collects the messages logged on the current thread
    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            CAPTURED.with(|c| c.borrow_mut().push(format!("{} {}", record.level(), record.args())));
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INIT: Once = Once::new();

    fn capture_logs<F: FnOnce()>(f: F) -> Vec<String> {
        INIT.call_once(|| {
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(LevelFilter::Debug);
            }
        });
        CAPTURED.with(|c| c.borrow_mut().clear());
        f();
        CAPTURED.with(|c| c.borrow_mut().drain(..).collect())
    }

    fn separable_problem(with_test: bool) -> NativeProblem {
        // 3 features (the last a constant bias), 4 observations, 2 classes
        let train = NativeDataset::new(
            vec![2.0, 0.0, 1.0, 0.0, 2.0, 1.0, 3.0, 0.0, 1.0, 0.0, 3.0, 1.0],
            vec![0, 1, 0, 1],
            3,
        )
        .unwrap();
        let mut datasets = vec![train];
        if with_test {
            datasets.push(
                NativeDataset::new(vec![4.0, 0.0, 1.0, 0.0, 4.0, 1.0], vec![0, 1], 3).unwrap(),
            );
        }
        NativeProblem::new(datasets, 2)
    }

    fn run(problem: &NativeProblem, config: &SolverConfig) -> NativeOutput {
        let params = NativeParams::from(config);
        let objective = build_objective(config.objective, config.k, config.c, problem.num_classes());
        SdcaSolver::new(problem, objective, &params).unwrap().solve()
    }

    #[test]
    fn test_count_rank_and_accuracy() {
        let mut counts = vec![0.0; 3];
        count_rank(&[1.0, 0.5, 0.2], &mut counts);
        count_rank(&[1.0, 1.0, 0.2], &mut counts);
        count_rank(&[0.0, 1.0, 2.0], &mut counts);
        finish_accuracy(&mut counts, 3);
        assert_abs_diff_eq!(counts[0], 1.0 / 3.0);
        assert_abs_diff_eq!(counts[1], 2.0 / 3.0);
        assert_abs_diff_eq!(counts[2], 1.0);
    }

    #[test]
    fn test_solves_separable_problem() {
        let config = SolverConfig {
            return_records: true,
            return_evals: true,
            check_epoch: 1,
            ..SolverConfig::default()
        };
        let problem = separable_problem(true);
        let output = run(&problem, &config);

        assert_eq!(output.status, SolverStatus::Solved);
        assert_eq!(output.records.len(), output.epoch);
        assert!(output.summary.relative_gap <= config.epsilon);

        // Every training example is ranked first
        let last = output.evals.last().unwrap();
        assert_eq!(last.datasets.len(), 2);
        assert_abs_diff_eq!(last.datasets[0].top_k_accuracy(1), 1.0);
        assert_abs_diff_eq!(last.datasets[1].top_k_accuracy(1), 1.0);
    }

    #[test]
    fn test_dual_increases_and_gap_nonnegative() {
        let config = SolverConfig {
            return_records: true,
            check_epoch: 1,
            epsilon: 0.0,
            max_epoch: 15,
            objective: ObjectiveKind::TopKHinge,
            ..SolverConfig::default()
        };
        let output = run(&separable_problem(false), &config);

        for pair in output.records.windows(2) {
            assert!(pair[1].dual >= pair[0].dual - 1e-12);
        }
        for record in &output.records {
            assert!(record.absolute_gap >= -1e-10);
            assert!(record.primal >= record.dual - 1e-10);
        }
    }

    #[test]
    fn test_final_gap_computed_when_unchecked() {
        let config = SolverConfig {
            return_records: true,
            check_epoch: 0,
            max_epoch: 3,
            ..SolverConfig::default()
        };
        let output = run(&separable_problem(false), &config);
        assert_eq!(output.epoch, 3);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].epoch, 3);
    }

    #[test]
    fn test_max_epoch_status() {
        let config = SolverConfig {
            epsilon: 0.0,
            check_epoch: 5,
            max_epoch: 2,
            ..SolverConfig::default()
        };
        let output = run(&separable_problem(false), &config);
        assert_eq!(output.epoch, 2);
        assert!(matches!(
            output.status,
            SolverStatus::MaxEpoch | SolverStatus::Solved
        ));
    }

    #[test]
    fn test_weights_match_dual_variables() {
        let config = SolverConfig {
            max_epoch: 4,
            check_epoch: 0,
            ..SolverConfig::default()
        };
        let problem = separable_problem(false);
        let params = NativeParams::from(&config);
        let objective = build_objective(config.objective, 1, 1.0, 2);
        let mut solver = SdcaSolver::new(&problem, objective, &params).unwrap();
        for i in 0..4 {
            solver.solve_example(i);
        }
        let incremental = solver.weights.clone();
        solver.evaluate_solution();
        for (a, b) in incremental.iter().zip(&solver.weights) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_same_seed_same_model() {
        let config = SolverConfig {
            max_epoch: 3,
            seed: 7,
            ..SolverConfig::default()
        };
        let problem = separable_problem(false);
        assert_eq!(run(&problem, &config).weights, run(&problem, &config).weights);
    }

    /// Observation 2 is all zeros; the same data is also passed as a test set
    fn problem_with_zero_observation() -> NativeProblem {
        let data = vec![2.0, 0.0, 1.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 3.0, 1.0];
        let labels = vec![0, 1, 0, 1];
        let train = NativeDataset::new(data.clone(), labels.clone(), 3).unwrap();
        let test = NativeDataset::new(data, labels, 3).unwrap();
        NativeProblem::new(vec![train, test], 2)
    }

    #[test]
    fn test_zero_observation_counts_in_training_loss() {
        let config = SolverConfig {
            return_evals: true,
            check_epoch: 5,
            max_epoch: 50,
            ..SolverConfig::default()
        };
        let output = run(&problem_with_zero_observation(), &config);

        // The zero observation scores 0 for every class and costs a hinge of 1
        for eval in &output.evals {
            assert_abs_diff_eq!(eval.datasets[0].loss, eval.datasets[1].loss, epsilon = 1e-9);
            assert!(eval.datasets[0].loss >= 1.0 - 1e-9);
        }
        assert!(output.summary.primal_loss >= 1.0 - 1e-9);
        assert!(output.summary.absolute_gap >= 1.0 - 1e-9);
        assert_ne!(output.status, SolverStatus::Solved);
    }

    #[test]
    fn test_check_on_start_records_initial_gap() {
        let config = SolverConfig {
            return_records: true,
            check_on_start: true,
            check_epoch: 1,
            max_epoch: 3,
            epsilon: 0.0,
            ..SolverConfig::default()
        };
        let output = run(&separable_problem(false), &config);
        let first = &output.records[0];
        assert_eq!(first.epoch, 0);
        // W = 0: every example has a hinge loss of 1 and the dual is 0
        assert_abs_diff_eq!(first.primal, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(first.dual, 0.0, epsilon = 1e-12);
        assert_eq!(output.records.len(), output.epoch + 1);

        let unchecked = run(
            &separable_problem(false),
            &SolverConfig {
                check_on_start: false,
                ..config
            },
        );
        assert_eq!(unchecked.records[0].epoch, 1);
    }

    #[test]
    fn test_max_cpu_time_status() {
        let config = SolverConfig {
            epsilon: 0.0,
            check_epoch: 0,
            max_epoch: usize::MAX,
            max_cpu_time: 1e-9,
            return_records: true,
            ..SolverConfig::default()
        };
        let output = run(&problem_with_zero_observation(), &config);
        assert_eq!(output.status, SolverStatus::MaxCpuTime);
        assert!(output.summary.cpu_time >= config.max_cpu_time);
        assert!(output.summary.solve_cpu_time > 0.0);
    }

    #[test]
    fn test_dual_variables_returned() {
        let config = SolverConfig {
            max_epoch: 5,
            ..SolverConfig::default()
        };
        let problem = separable_problem(false);
        let output = run(&problem, &config);
        assert_eq!(output.dual_variables.len(), 2 * 4);

        // W = X * A'
        let mut weights = vec![0.0; 3 * 2];
        let train = problem.training().unwrap();
        blas::gemm_nt(train.features(), 3, &output.dual_variables, 2, &mut weights);
        for (a, b) in weights.iter().zip(&output.weights) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_kahan_summation_agrees() {
        let standard = SolverConfig {
            max_epoch: 20,
            check_epoch: 5,
            ..SolverConfig::default()
        };
        let kahan = SolverConfig {
            summation: Summation::Kahan,
            ..standard.clone()
        };
        let problem = separable_problem(true);
        let a = run(&problem, &standard);
        let b = run(&problem, &kahan);
        assert_eq!(a.weights, b.weights);
        assert_abs_diff_eq!(a.summary.primal, b.summary.primal, epsilon = 1e-12);
        assert_abs_diff_eq!(a.summary.dual, b.summary.dual, epsilon = 1e-12);
    }

    #[test]
    fn test_solver_warnings_follow_log_level() {
        let config = SolverConfig {
            epsilon: 0.0,
            check_epoch: 1,
            max_epoch: 2,
            ..SolverConfig::default()
        };
        let problem = problem_with_zero_observation();

        let silent = capture_logs(|| {
            run(&problem, &config);
        });
        assert!(silent.is_empty(), "unexpected output: {silent:?}");

        let debug = capture_logs(|| {
            run(
                &problem,
                &SolverConfig {
                    log_level: LogLevel::Debug,
                    ..config.clone()
                },
            );
        });
        let prefix = format!("{} ", Level::Debug);
        assert!(debug
            .iter()
            .any(|line| line.starts_with(&prefix) && line.contains("(warning)")));
    }
}
