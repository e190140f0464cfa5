//! RSDCA Command Line Interface
//!
//! A command-line interface for training, evaluating, and using multiclass
//! top-k SVM models with LibSVM and CSV data formats.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use rsdca::core::{
    Classifier, DataSource, LogLevel, ObjectiveKind, Result, SdcaError, SolverConfig, Summation,
};
use rsdca::utils::stats;
use rsdca::{CSVDataset, Dataset, DatasetBatch, Gateway, LibSVMDataset, LoadOptions, ModelFile};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "rsdca")]
#[command(about = "Multiclass top-k SVM training by stochastic dual coordinate ascent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "RSDCA Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new model
    Train(TrainArgs),
    /// Make predictions using a trained model
    Predict(PredictArgs),
    /// Evaluate a model on labeled data
    Evaluate(EvaluateArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DataFormat {
    /// Detect from the file extension
    Auto,
    Libsvm,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliObjective {
    /// Top-k hinge loss, alpha variant (top-k SVM)
    #[value(name = "topk_svm")]
    TopKSvm,
    /// Top-k hinge loss, beta variant
    #[value(name = "l2_topk_hinge")]
    TopKHinge,
    /// Crammer-Singer multiclass SVM
    #[value(name = "msvm")]
    MultiSvm,
}

impl From<CliObjective> for ObjectiveKind {
    fn from(objective: CliObjective) -> Self {
        match objective {
            CliObjective::TopKSvm => ObjectiveKind::TopKSvm,
            CliObjective::TopKHinge => ObjectiveKind::TopKHinge,
            CliObjective::MultiSvm => ObjectiveKind::MultiSvm,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliSummation {
    Standard,
    /// Compensated summation of the losses
    Kahan,
}

impl From<CliSummation> for Summation {
    fn from(summation: CliSummation) -> Self {
        match summation {
            CliSummation::Standard => Summation::Standard,
            CliSummation::Kahan => Summation::Kahan,
        }
    }
}

#[derive(Args)]
struct DataArgs {
    /// Data format: auto, libsvm, or csv
    #[arg(short, long, value_enum, default_value = "auto")]
    format: DataFormat,

    /// Labels in the data files start at 1
    #[arg(long)]
    one_based_labels: bool,
}

#[derive(Args)]
struct TrainArgs {
    /// Training data file (LibSVM or CSV format)
    #[arg(long)]
    data: PathBuf,

    /// Test data file evaluated at every checkpoint (repeatable)
    #[arg(long)]
    test: Vec<PathBuf>,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    /// Number of classes (default: largest training label + 1)
    #[arg(short, long)]
    num_classes: Option<usize>,

    /// JSON configuration file; command line options take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Top-k width
    #[arg(short)]
    k: Option<usize>,

    /// Regularization parameter C
    #[arg(short = 'C', long)]
    c: Option<f64>,

    /// Training objective
    #[arg(long, value_enum)]
    objective: Option<CliObjective>,

    /// Relative duality gap tolerance
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Maximum number of epochs
    #[arg(long)]
    max_epoch: Option<usize>,

    /// Evaluate the duality gap every N epochs (0 = only at the end)
    #[arg(long)]
    check_epoch: Option<usize>,

    /// Evaluate the duality gap before the first epoch
    #[arg(long)]
    check_on_start: bool,

    /// CPU time budget in seconds (0 = unlimited)
    #[arg(long)]
    max_cpu_time: Option<f64>,

    /// Wall clock budget in seconds (0 = unlimited)
    #[arg(long)]
    max_wall_time: Option<f64>,

    /// Summation used for the objective values
    #[arg(long, value_enum)]
    summation: Option<CliSummation>,

    /// Shuffle seed
    #[arg(long)]
    seed: Option<u64>,

    /// Store convergence records in the model
    #[arg(long)]
    records: bool,

    /// Store dataset evaluations in the model
    #[arg(long)]
    evals: bool,

    #[command(flatten)]
    input: DataArgs,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of ranked classes to print per observation
    #[arg(long, default_value = "1")]
    top: usize,

    #[command(flatten)]
    input: DataArgs,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Test data file
    #[arg(long)]
    data: PathBuf,

    /// Report top-1 through top-K accuracy
    #[arg(long, default_value = "1")]
    top: usize,

    #[command(flatten)]
    input: DataArgs,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let solver_log_level = if cli.debug {
        LogLevel::Debug
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Silent
    };

    let result = match cli.command {
        Commands::Train(args) => train_command(args, solver_log_level),
        Commands::Predict(args) => predict_command(args),
        Commands::Evaluate(args) => evaluate_command(args),
        Commands::Info(args) => info_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn train_command(args: TrainArgs, log_level: LogLevel) -> Result<()> {
    let config = build_config(&args, log_level)?;
    info!("Training model on {:?}", args.data);
    info!("Parameters: {}", serde_json::to_string(&config).unwrap_or_default());

    let train_source = load_source(&args.data, args.input.format)?;
    let test_sources = args
        .test
        .iter()
        .map(|path| load_source(path, args.input.format))
        .collect::<Result<Vec<_>>>()?;

    // Every dataset shares the widest feature space
    let num_features = test_sources
        .iter()
        .map(|s| s.dim())
        .fold(train_source.dim(), usize::max);
    let options = LoadOptions::default()
        .with_num_features(num_features)
        .with_one_based_labels(args.input.one_based_labels);

    let train = train_source.to_dataset(&options)?;
    info!(
        "Loaded {} observations with {} features",
        train.num_observations(),
        num_features
    );

    let num_classes = match args.num_classes {
        Some(n) => n,
        None => {
            let n = stats::infer_num_classes(train.labels().as_slice());
            info!("Inferred {n} classes from the training labels");
            n
        }
    };
    let counts = stats::class_counts(train.labels().as_slice(), num_classes);
    info!("Class counts: {counts:?}");
    let ratio = stats::imbalance_ratio(&counts);
    if ratio > 10.0 {
        warn!("Training classes are imbalanced (largest / smallest = {ratio:.1})");
    }

    let mut batch = DatasetBatch::new().with(train);
    for (path, source) in args.test.iter().zip(&test_sources) {
        let test = source.to_dataset(&options)?;
        info!("Loaded {} test observations from {path:?}", test.num_observations());
        batch.push(test);
    }

    let model = Gateway::new()
        .with_config(config.clone())
        .solve(&batch, num_classes)?;
    info!(
        "Training finished: status {}, {} epoch(s), relative gap {:e}",
        model.status(),
        model.epoch(),
        model.relative_gap()
    );

    if let Some(train) = batch.training() {
        info!("Training accuracy: {:.2}%", model.accuracy(train)? * 100.0);
    }

    ModelFile::new(model)
        .with_config(config)
        .with_training_data(args.data.display().to_string())
        .save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);

    Ok(())
}

fn build_config(args: &TrainArgs, log_level: LogLevel) -> Result<SolverConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path:?}");
            SolverConfig::from_json_file(path)?
        }
        None => SolverConfig::default(),
    };
    config.log_level = config.log_level.max(log_level);
    if let Some(k) = args.k {
        config.k = k;
    }
    if let Some(c) = args.c {
        config.c = c;
    }
    if let Some(objective) = args.objective {
        config.objective = objective.into();
    }
    if let Some(epsilon) = args.epsilon {
        config.epsilon = epsilon;
    }
    if let Some(max_epoch) = args.max_epoch {
        config.max_epoch = max_epoch;
    }
    if let Some(check_epoch) = args.check_epoch {
        config.check_epoch = check_epoch;
    }
    config.check_on_start |= args.check_on_start;
    if let Some(max_cpu_time) = args.max_cpu_time {
        config.max_cpu_time = max_cpu_time;
    }
    if let Some(summation) = args.summation {
        config.summation = summation.into();
    }
    if let Some(max_wall_time) = args.max_wall_time {
        config.max_wall_time = max_wall_time;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.return_records |= args.records;
    config.return_evals |= args.evals;
    config.check()?;
    Ok(config)
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model_file = ModelFile::load_from_file(&args.model)?;
    let model = &model_file.model;

    info!("Loading prediction data from: {:?}", args.data);
    let dataset = load_dataset(&args.data, &args.input, model.num_features())?;
    let top = args.top.clamp(1, model.num_classes());

    let lines = (0..dataset.num_observations())
        .map(|i| {
            let x = dataset.features().observation(i);
            let ranked: Vec<String> = model.top_k(&x, top)?.iter().map(|c| c.to_string()).collect();
            Ok(format!("{} {}", i, ranked.join(" ")))
        })
        .collect::<Result<Vec<String>>>()?;

    let header = format!(
        "# Predictions for {} observations\n# Format: observation_index {}",
        lines.len(),
        if top > 1 {
            "ranked_classes..."
        } else {
            "predicted_class"
        }
    );

    if let Some(output_path) = args.output {
        let file = File::create(&output_path).map_err(SdcaError::IoError)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{header}").map_err(SdcaError::IoError)?;
        for line in &lines {
            writeln!(writer, "{line}").map_err(SdcaError::IoError)?;
        }
        writer.flush().map_err(SdcaError::IoError)?;
        info!("Predictions saved to: {output_path:?}");
    } else {
        println!("{header}");
        for line in &lines {
            println!("{line}");
        }
    }

    Ok(())
}

fn evaluate_command(args: EvaluateArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model_file = ModelFile::load_from_file(&args.model)?;
    let model = &model_file.model;

    info!("Loading test data from: {:?}", args.data);
    let dataset = load_dataset(&args.data, &args.input, model.num_features())?;
    let top = args.top.clamp(1, model.num_classes());

    println!("=== Model Evaluation ===");
    model_file.print_summary();

    println!("\nTest Results ({} observations):", dataset.num_observations());
    for k in 1..=top {
        println!(
            "  Top-{} Accuracy: {:.2}%",
            k,
            model.top_k_accuracy(&dataset, k)? * 100.0
        );
    }

    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model_file = ModelFile::load_from_file(&args.model)?;
    let model = &model_file.model;

    model_file.print_summary();

    println!("\nWeight Norms:");
    let n_show = model.num_classes().min(10);
    for c in 0..n_show {
        let w = model.class_weights(c);
        let norm = w.iter().map(|v| v * v).sum::<f64>().sqrt();
        println!("  class {c}: {norm:.6}");
    }
    if model.num_classes() > n_show {
        println!("  ... ({} more)", model.num_classes() - n_show);
    }

    if let Some(record) = model.records().last() {
        println!("\nLast Record:");
        println!("  Epoch: {}", record.epoch);
        println!("  Primal Loss: {:.10}", record.primal_loss);
        println!("  Dual Loss: {:.10}", record.dual_loss);
        println!("  Regularizer: {:.10}", record.regularizer);
    }

    Ok(())
}

fn load_dataset(path: &Path, input: &DataArgs, num_features: usize) -> Result<Dataset> {
    let options = LoadOptions::default()
        .with_num_features(num_features)
        .with_one_based_labels(input.one_based_labels);
    load_source(path, input.format)?.to_dataset(&options)
}

fn load_source(path: &Path, format: DataFormat) -> Result<Box<dyn DataSource>> {
    let format = match format {
        DataFormat::Auto => detect_format(path),
        other => other,
    };
    info!("Loading {path:?} as {format:?}");
    Ok(match format {
        DataFormat::Csv => Box::new(CSVDataset::from_file(path)?),
        _ => Box::new(LibSVMDataset::from_file(path)?),
    })
}

fn detect_format(path: &Path) -> DataFormat {
    if let Some(ext) = path.extension() {
        match ext.to_str() {
            Some("csv") => DataFormat::Csv,
            Some("libsvm") | Some("svm") => DataFormat::Libsvm,
            _ => {
                warn!("Unknown file extension, assuming LibSVM format");
                DataFormat::Libsvm
            }
        }
    } else {
        warn!("No file extension, assuming LibSVM format");
        DataFormat::Libsvm
    }
}
