//! Solver configuration
//!
//! `SolverConfig` is a closed set of options. It can be built with struct
//! update syntax, through the builder on [`crate::api::Gateway`], parsed from
//! `name = value` string pairs, or loaded from a JSON file. Unknown option
//! names are rejected in every path.

use crate::core::error::{Result, SdcaError, ValidationError};
use crate::core::types::StoppingCriteria;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Verbosity of the solver's progress output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    #[serde(alias = "none")]
    Silent,
    Info,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Silent => "silent",
            LogLevel::Info => "info",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = SdcaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "silent" | "none" => Ok(LogLevel::Silent),
            "info" => Ok(LogLevel::Info),
            "verbose" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(SdcaError::Configuration(format!(
                "invalid log_level '{s}', valid options are: silent, info, verbose, debug"
            ))),
        }
    }
}

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Top-k hinge loss, alpha variant
    #[default]
    #[serde(rename = "topk_svm", alias = "l2_hinge_topk", alias = "topk_hinge_alpha")]
    TopKSvm,
    /// Top-k hinge loss, beta variant
    #[serde(rename = "l2_topk_hinge", alias = "topk_hinge_beta")]
    TopKHinge,
    /// Crammer-Singer multiclass SVM
    #[serde(rename = "msvm", alias = "multi_svm")]
    MultiSvm,
}

impl ObjectiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectiveKind::TopKSvm => "topk_svm",
            ObjectiveKind::TopKHinge => "l2_topk_hinge",
            ObjectiveKind::MultiSvm => "msvm",
        }
    }
}

impl FromStr for ObjectiveKind {
    type Err = SdcaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "topk_svm" | "l2_hinge_topk" | "topk_hinge_alpha" => Ok(ObjectiveKind::TopKSvm),
            "l2_topk_hinge" | "topk_hinge_beta" => Ok(ObjectiveKind::TopKHinge),
            "msvm" | "multi_svm" => Ok(ObjectiveKind::MultiSvm),
            _ => Err(SdcaError::Configuration(format!(
                "invalid objective '{s}', valid options are: topk_svm, l2_hinge_topk, \
                 topk_hinge_alpha, l2_topk_hinge, topk_hinge_beta, msvm, multi_svm"
            ))),
        }
    }
}

/// How the solver accumulates the sums of a gap evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Summation {
    #[default]
    #[serde(alias = "default")]
    Standard,
    /// Compensated (Kahan) summation
    Kahan,
}

impl Summation {
    pub fn name(&self) -> &'static str {
        match self {
            Summation::Standard => "standard",
            Summation::Kahan => "kahan",
        }
    }
}

impl FromStr for Summation {
    type Err = SdcaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" | "default" => Ok(Summation::Standard),
            "kahan" => Ok(Summation::Kahan),
            _ => Err(SdcaError::Configuration(format!(
                "invalid summation '{s}', valid options are: standard, default, kahan"
            ))),
        }
    }
}

/// Configuration of a single `solve` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub log_level: LogLevel,
    /// Top-k width, 1 <= k <= num_classes
    pub k: usize,
    /// Regularization strength, strictly positive
    #[serde(alias = "C")]
    pub c: f64,
    pub objective: ObjectiveKind,
    pub summation: Summation,
    pub epsilon: f64,
    #[serde(deserialize_with = "bool_or_count")]
    pub check_on_start: bool,
    pub check_epoch: usize,
    pub max_epoch: usize,
    pub max_cpu_time: f64,
    pub max_wall_time: f64,
    /// Seed of the example shuffling
    pub seed: u64,
    #[serde(deserialize_with = "bool_or_count")]
    pub return_records: bool,
    #[serde(deserialize_with = "bool_or_count")]
    pub return_evals: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let criteria = StoppingCriteria::default();
        Self {
            log_level: LogLevel::Silent,
            k: 1,
            c: 1.0,
            objective: ObjectiveKind::TopKSvm,
            summation: Summation::Standard,
            epsilon: criteria.epsilon,
            check_on_start: criteria.check_on_start,
            check_epoch: criteria.check_epoch,
            max_epoch: criteria.max_epoch,
            max_cpu_time: criteria.max_cpu_time,
            max_wall_time: criteria.max_wall_time,
            seed: 0,
            return_records: false,
            return_evals: false,
        }
    }
}

impl SolverConfig {
    /// Build a configuration from `name = value` pairs on top of the defaults
    ///
    /// `check_on_start`, `return_records` and `return_evals` accept booleans or counts
    /// (0 disables, any positive count enables).
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (name, value) in options {
            config.set_option(name.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Set a single option by name
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match name {
            "log_level" => self.log_level = value.parse()?,
            "k" => self.k = parse_value(name, value)?,
            "C" | "c" => self.c = parse_value(name, value)?,
            "objective" => self.objective = value.parse()?,
            "summation" => self.summation = value.parse()?,
            "epsilon" => self.epsilon = parse_value(name, value)?,
            "check_on_start" => self.check_on_start = parse_flag(name, value)?,
            "check_epoch" => self.check_epoch = parse_value(name, value)?,
            "max_epoch" => self.max_epoch = parse_value(name, value)?,
            "max_cpu_time" => self.max_cpu_time = parse_value(name, value)?,
            "max_wall_time" => self.max_wall_time = parse_value(name, value)?,
            "seed" => self.seed = parse_value(name, value)?,
            "return_records" => self.return_records = parse_flag(name, value)?,
            "return_evals" => self.return_evals = parse_flag(name, value)?,
            _ => {
                return Err(SdcaError::Configuration(format!(
                    "unrecognized option '{name}'"
                )))
            }
        }
        Ok(())
    }

    /// Load a configuration from a JSON object
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SdcaError::Configuration(e.to_string()))
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SdcaError::IoError)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SdcaError::Configuration(e.to_string()))
    }

    pub fn stopping_criteria(&self) -> StoppingCriteria {
        StoppingCriteria {
            epsilon: self.epsilon,
            check_on_start: self.check_on_start,
            check_epoch: self.check_epoch,
            max_epoch: self.max_epoch,
            max_cpu_time: self.max_cpu_time,
            max_wall_time: self.max_wall_time,
        }
    }

    /// Check the options that do not depend on the data
    pub fn check(&self) -> Result<()> {
        if !(self.epsilon >= 0.0 && self.epsilon.is_finite()) {
            return Err(SdcaError::Configuration(format!(
                "epsilon must be non-negative and finite, got {}",
                self.epsilon
            )));
        }
        if self.max_epoch == 0 {
            return Err(SdcaError::Configuration(
                "max_epoch must be positive".to_string(),
            ));
        }
        if !(self.max_cpu_time >= 0.0 && self.max_cpu_time.is_finite()) {
            return Err(SdcaError::Configuration(format!(
                "max_cpu_time must be non-negative and finite, got {}",
                self.max_cpu_time
            )));
        }
        if !(self.max_wall_time >= 0.0 && self.max_wall_time.is_finite()) {
            return Err(SdcaError::Configuration(format!(
                "max_wall_time must be non-negative and finite, got {}",
                self.max_wall_time
            )));
        }
        if self.objective == ObjectiveKind::MultiSvm && self.k != 1 {
            return Err(SdcaError::Configuration(format!(
                "objective msvm requires k = 1, got k = {}",
                self.k
            )));
        }
        Ok(())
    }

    /// Check every option against the number of classes of a solve call
    pub fn validate(&self, num_classes: usize) -> Result<()> {
        if self.k == 0 || self.k > num_classes {
            return Err(ValidationError::KOutOfRange {
                k: self.k,
                num_classes,
            }
            .into());
        }
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(ValidationError::NonPositiveC(self.c).into());
        }
        self.check()
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SdcaError::Configuration(format!("invalid value '{value}' for option '{name}'")))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => parse_value::<u64>(name, value).map(|count| count > 0),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrCount {
    Bool(bool),
    Count(u64),
}

fn bool_or_count<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match BoolOrCount::deserialize(deserializer)? {
        BoolOrCount::Bool(flag) => flag,
        BoolOrCount::Count(count) => count > 0,
    })
}
