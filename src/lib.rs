//! Multiclass top-k SVM training by stochastic dual coordinate ascent (SDCA)
//!
//! Based on "Loss Functions for Top-k Error: Analysis and Insights" and
//! "Top-k Multiclass SVM" by Lapin, Hein and Schiele.

pub mod api;
pub mod core;
pub mod data;
pub mod marshal;
pub mod model;
pub mod objective;
pub mod optimizer;
pub mod persistence;
pub mod prox;
pub mod solver;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{solve, validate, Gateway};
pub use crate::core::config::*;
pub use crate::core::error::*;
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::data::{
    CSVDataset, Dataset, DatasetBatch, FeatureMatrix, LabelVector, Layout, LibSVMDataset,
    LoadOptions,
};
pub use crate::model::Model;
pub use crate::optimizer::{NativeOutput, NativeParams, Optimizer, SdcaOptimizer};
pub use crate::persistence::ModelFile;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
