//! Model serialization and persistence
//!
//! Trained models are stored as pretty-printed JSON together with metadata
//! describing how they were produced.

use crate::core::{Classifier, Result, SdcaError, SolverConfig};
use crate::model::Model;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// On-disk representation of a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub model: Model,
    pub metadata: ModelMetadata,
}

/// Model metadata for tracking and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Configuration of the solve call, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SolverConfig>,
    /// Training data the model was fitted on, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_data: Option<String>,
}

impl ModelFile {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
                config: None,
                training_data: None,
            },
        }
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.metadata.config = Some(config);
        self
    }

    pub fn with_training_data(mut self, name: impl Into<String>) -> Self {
        self.metadata.training_data = Some(name.into());
        self
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(SdcaError::IoError)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| SdcaError::SerializationError(e.to_string()))?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SdcaError::IoError)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| SdcaError::SerializationError(e.to_string()))
    }

    /// Print model summary
    pub fn print_summary(&self) {
        let model = &self.model;
        println!("=== SDCA Model Summary ===");
        println!("Objective: {}", model.objective().name());
        println!("Features: {}", model.num_features());
        println!("Classes: {}", model.num_classes());
        println!("k: {}", model.k());
        println!("C: {}", model.c());
        println!("Status: {}", model.status());
        println!("Epochs: {}", model.epoch());
        println!("Primal: {:.10}", model.primal());
        println!("Dual: {:.10}", model.dual());
        println!("Relative Gap: {:e}", model.relative_gap());
        println!("Wall Time: {:.6}s", model.wall_time());
        println!("CPU Time: {:.6}s", model.summary().cpu_time);
        if !model.records().is_empty() {
            println!("Records: {}", model.records().len());
        }
        if let Some(last) = model.evals().last() {
            for (i, dataset) in last.datasets.iter().enumerate() {
                let name = if i == 0 {
                    "train".to_string()
                } else {
                    format!("test {i}")
                };
                println!(
                    "Top-1 Accuracy ({}): {:.2}%",
                    name,
                    dataset.top_k_accuracy(1) * 100.0
                );
            }
        }
        println!("Library Version: {}", self.metadata.library_version);
        println!("Created: {}", self.metadata.created_at);
        if let Some(data) = &self.metadata.training_data {
            println!("Training Data: {data}");
        }
    }
}
