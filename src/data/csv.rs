//! CSV format dataset implementation
//!
//! Supports loading datasets from CSV files where:
//! - The last column is the integer class label
//! - All other columns are features
//! - First row can be headers (automatically detected)

use super::{parse_label, LoadOptions};
use crate::core::{DataSource, Result, SdcaError};
use crate::data::{Dataset, FeatureMatrix};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Dataset implementation for CSV format files
#[derive(Debug, Clone)]
pub struct CSVDataset {
    rows: Vec<Vec<f64>>,
    labels: Vec<i32>,
    dimensions: usize,
}

impl CSVDataset {
    /// Load a dataset from a CSV file
    ///
    /// The last column is assumed to be the label.
    /// Headers are automatically detected if present.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SdcaError::IoError)?;
        let reader = BufReader::new(file);
        Self::from_reader(reader)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, true)
    }

    /// Load a dataset from a reader with explicit header option
    pub fn from_reader_with_options<R: BufRead>(
        reader: R,
        auto_detect_header: bool,
    ) -> Result<Self> {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut labels = Vec::new();
        let mut seen_first = false;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(SdcaError::IoError)?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Only the first data-bearing line can be a header
            let first = !seen_first;
            seen_first = true;
            if first && auto_detect_header && Self::is_header_line(line) {
                continue;
            }

            let (features, label) = Self::parse_data_line(line).map_err(|e| {
                SdcaError::ParseError(format!("Error parsing line {}: {}", line_num + 1, e))
            })?;

            if let Some(previous) = rows.first() {
                if previous.len() != features.len() {
                    return Err(SdcaError::ParseError(format!(
                        "line {} has {} features, expected {}",
                        line_num + 1,
                        features.len(),
                        previous.len()
                    )));
                }
            }
            rows.push(features);
            labels.push(label);
        }

        if rows.is_empty() {
            return Err(SdcaError::ParseError("No observations found".to_string()));
        }

        let dimensions = rows[0].len();
        Ok(CSVDataset {
            rows,
            labels,
            dimensions,
        })
    }

    /// Check if a line appears to be a header
    fn is_header_line(line: &str) -> bool {
        let fields: Vec<&str> = line.split(',').collect();

        if fields.len() < 2 {
            return false;
        }

        // Most feature columns non-numeric means a header
        let non_numeric_count = fields
            .iter()
            .take(fields.len() - 1)
            .filter(|field| field.trim().parse::<f64>().is_err())
            .count();

        non_numeric_count > fields.len() / 2
    }

    /// Parse a CSV data line into dense features and a label
    fn parse_data_line(line: &str) -> Result<(Vec<f64>, i32)> {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();

        if fields.len() < 2 {
            return Err(SdcaError::ParseError(format!(
                "Line has too few fields: {line}"
            )));
        }

        let (label_field, feature_fields) = fields.split_last().ok_or_else(|| {
            SdcaError::ParseError(format!("Line has too few fields: {line}"))
        })?;
        let label = parse_label(label_field)?;

        let features = feature_fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                field.parse::<f64>().map_err(|_| {
                    SdcaError::ParseError(format!(
                        "Invalid feature value at column {}: {}",
                        idx + 1,
                        field
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok((features, label))
    }
}

impl DataSource for CSVDataset {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn dim(&self) -> usize {
        self.dimensions
    }

    fn raw_labels(&self) -> &[i32] {
        &self.labels
    }

    fn to_dataset(&self, options: &LoadOptions) -> Result<Dataset> {
        let num_features = options.resolve_num_features(self.dimensions)?;
        let mut data = Vec::with_capacity(num_features * self.rows.len());
        for row in &self.rows {
            data.extend_from_slice(row);
            data.resize(data.len() + num_features - row.len(), 0.0);
        }
        let features = FeatureMatrix::from_column_major(data, num_features, self.rows.len())?;
        Ok(Dataset::new(features, options.convert_labels(&self.labels)))
    }
}
