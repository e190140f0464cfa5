//! LibSVM format dataset implementation
//!
//! Supports loading multiclass datasets in the libsvm format:
//! label index:value index:value ...
//!
//! Example:
//! 0 1:0.5 3:1.2 7:0.8
//! 2 2:0.3 5:2.1

use super::{parse_label, LoadOptions};
use crate::core::{DataSource, Result, SdcaError};
use crate::data::{Dataset, FeatureMatrix};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Sparse row of a LibSVM file, zero-based indices
#[derive(Debug, Clone, PartialEq)]
struct SparseRow {
    indices: Vec<usize>,
    values: Vec<f64>,
}

/// Dataset implementation for LibSVM format files
#[derive(Debug, Clone)]
pub struct LibSVMDataset {
    rows: Vec<SparseRow>,
    labels: Vec<i32>,
    dimensions: usize,
}

impl LibSVMDataset {
    /// Load a dataset from a LibSVM format file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SdcaError::IoError)?;
        let reader = BufReader::new(file);
        Self::from_reader(reader)
    }

    /// Load a dataset from a reader (for testing and flexibility)
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let mut max_dimension = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(SdcaError::IoError)?;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match Self::parse_line(line) {
                Ok((label, row)) => {
                    if let Some(&last) = row.indices.last() {
                        max_dimension = max_dimension.max(last + 1);
                    }
                    labels.push(label);
                    rows.push(row);
                }
                Err(e) => {
                    return Err(SdcaError::ParseError(format!(
                        "Error parsing line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }

        if rows.is_empty() {
            return Err(SdcaError::ParseError("No observations found".to_string()));
        }

        Ok(LibSVMDataset {
            rows,
            labels,
            dimensions: max_dimension,
        })
    }

    /// Parse a single line in libsvm format
    fn parse_line(line: &str) -> Result<(i32, SparseRow)> {
        let mut parts = line.split_whitespace();

        let label = match parts.next() {
            Some(token) => parse_label(token)?,
            None => return Err(SdcaError::ParseError("Empty line".to_string())),
        };

        let mut pairs = Vec::new();
        for feature_str in parts {
            let (index, value) = feature_str.split_once(':').ok_or_else(|| {
                SdcaError::ParseError(format!("Invalid feature format: {feature_str}"))
            })?;

            let index = index
                .parse::<usize>()
                .map_err(|_| SdcaError::ParseError(format!("Invalid feature index: {index}")))?;

            let value = value
                .parse::<f64>()
                .map_err(|_| SdcaError::ParseError(format!("Invalid feature value: {value}")))?;

            // libsvm uses 1-based indexing, convert to 0-based
            if index == 0 {
                return Err(SdcaError::ParseError(format!(
                    "Feature index must be positive: {index}"
                )));
            }
            pairs.push((index - 1, value));
        }

        pairs.sort_by_key(|&(idx, _)| idx);
        let (indices, values) = pairs.into_iter().unzip();
        Ok((label, SparseRow { indices, values }))
    }
}

impl DataSource for LibSVMDataset {
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
        let mut data = vec![0.0; num_features * self.rows.len()];
        for (i, row) in self.rows.iter().enumerate() {
            let column = &mut data[num_features * i..num_features * (i + 1)];
            for (&idx, &value) in row.indices.iter().zip(&row.values) {
                column[idx] = value;
            }
        }
        let features = FeatureMatrix::from_column_major(data, num_features, self.rows.len())?;
        Ok(Dataset::new(features, options.convert_labels(&self.labels)))
    }
}
