//! Executable pipelines and the row frames they transform.

use crate::bundle::BundleError;
use crate::schema::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("column {0} not found in frame")]
    MissingColumn(String),
    #[error("column {0} already exists")]
    DuplicateColumn(String),
    #[error("column {column} expected {expected}, found {found}")]
    TypeMismatch { column: String, expected: &'static str, found: &'static str },
    #[error("unseen label {label:?} in column {column}")]
    UnseenLabel { column: String, label: String },
    #[error("index {index} out of range for column {column}")]
    IndexOutOfRange { column: String, index: i64 },
    #[error("row {0} not present in frame")]
    MissingRow(usize),
}

/// Column-named rows. Every row holds one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct LeapFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl LeapFrame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self { Self { columns, rows } }

    pub fn columns(&self) -> &[String] { &self.columns }
    pub fn rows(&self) -> &[Vec<Value>] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn column_index(&self, name: &str) -> Result<usize, TransformError> {
        self.columns.iter().position(|c| c == name).ok_or_else(|| TransformError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: &str) -> Result<&Value, TransformError> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx)).ok_or(TransformError::MissingRow(row))
    }

    /// Append `output` computed from `inputs` on every row. Rows for which
    /// `f` yields `None` are dropped from the frame.
    pub fn map_column<F>(mut self, inputs: &[String], output: &str, f: F) -> Result<Self, TransformError>
    where
        F: Fn(&[&Value]) -> Result<Option<Value>, TransformError>,
    {
        if self.columns.iter().any(|c| c == output) {
            return Err(TransformError::DuplicateColumn(output.to_string()));
        }
        let idx = inputs.iter().map(|c| self.column_index(c)).collect::<Result<Vec<_>, _>>()?;
        let mut rows = Vec::with_capacity(self.rows.len());
        for mut row in self.rows.drain(..) {
            let args: Vec<&Value> = idx.iter().map(|&i| &row[i]).collect();
            if let Some(v) = f(&args)? {
                row.push(v);
                rows.push(row);
            }
        }
        self.rows = rows;
        self.columns.push(output.to_string());
        Ok(self)
    }
}

/// A deserialized, ready-to-run transformation.
pub trait Pipeline: Send + Sync {
    fn transform(&self, frame: LeapFrame) -> Result<LeapFrame, TransformError>;
}

/// Turns a downloaded bundle file into a [`Pipeline`].
pub trait PipelineLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Pipeline>, BundleError>;
}
