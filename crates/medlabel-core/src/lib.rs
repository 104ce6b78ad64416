//! medlabel Core - Domain models, errors, and shared types
//!
//! This crate defines the core abstractions used throughout medlabel:
//! - Note records and label tables
//! - Common error types
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, DuplicatePolicy, ErrorMode, InputConfig, JoinConfig, LoggingConfig,
    NotesConfig, OffsetPolicy, OutputConfig, OutputFormat,
};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label column holding the 1-based start position of a span
pub const START_POSITION: &str = "Start Position";

/// Label column holding the inclusive end position of a span
pub const END_POSITION: &str = "End Position";

/// Column added to every label row with the sliced note text
pub const TEXT_COLUMN: &str = "Text";

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for medlabel operations
#[derive(Error, Debug)]
pub enum MedLabelError {
    #[error("Could not extract note id from {input}")]
    IdentifierMissing { input: String },

    #[error("Note not found for identifier {note_id} (label file {file})")]
    NoteNotFound { note_id: String, file: String },

    #[error("Duplicate note identifier {note_id} in {path}")]
    DuplicateNoteId { note_id: String, path: String },

    #[error(
        "Offset out of range in {file} row {row}: start {start}, end {end}, note length {len}"
    )]
    OffsetOutOfRange {
        file: String,
        row: usize,
        start: i64,
        end: i64,
        len: usize,
    },

    #[error("Schema error in {file}: {message}")]
    Schema { file: String, message: String },

    #[error("IO error reading {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Render error: {0}")]
    Render(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MedLabelError {
    /// Build a schema error for a file
    pub fn schema(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            file: file.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MedLabelError>;

// ============================================================================
// Notes
// ============================================================================

/// A clinical note: identifier plus full text body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: String,
    pub text: String,
}

impl Note {
    pub fn new(note_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            text: text.into(),
        }
    }
}

// ============================================================================
// Label Tables
// ============================================================================

/// An ordered, string-typed table read from a label CSV.
///
/// Every column of the source file is kept as-is so that enrichment only
/// ever adds information. Rows are always exactly as wide as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl LabelTable {
    /// Create an empty table with the given columns
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Create a table from headers and rows
    pub fn with_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell value by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Append a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Overwrite a column in place, or append it if absent.
    ///
    /// `values` must hold exactly one entry per row.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(MedLabelError::schema(
                "label table",
                format!(
                    "column '{name}' has {} values but table has {} rows",
                    values.len(),
                    self.rows.len()
                ),
            ));
        }

        match self.column_index(name) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[col] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }

        Ok(())
    }

    /// Append another table's rows below this one.
    ///
    /// Columns are unioned in order of first appearance; cells for columns
    /// a table did not have are left empty. Row order is preserved.
    pub fn append(&mut self, other: LabelTable) {
        if self.headers.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }

        let mut added = Vec::new();
        let mut mapping = Vec::with_capacity(other.headers.len());
        {
            let mut positions: HashMap<&str, usize> = self
                .headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.as_str(), i))
                .collect();
            let mut next = self.headers.len();
            for header in &other.headers {
                match positions.get(header.as_str()) {
                    Some(&i) => mapping.push(i),
                    None => {
                        positions.insert(header.as_str(), next);
                        added.push(header.clone());
                        mapping.push(next);
                        next += 1;
                    }
                }
            }
        }

        self.headers.extend(added);
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }

        for row in other.rows {
            let mut aligned = vec![String::new(); width];
            for (value, &target) in row.into_iter().zip(&mapping) {
                aligned[target] = value;
            }
            self.rows.push(aligned);
        }
    }

    /// Concatenate tables in iteration order
    pub fn concat(tables: impl IntoIterator<Item = LabelTable>) -> LabelTable {
        let mut combined = LabelTable::default();
        for table in tables {
            combined.append(table);
        }
        combined
    }
}

// ============================================================================
// Tests
// ============================================================================
