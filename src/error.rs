//! Error handling for the dimensional ETL.
//!
//! Per-file problems (unreadable sheets, odd shapes) are reported and
//! skipped by the orchestrator; `MissingColumns` on the unified table is the
//! one variant callers treat as fatal.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("Input not found at path: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Invalid spreadsheet layout in file: {path} - {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("Table {table} is missing required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("Dimension {dimension} violates an invariant: {reason}")]
    InvalidDimension { dimension: String, reason: String },

    #[error(
        "Fact table {table} references {missing} unknown keys in column {column} (e.g. {sample})"
    )]
    ReferentialIntegrity {
        table: String,
        column: String,
        missing: usize,
        sample: String,
    },

    #[error("Processing failed for file: {path} - {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl EtlError {
    /// Whether this error must halt the whole run instead of the current file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EtlError::MissingColumns { .. }
                | EtlError::Configuration { .. }
                | EtlError::ProcessingInterrupted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
