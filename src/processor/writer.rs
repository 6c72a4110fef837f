//! Table writing for pipeline outputs
//!
//! Every output is written to a temporary sibling first and renamed into
//! place, so a failed write never leaves a truncated table behind.

use crate::config::{CompressionAlgorithm, PipelineConfig};
use crate::error::{EtlError, Result};

use polars::prelude::{CsvWriter, DataFrame, ParquetWriter, SerWriter};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// CSV and Parquet writer with the run's output settings
#[derive(Debug, Clone)]
pub struct TableWriter {
    compression: CompressionAlgorithm,
}

impl TableWriter {
    /// Create a new writer
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            compression: config.output.compression,
        }
    }

    /// Write `df` as comma-separated UTF-8 with a header row. Returns the
    /// number of data rows written.
    pub fn write_csv(&self, df: &mut DataFrame, path: &Path) -> Result<usize> {
        self.write_atomically(path, |file| {
            CsvWriter::new(file)
                .include_header(true)
                .with_separator(b',')
                .finish(df)
        })?;
        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(df.height())
    }

    /// Write `df` as a Parquet snapshot
    pub fn write_parquet(&self, df: &mut DataFrame, path: &Path) -> Result<usize> {
        let compression = self.compression.to_polars_compression();
        self.write_atomically(path, |file| {
            ParquetWriter::new(file)
                .with_compression(compression)
                .finish(df)
                .map(|_| ())
        })?;
        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(df.height())
    }

    fn write_atomically<F>(&self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> polars::error::PolarsResult<()>,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temporary_path(path);
        let mut file = File::create(&tmp)?;
        if let Err(e) = write(&mut file) {
            drop(file);
            let _ = fs::remove_file(&tmp);
            return Err(EtlError::ProcessingFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to write table: {}", e),
            });
        }
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
