//! Configuration management and validation.
//!
//! Every stage receives its directories from [`PipelineConfig`] instead of
//! fixed relative paths, so stages can run against temporary directories.

use crate::constants::{
    BI_DIR, DIMENSIONAL_DIR, FALLBACK_YEARS, HEADER_CANDIDATE_ROWS, OUT_DIR, PROCESSED_DIR,
    RAW_DIR, TIME_SOURCE_STEM, VALID_YEAR_RANGE,
};
use crate::error::{EtlError, Result};
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported compression algorithms for the Parquet snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }

    /// Parse the CLI spelling (`snappy`, `zstd`, `lz4`, `none`)
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "snappy" => Ok(Self::Snappy),
            "zstd" => Ok(Self::Zstd),
            "lz4" => Ok(Self::Lz4),
            "none" | "uncompressed" => Ok(Self::Uncompressed),
            other => Err(EtlError::Configuration {
                message: format!("Unknown compression algorithm: {}", other),
            }),
        }
    }
}

/// Rules for building the time dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeDimensionConfig {
    /// Raw/clean table stem whose `(anio, trimestre)` pairs are used
    pub source_stem: String,

    /// Inclusive year window; pairs outside it are dropped
    pub valid_years: (i32, i32),

    /// Inclusive year range used when the source is unusable
    pub fallback_years: (i32, i32),

    /// Quarters used for every fallback year
    pub fallback_quarters: Vec<u32>,
}

impl Default for TimeDimensionConfig {
    fn default() -> Self {
        Self {
            source_stem: TIME_SOURCE_STEM.to_string(),
            valid_years: VALID_YEAR_RANGE,
            fallback_years: FALLBACK_YEARS,
            fallback_quarters: vec![1, 2, 3, 4],
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Compression used for the unified Parquet snapshot
    pub compression: CompressionAlgorithm,

    /// Also write the Parquet snapshot next to the unified CSV
    pub write_parquet_snapshot: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compression: CompressionAlgorithm::Snappy,
            write_parquet_snapshot: true,
        }
    }
}

/// Global configuration for a pipeline run. Fields missing from a config
/// file take the layout of [`PipelineConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw spreadsheets
    pub raw_dir: PathBuf,

    /// Cleaned `*_clean.csv` tables and the row summary
    pub processed_dir: PathBuf,

    /// `dim_*.csv` and per-file `fact_*.csv`
    pub dimensional_dir: PathBuf,

    /// Unified facts, dictionary, curated extracts and the run report
    pub out_dir: PathBuf,

    /// Dense-integer dimensions for BI tools
    pub bi_dir: PathBuf,

    /// Rows tried as header when the first row is not all text
    pub header_candidates: usize,

    pub time: TimeDimensionConfig,

    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_base_dir(Path::new("."))
    }
}

impl PipelineConfig {
    /// Standard `data/...` layout under a base directory
    pub fn from_base_dir(base: &Path) -> Self {
        Self {
            raw_dir: base.join(RAW_DIR),
            processed_dir: base.join(PROCESSED_DIR),
            dimensional_dir: base.join(DIMENSIONAL_DIR),
            out_dir: base.join(OUT_DIR),
            bi_dir: base.join(BI_DIR),
            header_candidates: HEADER_CANDIDATE_ROWS,
            time: TimeDimensionConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Load a JSON configuration file that lists only the fields it
    /// overrides
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtlError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Override the raw input directory
    pub fn with_raw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_dir = dir.into();
        self
    }

    /// Override the cleaned table directory
    pub fn with_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processed_dir = dir.into();
        self
    }

    /// Override the dimensional output directory
    pub fn with_dimensional_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dimensional_dir = dir.into();
        self
    }

    /// Override the curated output directory
    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    /// Override the BI output directory
    pub fn with_bi_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bi_dir = dir.into();
        self
    }

    /// Set the valid year window for the time dimension
    pub fn with_valid_years(mut self, first: i32, last: i32) -> Self {
        self.time.valid_years = (first, last);
        self
    }

    /// Set the fallback year range for the time dimension
    pub fn with_fallback_years(mut self, first: i32, last: i32) -> Self {
        self.time.fallback_years = (first, last);
        self
    }

    /// Set Parquet compression
    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.output.compression = compression;
        self
    }

    /// Skip the Parquet snapshot of the unified table
    pub fn without_parquet_snapshot(mut self) -> Self {
        self.output.write_parquet_snapshot = false;
        self
    }

    /// Reject configurations that would produce an empty or invalid time
    /// dimension
    pub fn validate(&self) -> Result<()> {
        let (first, last) = self.time.valid_years;
        if first > last {
            return Err(EtlError::Configuration {
                message: format!("Valid year window is empty: {}-{}", first, last),
            });
        }
        let (fb_first, fb_last) = self.time.fallback_years;
        if fb_first > fb_last || fb_first < first || fb_last > last {
            return Err(EtlError::Configuration {
                message: format!(
                    "Fallback years {}-{} must lie inside {}-{}",
                    fb_first, fb_last, first, last
                ),
            });
        }
        if self.time.fallback_quarters.is_empty()
            || self
                .time
                .fallback_quarters
                .iter()
                .any(|q| !(1..=4).contains(q))
        {
            return Err(EtlError::Configuration {
                message: format!(
                    "Fallback quarters must be a non-empty subset of 1..=4, got {:?}",
                    self.time.fallback_quarters
                ),
            });
        }
        if self.header_candidates == 0 {
            return Err(EtlError::Configuration {
                message: "header_candidates must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Create every output directory
    pub async fn ensure_output_dirs(&self) -> Result<()> {
        for dir in [
            &self.processed_dir,
            &self.dimensional_dir,
            &self.out_dir,
            &self.bi_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
