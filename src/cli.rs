//! Command-line interface components.

use crate::config::{CompressionAlgorithm, PipelineConfig};
use crate::error::Result;
use crate::processor::Stage;
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "enacom-etl")]
#[command(about = "Build a star-schema dimensional model from telecom market spreadsheets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Stage to run; `all` runs every stage in order
    #[arg(value_enum, default_value_t = Stage::All)]
    pub stage: Stage,

    /// Base directory holding `data/raw` and `data/processed`
    #[arg(short, long, default_value = ".")]
    pub base_dir: PathBuf,

    /// JSON configuration file; replaces the layout derived from --base-dir
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long)]
    pub compression: Option<String>,

    /// Skip the Parquet snapshot of the unified table
    #[arg(long)]
    pub no_parquet: bool,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Pipeline configuration from the config file or base directory, with
    /// command-line overrides applied
    pub fn build_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::from_base_dir(&self.base_dir),
        };
        if let Some(name) = &self.compression {
            config = config.with_compression(CompressionAlgorithm::parse(name)?);
        }
        if self.no_parquet {
            config = config.without_parquet_snapshot();
        }
        config.validate()?;
        debug!("Using configuration: {:?}", config);
        Ok(config)
    }
}

/// Set up structured logging on stderr. `RUST_LOG` overrides the level.
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("enacom_etl={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {}", log_level);
}
