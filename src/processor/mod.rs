//! Pipeline orchestration.
//!
//! Runs the ETL stages in order (clean, dimensions, facts, unify,
//! dictionary, curate) and collects a [`StageReport`] for each. Stages only
//! communicate through files on disk, so any stage can be run on its own
//! against the outputs of an earlier run. A stage removes the outputs of
//! earlier runs that it no longer produces, so a failed input never leaves
//! an old table published.

pub mod clean;
pub mod curate;
pub mod discovery;
pub mod facts;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::discovery::{FileDiscovery, remove_stale};
use self::writer::TableWriter;

use crate::config::PipelineConfig;
use crate::constants::{DICTIONARY_FILE, SUMMARY_FILE, UNIFIED_FACT_STEM};
use crate::dictionary::build_dictionary;
use crate::dimensions::DimensionSet;
use crate::error::{EtlError, Result};
use crate::models::{PipelineStats, StageReport, TimeOrigin, source_stem};
use crate::report::write_report;
use crate::resolver::KeyResolver;
use crate::schema::read_csv_table;
use crate::unify::{long_chunk, unify};

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, error, info, warn};

/// A pipeline stage as selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    Clean,
    Dimensions,
    Facts,
    Unify,
    Dictionary,
    Curate,
    All,
}

impl Stage {
    /// Stages run by [`Stage::All`], in order
    pub const SEQUENCE: [Stage; 6] = [
        Stage::Clean,
        Stage::Dimensions,
        Stage::Facts,
        Stage::Unify,
        Stage::Dictionary,
        Stage::Curate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::Dimensions => "dimensions",
            Stage::Facts => "facts",
            Stage::Unify => "unify",
            Stage::Dictionary => "dictionary",
            Stage::Curate => "curate",
            Stage::All => "all",
        }
    }
}

/// Runs pipeline stages against one configuration
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    config: Arc<PipelineConfig>,
    writer: TableWriter,
    show_progress: bool,
}

impl PipelineRunner {
    /// Create a runner; the configuration is validated up front
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let writer = TableWriter::new(&config);
        Ok(Self {
            config: Arc::new(config),
            writer,
            show_progress: false,
        })
    }

    /// Show progress bars while iterating files
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one stage, or every stage for [`Stage::All`], then write the run
    /// report. A fatal error stops the run.
    pub async fn run(&self, stage: Stage) -> Result<PipelineStats> {
        let start_time = Instant::now();
        println!("{}", "Starting dimensional ETL".bright_green().bold());
        println!(
            "  {} {}",
            "Raw input:".bright_cyan(),
            self.config.raw_dir.display()
        );
        println!(
            "  {} {}",
            "Output:".bright_cyan(),
            self.config.processed_dir.display()
        );

        self.config.ensure_output_dirs().await?;

        let stages: Vec<Stage> = match stage {
            Stage::All => Stage::SEQUENCE.to_vec(),
            single => vec![single],
        };

        let mut stats = PipelineStats::default();
        for stage in stages {
            println!("\n{} {}", "Stage".bright_yellow(), stage.name().bright_white().bold());
            let report = self.run_stage(stage).await?;
            print_stage_summary(&report);
            stats.stages.push(report);
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        stats.report_path = Some(write_report(&stats, &self.config)?);
        info!(
            "Run finished: {} files generated, {} failed",
            stats.files_generated(),
            stats.files_failed()
        );
        Ok(stats)
    }

    /// Run a single stage and time it
    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        let start_time = Instant::now();
        let mut report = match stage {
            Stage::Clean => self.run_clean().await?,
            Stage::Dimensions => self.run_dimensions().await?,
            Stage::Facts => self.run_facts().await?,
            Stage::Unify => self.run_unify().await?,
            Stage::Dictionary => self.run_dictionary().await?,
            Stage::Curate => self.run_curate().await?,
            Stage::All => {
                return Err(EtlError::Configuration {
                    message: "`all` is not a single stage".to_string(),
                });
            }
        };
        report.processing_time_ms = start_time.elapsed().as_millis();
        Ok(report)
    }

    /// Clean every raw workbook and write the row count summary
    pub async fn run_clean(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Clean.name());
        let files = FileDiscovery::new(&self.config.raw_dir)
            .discover_spreadsheets()
            .await?;
        if files.is_empty() {
            report.record_skip(&self.config.raw_dir, "no raw workbooks found");
            return Ok(report);
        }

        let progress = self.progress_bar(files.len(), "Cleaning workbooks");
        let mut summary = Vec::new();
        for path in files {
            let (config, writer, source) = (self.config.clone(), self.writer.clone(), path.clone());
            let result =
                blocking(move || clean::clean_workbook(&source, &config, &writer)).await;
            match result {
                Ok((output, rows)) => {
                    if let Some(name) = output.file_name() {
                        summary.push((name.to_string_lossy().to_string(), rows));
                    }
                    report.record_output(output, rows);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to clean {}: {}", path.display(), e);
                    remove_stale(&clean::clean_path(&path, &self.config)).await?;
                    report.record_failure(&path, e.to_string());
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        if summary.is_empty() {
            remove_stale(&self.config.processed_dir.join(SUMMARY_FILE)).await?;
        } else {
            let (path, rows) = clean::write_summary(&summary, &self.config, &self.writer)?;
            report.record_output(path, rows);
        }
        Ok(report)
    }

    /// Build and write the five dimension tables
    pub async fn run_dimensions(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Dimensions.name());
        let (config, writer) = (self.config.clone(), self.writer.clone());
        let (origin, written) = blocking(move || {
            let dimensions = DimensionSet::build(&config)?;
            let written = dimensions.write_all(&config.dimensional_dir, &writer)?;
            Ok((dimensions.time.origin, written))
        })
        .await?;

        if let TimeOrigin::Fallback { reason } = origin {
            let (first, last) = self.config.time.fallback_years;
            report.warnings.push(format!(
                "time dimension uses fallback range {}-{}: {}",
                first, last, reason
            ));
        }
        for (path, rows) in written {
            report.record_output(path, rows);
        }
        Ok(report)
    }

    /// Build one fact table per recognised cleaned table. Fact tables of
    /// earlier runs are removed first, since their keys belong to an older
    /// dimension build.
    pub async fn run_facts(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Facts.name());
        let stale = FileDiscovery::new(&self.config.dimensional_dir)
            .discover_fact_tables()
            .await?;
        for path in &stale {
            remove_stale(path).await?;
        }
        if !stale.is_empty() {
            debug!("Removed {} fact tables from an earlier run", stale.len());
        }

        let dimensional_dir = self.config.dimensional_dir.clone();
        let resolver =
            match blocking(move || KeyResolver::from_dimension_dir(&dimensional_dir)).await {
                Ok(resolver) => Arc::new(resolver),
                Err(EtlError::InputNotFound { path }) => {
                    warn!("Dimension table {} not found, skipping facts", path.display());
                    report.record_skip(path, "dimension tables have not been built");
                    return Ok(report);
                }
                Err(e) => return Err(e),
            };

        let files = self.clean_tables(&mut report).await?;
        let progress = self.progress_bar(files.len(), "Building facts");
        for path in files {
            let (config, writer, resolver, source) = (
                self.config.clone(),
                self.writer.clone(),
                resolver.clone(),
                path.clone(),
            );
            let result = blocking(move || {
                facts::process_fact_file(&source, &config, &resolver, &writer)
            })
            .await;
            match result {
                Ok(Some(output)) => {
                    for (column, nulls) in &output.unresolved {
                        report.warnings.push(format!(
                            "{}: {} rows without {}",
                            source_stem(&output.path),
                            nulls,
                            column
                        ));
                    }
                    report.record_output(output.path, output.rows);
                }
                Ok(None) => report.record_skip(&path, "no fact table for this source"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to build facts from {}: {}", path.display(), e);
                    report.record_failure(&path, e.to_string());
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(report)
    }

    /// Reshape every cleaned table and write the unified long table
    pub async fn run_unify(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Unify.name());
        let csv_path = self.config.out_dir.join(format!("{}.csv", UNIFIED_FACT_STEM));
        let parquet_path = self
            .config
            .out_dir
            .join(format!("{}.parquet", UNIFIED_FACT_STEM));
        let files = self.clean_tables(&mut report).await?;
        if files.is_empty() {
            remove_stale(&csv_path).await?;
            remove_stale(&parquet_path).await?;
            return Ok(report);
        }
        if !self.config.output.write_parquet_snapshot {
            remove_stale(&parquet_path).await?;
        }

        let progress = self.progress_bar(files.len(), "Unifying tables");
        let mut chunks = Vec::new();
        for path in files {
            let source = path.clone();
            let result = blocking(move || {
                let df = read_csv_table(&source, true)?;
                let file_name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                long_chunk(&df, &source_stem(&source), &file_name)
            })
            .await;
            match result {
                Ok(Some(chunk)) => chunks.push(chunk),
                Ok(None) => report.record_skip(&path, "no measurement columns"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to unify {}: {}", path.display(), e);
                    report.record_failure(&path, e.to_string());
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        let (config, writer) = (self.config.clone(), self.writer.clone());
        let written = blocking(move || {
            let mut unified = unify(chunks)?;
            let rows = writer.write_csv(&mut unified, &csv_path)?;
            let mut written = vec![(csv_path, rows)];
            if config.output.write_parquet_snapshot {
                let rows = writer.write_parquet(&mut unified, &parquet_path)?;
                written.push((parquet_path, rows));
            }
            Ok(written)
        })
        .await?;
        for (path, rows) in written {
            report.record_output(path, rows);
        }
        Ok(report)
    }

    /// Derive the metrics dictionary from the unified table. A unified
    /// table without the required columns is fatal.
    pub async fn run_dictionary(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Dictionary.name());
        let unified_path = self
            .config
            .out_dir
            .join(format!("{}.csv", UNIFIED_FACT_STEM));
        if !unified_path.exists() {
            warn!("{} not found, skipping dictionary", unified_path.display());
            remove_stale(&self.config.out_dir.join(DICTIONARY_FILE)).await?;
            report.record_skip(&unified_path, "unified table has not been built");
            return Ok(report);
        }

        let (config, writer) = (self.config.clone(), self.writer.clone());
        let (path, rows) = blocking(move || {
            let unified = read_csv_table(&unified_path, true)?;
            let mut dictionary = build_dictionary(&unified)?;
            let path = config.out_dir.join(DICTIONARY_FILE);
            let rows = writer.write_csv(&mut dictionary, &path)?;
            Ok((path, rows))
        })
        .await?;
        report.record_output(path, rows);
        Ok(report)
    }

    /// Publish the curated and BI extracts of the dimension tables, then
    /// the curated fact extracts whose cleaned table is present
    pub async fn run_curate(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Curate.name());
        let config = self.config.clone();
        let inputs = match blocking(move || curate::CurationInputs::load(&config)).await {
            Ok(inputs) => Arc::new(inputs),
            Err(EtlError::InputNotFound { path }) => {
                warn!("Dimension table {} not found, skipping curation", path.display());
                for stale in curate::curated_outputs(&self.config) {
                    remove_stale(&stale).await?;
                }
                report.record_skip(path, "dimension tables have not been built");
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        let (config, writer, dims) = (self.config.clone(), self.writer.clone(), inputs.clone());
        let written =
            blocking(move || curate::write_curated_dimensions(&dims, &config, &writer)).await?;
        for (path, rows) in written {
            report.record_output(path, rows);
        }

        for extract in curate::curated_facts(&self.config) {
            if !tokio::fs::try_exists(&extract.source).await? {
                debug!("{} not found, no curated extract", extract.source.display());
                remove_stale(&extract.target).await?;
                continue;
            }
            let (writer, inputs, job) = (self.writer.clone(), inputs.clone(), extract.clone());
            let result =
                blocking(move || curate::write_curated_fact(&job, &inputs, &writer)).await;
            match result {
                Ok(rows) => report.record_output(extract.target, rows),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to curate {}: {}", extract.source.display(), e);
                    remove_stale(&extract.target).await?;
                    report.record_failure(&extract.source, e.to_string());
                }
            }
        }
        Ok(report)
    }

    async fn clean_tables(&self, report: &mut StageReport) -> Result<Vec<PathBuf>> {
        let files = FileDiscovery::new(&self.config.processed_dir)
            .discover_clean_tables()
            .await?;
        if files.is_empty() {
            report.record_skip(&self.config.processed_dir, "no cleaned tables found");
        }
        Ok(files)
    }

    fn progress_bar(&self, total: usize, message: &str) -> ProgressBar {
        if self.show_progress {
            create_progress_bar(total as u64, message)
        } else {
            ProgressBar::hidden()
        }
    }
}

/// Run blocking spreadsheet and table work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| EtlError::ProcessingInterrupted {
            reason: format!("worker task failed: {}", e),
        })?
}

/// Create a progress bar with appropriate styling
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

fn print_stage_summary(report: &StageReport) {
    println!(
        "  {} {} ({} rows)",
        "Generated:".bright_green(),
        report.generated.len().to_string().bright_white().bold(),
        report.total_rows
    );
    for issue in &report.skipped {
        println!(
            "  {} {} - {}",
            "Skipped:".yellow(),
            issue.path.display(),
            issue.reason
        );
    }
    for issue in &report.failed {
        println!(
            "  {} {} - {}",
            "Failed:".bright_red(),
            issue.path.display(),
            issue.reason.bright_red()
        );
    }
    for warning in &report.warnings {
        println!("  {} {}", "Warning:".yellow().bold(), warning);
    }
}
