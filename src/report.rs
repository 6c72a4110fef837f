//! Markdown run report
//!
//! Summarises every stage of a run: files generated, inputs skipped or
//! failed with the reason, and warnings such as the time dimension falling
//! back to its default range.

use crate::config::PipelineConfig;
use crate::constants::REPORT_FILE;
use crate::error::Result;
use crate::models::{FileIssue, PipelineStats};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};

/// Markdown view of one run
pub struct RunReport<'a> {
    pub stats: &'a PipelineStats,
    pub generated_at: DateTime<Local>,
}

impl fmt::Display for RunReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages = &self.stats.stages;
        writeln!(f, "# ETL run report")?;
        writeln!(f)?;
        writeln!(f, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f)?;

        writeln!(f, "## Stages")?;
        writeln!(f)?;
        writeln!(f, "| Stage | Generated | Skipped | Failed | Rows | Time (ms) |")?;
        writeln!(f, "|---|---|---|---|---|---|")?;
        for stage in stages {
            writeln!(
                f,
                "| {} | {} | {} | {} | {} | {} |",
                stage.stage,
                stage.generated.len(),
                stage.skipped.len(),
                stage.failed.len(),
                stage.total_rows,
                stage.processing_time_ms
            )?;
        }

        let warnings: Vec<String> = stages
            .iter()
            .flat_map(|s| s.warnings.iter().map(move |w| format!("{}: {}", s.stage, w)))
            .collect();
        if !warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Warnings")?;
            writeln!(f)?;
            for warning in &warnings {
                writeln!(f, "- {}", warning)?;
            }
        }

        let generated: Vec<&PathBuf> = stages.iter().flat_map(|s| &s.generated).collect();
        if !generated.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Generated files")?;
            writeln!(f)?;
            for path in generated {
                writeln!(f, "- `{}`", display_name(path))?;
            }
        }

        write_issues(f, "Skipped inputs", stages.iter().flat_map(|s| &s.skipped))?;
        write_issues(f, "Failed inputs", stages.iter().flat_map(|s| &s.failed))
    }
}

/// Render the report for `stats`
pub fn render_report(stats: &PipelineStats, generated_at: DateTime<Local>) -> String {
    RunReport {
        stats,
        generated_at,
    }
    .to_string()
}

fn write_issues<'a>(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    issues: impl Iterator<Item = &'a FileIssue>,
) -> fmt::Result {
    let issues: Vec<&FileIssue> = issues.collect();
    if issues.is_empty() {
        return Ok(());
    }
    writeln!(f)?;
    writeln!(f, "## {}", title)?;
    writeln!(f)?;
    for issue in issues {
        writeln!(f, "- `{}`: {}", display_name(&issue.path), issue.reason)?;
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Write the report into the curated output directory
pub fn write_report(stats: &PipelineStats, config: &PipelineConfig) -> Result<PathBuf> {
    let path = config.out_dir.join(REPORT_FILE);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, render_report(stats, Local::now()))?;
    Ok(path)
}
