//! Input file discovery
//!
//! Finds raw workbooks and cleaned tables in the pipeline directories.
//! Results are sorted by file name so every run processes inputs in the same
//! order.

use crate::constants::{CLEAN_SUFFIX, SPREADSHEET_EXTENSIONS, UNIFIED_FACT_STEM};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File discovery over one directory
#[derive(Debug)]
pub struct FileDiscovery {
    dir: PathBuf,
}

impl FileDiscovery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Raw workbooks directly inside the directory. A missing directory
    /// yields no files.
    pub async fn discover_spreadsheets(&self) -> Result<Vec<PathBuf>> {
        self.discover(is_spreadsheet).await
    }

    /// Cleaned tables (`*_clean.csv`) directly inside the directory
    pub async fn discover_clean_tables(&self) -> Result<Vec<PathBuf>> {
        self.discover(is_clean_table).await
    }

    /// Per-source fact tables (`fact_*.csv`) directly inside the directory
    pub async fn discover_fact_tables(&self) -> Result<Vec<PathBuf>> {
        self.discover(is_fact_table).await
    }

    async fn discover(&self, accept: fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
        if !fs::try_exists(&self.dir).await? {
            debug!("Directory {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && accept(&path) {
                files.push(path);
            }
        }
        files.sort();

        debug!("Found {} files in {}", files.len(), self.dir.display());
        Ok(files)
    }
}

/// Workbook extension, ignoring Office lock files (`~$name.xlsx`)
pub fn is_spreadsheet(path: &Path) -> bool {
    let locked = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("~$"));
    !locked
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SPREADSHEET_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn is_clean_table(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "csv")
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with(CLEAN_SUFFIX))
}

fn is_fact_table(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "csv")
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with("fact_") && s != UNIFIED_FACT_STEM)
}

/// Delete `path` if an earlier run left it behind. Returns whether a file
/// was removed.
pub async fn remove_stale(path: &Path) -> Result<bool> {
    if !fs::try_exists(path).await? {
        return Ok(false);
    }
    fs::remove_file(path).await?;
    debug!("Removed stale output {}", path.display());
    Ok(true)
}
