//! Clean stage: raw workbooks to cleaned CSV tables
//!
//! Each workbook's first sheet becomes `<stem>_clean.csv` with canonical
//! column names and title-cased province names. A summary of row counts per
//! cleaned file is written alongside.

use crate::config::PipelineConfig;
use crate::constants::{CLEAN_SUFFIX, SUMMARY_FILE};
use crate::error::Result;
use crate::normalize::title_case;
use crate::processor::writer::TableWriter;
use crate::schema::{has_column, standardize_columns, string_values};
use crate::spreadsheet::read_first_sheet;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Canonical column names and display-form province names
pub fn clean_table(df: &mut DataFrame) -> Result<()> {
    standardize_columns(df)?;
    if has_column(df, "provincia") {
        let provinces: Vec<Option<String>> = string_values(df, "provincia")?
            .into_iter()
            .map(|p| p.map(|p| title_case(&p)).filter(|p| !p.is_empty()))
            .collect();
        df.with_column(Column::new("provincia".into(), provinces))?;
    }
    Ok(())
}

/// Path of the cleaned table for a raw workbook
pub fn clean_path(raw: &Path, config: &PipelineConfig) -> PathBuf {
    let stem = raw
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    config
        .processed_dir
        .join(format!("{}{}.csv", stem, CLEAN_SUFFIX))
}

/// Read, clean and write one workbook. Returns the written path and row
/// count.
pub fn clean_workbook(
    raw: &Path,
    config: &PipelineConfig,
    writer: &TableWriter,
) -> Result<(PathBuf, usize)> {
    let mut df = read_first_sheet(raw, config.header_candidates)?;
    clean_table(&mut df)?;
    let output = clean_path(raw, config);
    let rows = writer.write_csv(&mut df, &output)?;
    debug!(
        "Cleaned {} -> {} ({} rows, {} columns)",
        raw.display(),
        output.display(),
        rows,
        df.width()
    );
    Ok((output, rows))
}

/// Write `resumen_datos.csv` with `(archivo, filas)` per cleaned table
pub fn write_summary(
    entries: &[(String, usize)],
    config: &PipelineConfig,
    writer: &TableWriter,
) -> Result<(PathBuf, usize)> {
    let mut summary = DataFrame::new(vec![
        Column::new(
            "archivo".into(),
            entries.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "filas".into(),
            entries.iter().map(|(_, rows)| *rows as i64).collect::<Vec<_>>(),
        ),
    ])?;
    let path = config.processed_dir.join(SUMMARY_FILE);
    let rows = writer.write_csv(&mut summary, &path)?;
    Ok((path, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::read_csv_table;
    use tempfile::TempDir;

    #[test]
    fn test_clean_table_renames_and_title_cases() {
        let mut df = df!(
            "Año" => [2022i64, 2022],
            "Trimestre" => [1i64, 1],
            "Provincia" => ["BUENOS AIRES", "tierra del fuego"],
            "Fibra óptica" => [10i64, 20]
        )
        .unwrap();
        clean_table(&mut df).unwrap();

        assert_eq!(
            df.get_column_names_str(),
            vec!["anio", "trimestre", "provincia", "fibra_óptica"]
        );
        assert_eq!(
            string_values(&df, "provincia").unwrap(),
            vec![
                Some("Buenos Aires".to_string()),
                Some("Tierra Del Fuego".to_string())
            ]
        );
    }

    #[test]
    fn test_clean_path_and_summary() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_base_dir(temp_dir.path());
        let writer = TableWriter::new(&config);

        assert_eq!(
            clean_path(Path::new("data/raw/tv_accesos.xlsx"), &config),
            config.processed_dir.join("tv_accesos_clean.csv")
        );

        let entries = vec![("a_clean.csv".to_string(), 3), ("b_clean.csv".to_string(), 0)];
        let (path, rows) = write_summary(&entries, &config, &writer).unwrap();
        assert_eq!(rows, 2);
        let back = read_csv_table(&path, true).unwrap();
        assert_eq!(back.get_column_names_str(), vec!["archivo", "filas"]);
    }

    #[test]
    fn test_unreadable_workbook_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_base_dir(temp_dir.path());
        let writer = TableWriter::new(&config);
        let raw = temp_dir.path().join("broken.xlsx");
        std::fs::write(&raw, "not a workbook").unwrap();

        assert!(clean_workbook(&raw, &config, &writer).is_err());
        assert!(!clean_path(&raw, &config).exists());
    }
}
