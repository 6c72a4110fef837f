//! Time dimension inference.
//!
//! The set of `(anio, trimestre)` periods comes from the driving table. When
//! that table is missing, unreadable or yields no valid period, a fixed
//! default range is used instead and the substitution is recorded.

use crate::config::{PipelineConfig, TimeDimensionConfig};
use crate::constants::{CLEAN_SUFFIX, SPREADSHEET_EXTENSIONS};
use crate::error::{EtlError, Result};
use crate::keys::surrogate_key;
use crate::models::TimeOrigin;
use crate::schema::{has_column, i64_values, read_csv_table, standardize_columns};
use crate::spreadsheet::read_first_sheet;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Built time dimension and how its periods were obtained
#[derive(Debug, Clone)]
pub struct TimeDimension {
    pub table: DataFrame,
    pub origin: TimeOrigin,
}

impl TimeDimension {
    pub fn used_fallback(&self) -> bool {
        self.origin.is_fallback()
    }
}

/// First and last month of a quarter
pub fn quarter_months(quarter: u32) -> (u32, u32) {
    let last = quarter * 3;
    (last - 2, last)
}

/// Build `dim_tiempo` from periods. Out-of-window years and quarters
/// outside `1..=4` are dropped, duplicates collapse, and `TM01..` follow
/// chronological order.
pub fn build_time_table(
    periods: impl IntoIterator<Item = (i64, i64)>,
    valid_years: (i32, i32),
) -> Result<DataFrame> {
    let (first, last) = (valid_years.0 as i64, valid_years.1 as i64);
    let periods: BTreeSet<(i64, i64)> = periods
        .into_iter()
        .filter(|(year, quarter)| (first..=last).contains(year) && (1..=4).contains(quarter))
        .collect();

    let mut ids = Vec::with_capacity(periods.len());
    let mut years = Vec::with_capacity(periods.len());
    let mut quarters = Vec::with_capacity(periods.len());
    let mut labels = Vec::with_capacity(periods.len());
    let mut month_start = Vec::with_capacity(periods.len());
    let mut month_end = Vec::with_capacity(periods.len());

    for (ordinal, (year, quarter)) in periods.into_iter().enumerate() {
        let (start, end) = quarter_months(quarter as u32);
        ids.push(surrogate_key("TM", ordinal + 1));
        years.push(year);
        quarters.push(quarter);
        labels.push(format!("{}T{}", year, quarter));
        month_start.push(start as i64);
        month_end.push(end as i64);
    }

    Ok(DataFrame::new(vec![
        Column::new("tiempo_id".into(), ids),
        Column::new("anio".into(), years),
        Column::new("trimestre".into(), quarters),
        Column::new("periodo".into(), labels),
        Column::new("mes_inicio".into(), month_start),
        Column::new("mes_fin".into(), month_end),
    ])?)
}

/// Distinct `(anio, trimestre)` pairs of a table; rows with either value
/// missing or non-integral are ignored.
pub fn observed_periods(df: &DataFrame) -> Result<Vec<(i64, i64)>> {
    for required in ["anio", "trimestre"] {
        if !has_column(df, required) {
            return Err(EtlError::MissingColumns {
                table: "time source".to_string(),
                columns: vec![required.to_string()],
            });
        }
    }
    let years = i64_values(df, "anio")?;
    let quarters = i64_values(df, "trimestre")?;
    let pairs: BTreeSet<(i64, i64)> = years
        .into_iter()
        .zip(quarters)
        .filter_map(|(y, q)| Some((y?, q?)))
        .collect();
    Ok(pairs.into_iter().collect())
}

/// Periods used when the driving table cannot be used
pub fn fallback_periods(config: &TimeDimensionConfig) -> Vec<(i64, i64)> {
    let (first, last) = config.fallback_years;
    (first..=last)
        .flat_map(|year| {
            config
                .fallback_quarters
                .iter()
                .map(move |q| (year as i64, *q as i64))
        })
        .collect()
}

/// Cleaned CSV of the driving table if present, otherwise its raw workbook.
pub fn locate_time_source(config: &PipelineConfig) -> Option<PathBuf> {
    let stem = &config.time.source_stem;
    let clean = config
        .processed_dir
        .join(format!("{}{}.csv", stem, CLEAN_SUFFIX));
    if clean.exists() {
        return Some(clean);
    }
    SPREADSHEET_EXTENSIONS
        .iter()
        .map(|ext| config.raw_dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.exists())
}

fn load_source(path: &Path, config: &PipelineConfig) -> Result<DataFrame> {
    let mut df = if path.extension().is_some_and(|ext| ext == "csv") {
        read_csv_table(path, true)?
    } else {
        read_first_sheet(path, config.header_candidates)?
    };
    standardize_columns(&mut df)?;
    Ok(df)
}

/// Build the time dimension, falling back to the default range when the
/// source cannot be used. Never fails because of the source.
pub fn build_time_dimension(config: &PipelineConfig) -> Result<TimeDimension> {
    let observed = match locate_time_source(config) {
        None => Err(format!(
            "source table {} not found",
            config.time.source_stem
        )),
        Some(path) => match load_source(&path, config).and_then(|df| observed_periods(&df)) {
            Err(e) => Err(format!("{} unusable: {}", path.display(), e)),
            Ok(periods) => {
                let table = build_time_table(periods, config.time.valid_years)?;
                if table.height() == 0 {
                    Err(format!(
                        "{} has no period within {}-{}",
                        path.display(),
                        config.time.valid_years.0,
                        config.time.valid_years.1
                    ))
                } else {
                    Ok((table, path))
                }
            }
        },
    };

    match observed {
        Ok((table, source)) => {
            debug!(
                "Time dimension: {} periods observed in {}",
                table.height(),
                source.display()
            );
            Ok(TimeDimension {
                table,
                origin: TimeOrigin::Observed { source },
            })
        }
        Err(reason) => {
            warn!("Time dimension falls back to default range: {}", reason);
            let table = build_time_table(fallback_periods(&config.time), config.time.valid_years)?;
            Ok(TimeDimension {
                table,
                origin: TimeOrigin::Fallback { reason },
            })
        }
    }
}
