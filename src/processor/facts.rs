//! Fact stage: cleaned tables to keyed fact tables
//!
//! Each cleaned table is routed by its file stem. Wide technology and speed
//! bucket tables are unpivoted; every table gets its period and province
//! keys attached. Keys that cannot be resolved stay null.

use crate::config::PipelineConfig;
use crate::constants::{IDENTIFIER_COLUMNS, WIDE_TABLE_TOTAL_COLUMNS};
use crate::error::Result;
use crate::models::{FactKind, Resolution, source_stem};
use crate::processor::writer::TableWriter;
use crate::reshape::{
    ValuePolicy, attach_constant, attach_key, attach_numeric_key, attach_period_key, unpivot,
};
use crate::resolver::{KeyResolver, to_kbps};
use crate::schema::{
    category_columns, check_referential_closure, f64_values, has_column, present_columns,
    read_csv_table, string_values,
};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Foreign key columns a fact table may carry
pub const FACT_KEY_COLUMNS: [&str; 5] = [
    "tiempo_id",
    "provincia_id",
    "tecnologia_id",
    "velocidad_id",
    "servicio_id",
];

/// One written fact table
#[derive(Debug, Clone)]
pub struct FactOutput {
    pub path: PathBuf,
    pub rows: usize,
    /// `(key column, rows left null)` for every key column with gaps
    pub unresolved: Vec<(String, usize)>,
}

/// Output path of the fact table for a cleaned table
pub fn fact_path(source: &Path, config: &PipelineConfig) -> PathBuf {
    config
        .dimensional_dir
        .join(format!("fact_{}.csv", source_stem(source)))
}

/// Apply the routing for `kind` to a cleaned table
pub fn build_fact(df: &DataFrame, kind: &FactKind, resolver: &KeyResolver) -> Result<DataFrame> {
    let mut fact = match kind {
        FactKind::InternetTechnologies => {
            let mut long = unpivot_wide(df, "tecnologia")?;
            attach_key(&mut long, "tecnologia", "tecnologia_id", |raw| {
                resolver.technology(raw)
            })?;
            long
        }
        FactKind::InternetSpeedRanges => {
            let mut long = unpivot_wide(df, "rango_velocidad")?;
            attach_key(&mut long, "rango_velocidad", "velocidad_id", |raw| {
                raw.map_or(Resolution::Missing, |header| resolver.speed_bucket(header))
            })?;
            long
        }
        FactKind::InternetMeanSpeed => {
            let mut fact = df.clone();
            if has_column(&fact, "mbps") {
                attach_numeric_key(&mut fact, "mbps", "velocidad_id", |mbps| {
                    resolver.speed_tier_kbps(mbps.map(|m| m * 1000.0))
                })?;
            }
            fact
        }
        FactKind::Revenue { service } => {
            let mut fact = df.clone();
            let key = service.and_then(|name| resolver.service(name).key());
            attach_constant(&mut fact, "servicio_id", key.as_deref())?;
            fact
        }
        FactKind::InternetAccesses
        | FactKind::Mobile
        | FactKind::FixedTelephony
        | FactKind::Television => {
            let mut fact = df.clone();
            if has_column(&fact, "velocidad") {
                attach_speed(&mut fact, resolver)?;
            }
            fact
        }
    };

    attach_period_key(&mut fact, |year, quarter| resolver.period(year, quarter))?;
    if kind.has_province() && has_column(&fact, "provincia") {
        attach_key(&mut fact, "provincia", "provincia_id", |raw| {
            resolver.province(raw)
        })?;
    }
    Ok(fact)
}

/// Unpivot every measurement column of a wide table into `category` /
/// `accesos`, with the row total excluded.
fn unpivot_wide(df: &DataFrame, category: &str) -> Result<DataFrame> {
    let known: Vec<&str> = IDENTIFIER_COLUMNS
        .iter()
        .chain(WIDE_TABLE_TOTAL_COLUMNS)
        .copied()
        .collect();
    let categories = category_columns(df, &known);
    let index = present_columns(df, &["anio", "trimestre", "provincia"]);
    unpivot(df, &index, &categories, category, "accesos", ValuePolicy::ZeroFillCounts)
}

/// `Velocidad_kbps` and `velocidad_id` from a raw speed column
fn attach_speed(df: &mut DataFrame, resolver: &KeyResolver) -> Result<()> {
    let kbps: Vec<Option<f64>> = f64_values(df, "velocidad")?
        .into_iter()
        .map(|v| v.filter(|v| !v.is_nan()).map(to_kbps))
        .collect();
    df.with_column(Column::new("Velocidad_kbps".into(), kbps))?;
    attach_numeric_key(df, "Velocidad_kbps", "velocidad_id", |kbps| {
        resolver.speed_tier_kbps(kbps)
    })
}

/// Null count of every key column that has one
pub fn unresolved_keys(fact: &DataFrame) -> Result<Vec<(String, usize)>> {
    let mut gaps = Vec::new();
    for column in FACT_KEY_COLUMNS {
        if has_column(fact, column) {
            let nulls = string_values(fact, column)?
                .iter()
                .filter(|v| v.is_none())
                .count();
            if nulls > 0 {
                gaps.push((column.to_string(), nulls));
            }
        }
    }
    Ok(gaps)
}

/// Build and write the fact table for one cleaned table. Returns `None`
/// when the stem matches no fact kind.
pub fn process_fact_file(
    source: &Path,
    config: &PipelineConfig,
    resolver: &KeyResolver,
    writer: &TableWriter,
) -> Result<Option<FactOutput>> {
    let Some(kind) = FactKind::from_path(source) else {
        return Ok(None);
    };
    let df = read_csv_table(source, true)?;
    let mut fact = build_fact(&df, &kind, resolver)?;

    let table = format!("fact_{}", source_stem(source));
    for column in FACT_KEY_COLUMNS {
        if let Some(keys) = resolver.key_set(column) {
            check_referential_closure(&fact, &table, column, &keys)?;
        }
    }

    let path = fact_path(source, config);
    let rows = writer.write_csv(&mut fact, &path)?;
    let unresolved = unresolved_keys(&fact)?;
    debug!("{:?} fact {} written with {} rows", kind, table, rows);
    Ok(Some(FactOutput {
        path,
        rows,
        unresolved,
    }))
}
