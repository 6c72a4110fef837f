//! Table schema helpers.
//!
//! Column discovery is an explicit schema diff against a known set of
//! identifier columns, and value access always goes through a non-strict
//! cast so odd cells become nulls instead of errors.

use crate::error::{EtlError, Result};
use polars::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Whether `df` has a column called `name`
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

/// Columns of `df` that are not in `known`, in table order.
pub fn category_columns(df: &DataFrame, known: &[&str]) -> Vec<String> {
    let known: HashSet<&str> = known.iter().copied().collect();
    df.get_column_names()
        .into_iter()
        .filter(|name| !known.contains(name.as_str()))
        .map(|name| name.to_string())
        .collect()
}

/// Rename every column to its cleaned form (see
/// [`crate::normalize::canonical_column`]).
pub fn standardize_columns(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| crate::normalize::canonical_column(name.as_str()))
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        unique.push(candidate);
    }
    df.set_column_names(unique)?;
    Ok(())
}

/// Columns of `known` that `df` actually has, in `known` order.
pub fn present_columns(df: &DataFrame, known: &[&str]) -> Vec<String> {
    known
        .iter()
        .filter(|name| has_column(df, name))
        .map(|name| name.to_string())
        .collect()
}

/// Fail with [`EtlError::MissingColumns`] unless every required column is
/// present.
pub fn require_columns(df: &DataFrame, table: &str, required: &[&str]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !has_column(df, name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::MissingColumns {
            table: table.to_string(),
            columns: missing,
        })
    }
}

/// Column values as optional strings.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Column values as optional floats; unparsable cells become `None`.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Column values as optional integers. Non-integral and non-finite values
/// become `None` so `2020.5` is never silently truncated.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    Ok(f64_values(df, name)?
        .into_iter()
        .map(|v| v.filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64))
        .collect())
}

/// Read a CSV table. With `all_strings` every column is kept as text, which
/// is how dimension tables are read back so keys survive untouched.
pub fn read_csv_table(path: &Path, all_strings: bool) -> Result<DataFrame> {
    if !path.exists() {
        return Err(EtlError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let infer = if all_strings { Some(0) } else { Some(1000) };
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(infer)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Read {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Check that every non-null value of `column` in `fact` is one of `keys`.
pub fn check_referential_closure(
    fact: &DataFrame,
    table: &str,
    column: &str,
    keys: &HashSet<String>,
) -> Result<()> {
    if !has_column(fact, column) {
        return Ok(());
    }
    let orphans: Vec<String> = string_values(fact, column)?
        .into_iter()
        .flatten()
        .filter(|value| !keys.contains(value))
        .collect();
    match orphans.first() {
        None => Ok(()),
        Some(sample) => Err(EtlError::ReferentialIntegrity {
            table: table.to_string(),
            column: column.to_string(),
            missing: orphans.len(),
            sample: sample.clone(),
        }),
    }
}

static YEAR_RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{4}$").expect("year range pattern is valid"));

/// `true` for `""` or a `YYYY-YYYY` string.
pub fn is_valid_year_range(text: &str) -> bool {
    text.is_empty() || YEAR_RANGE_PATTERN.is_match(text)
}
