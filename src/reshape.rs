//! Wide-to-long reshaping and foreign key attachment.
//!
//! [`unpivot`] turns one column per category into `(category, value)` pairs.
//! The result has exactly `rows × categories` rows, grouped by category in
//! the order the category columns were given.

use crate::error::{EtlError, Result};
use crate::models::Resolution;
use crate::schema::{f64_values, has_column, i64_values, string_values};
use polars::prelude::*;
use std::path::PathBuf;

/// How the value column of an unpivot is coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePolicy {
    /// Access counts: `Int64`, absent or non-numeric means zero observed
    ZeroFillCounts,
    /// Measurements: `Float64`, absent or non-numeric stays null
    KeepMissing,
}

/// Unpivot `categories` of `df` into `category_name` / `value_name`
/// columns, keeping `index` columns on every output row.
pub fn unpivot(
    df: &DataFrame,
    index: &[String],
    categories: &[String],
    category_name: &str,
    value_name: &str,
    policy: ValuePolicy,
) -> Result<DataFrame> {
    if categories.is_empty() {
        return Err(EtlError::InvalidFormat {
            path: PathBuf::new(),
            reason: format!("no category columns to unpivot into {}", category_name),
        });
    }

    let base = df.select(index.iter().map(String::as_str))?;
    let mut stacked = base.clone();
    for _ in 1..categories.len() {
        stacked.vstack_mut(&base)?;
    }
    stacked.align_chunks();

    let mut labels: Vec<&str> = Vec::with_capacity(df.height() * categories.len());
    for category in categories {
        labels.extend(std::iter::repeat_n(category.as_str(), df.height()));
    }

    let values = match policy {
        ValuePolicy::ZeroFillCounts => {
            let mut all: Vec<i64> = Vec::with_capacity(labels.len());
            for category in categories {
                all.extend(count_values(df, category)?);
            }
            Column::new(value_name.into(), all)
        }
        ValuePolicy::KeepMissing => {
            let mut all: Vec<Option<f64>> = Vec::with_capacity(labels.len());
            for category in categories {
                all.extend(f64_values(df, category)?);
            }
            Column::new(value_name.into(), all)
        }
    };

    stacked.with_column(Column::new(category_name.into(), labels))?;
    stacked.with_column(values)?;
    Ok(stacked)
}

/// Count column with absent and non-numeric cells as zero. Fractional
/// counts are rounded.
pub fn count_values(df: &DataFrame, column: &str) -> Result<Vec<i64>> {
    Ok(f64_values(df, column)?
        .into_iter()
        .map(|v| match v {
            Some(f) if f.is_finite() => f.round() as i64,
            _ => 0,
        })
        .collect())
}

/// Append a key column computed from one source column. Unresolved values
/// become nulls.
pub fn attach_key<F>(df: &mut DataFrame, source: &str, key_name: &str, resolve: F) -> Result<()>
where
    F: Fn(Option<&str>) -> Resolution<String>,
{
    let keys: Vec<Option<String>> = string_values(df, source)?
        .iter()
        .map(|v| resolve(v.as_deref()).key())
        .collect();
    df.with_column(Column::new(key_name.into(), keys))?;
    Ok(())
}

/// Append a key column computed from a numeric source column
pub fn attach_numeric_key<F>(
    df: &mut DataFrame,
    source: &str,
    key_name: &str,
    resolve: F,
) -> Result<()>
where
    F: Fn(Option<f64>) -> Resolution<String>,
{
    let keys: Vec<Option<String>> = f64_values(df, source)?
        .into_iter()
        .map(|v| resolve(v).key())
        .collect();
    df.with_column(Column::new(key_name.into(), keys))?;
    Ok(())
}

/// Append `tiempo_id` from `anio` / `trimestre` when both are present
pub fn attach_period_key<F>(df: &mut DataFrame, resolve: F) -> Result<bool>
where
    F: Fn(Option<i64>, Option<i64>) -> Resolution<String>,
{
    if !has_column(df, "anio") || !has_column(df, "trimestre") {
        return Ok(false);
    }
    let keys: Vec<Option<String>> = i64_values(df, "anio")?
        .into_iter()
        .zip(i64_values(df, "trimestre")?)
        .map(|(y, q)| resolve(y, q).key())
        .collect();
    df.with_column(Column::new("tiempo_id".into(), keys))?;
    Ok(true)
}

/// Append a column holding the same value on every row
pub fn attach_constant(df: &mut DataFrame, name: &str, value: Option<&str>) -> Result<()> {
    let values: Vec<Option<&str>> = vec![value; df.height()];
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}
