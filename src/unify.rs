//! Unification of cleaned tables into one long fact table.
//!
//! Each cleaned table is reshaped to one row per observed measurement and
//! tagged with its business domain, subcategory and source file. All chunks
//! share one schema so they can be concatenated without reconciliation.

use crate::constants::{DOMAIN_RULES, IDENTIFIER_COLUMNS, PENETRATION_SUBCATEGORY};
use crate::error::Result;
use crate::models::Domain;
use crate::normalize::normalize_str;
use crate::reshape::{ValuePolicy, unpivot};
use crate::schema::{category_columns, f64_values, has_column, i64_values, present_columns, string_values};
use polars::prelude::*;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Column order of the unified table
pub const UNIFIED_COLUMNS: [&str; 9] = [
    "anio",
    "trimestre",
    "ProvinciaNorm",
    "dominio",
    "subcategoria",
    "variable",
    "valor",
    "fuente_archivo",
    "unidad",
];

static LOCATION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(_clean)?(_(provincias|provincia|nacional|totales|localidades))?$")
        .expect("location suffix pattern is valid")
});

/// Domain and subcategory for a source stem.
///
/// The domain comes from the first matching prefix rule; the subcategory
/// is what remains after removing that prefix and a trailing location
/// qualifier. Any stem mentioning penetration is grouped under
/// `penetracion`.
pub fn classify_stem(stem: &str) -> (Domain, String) {
    let stem = stem.to_lowercase();
    let (domain, rest) = DOMAIN_RULES
        .iter()
        .find(|(prefix, _)| stem.starts_with(prefix))
        .map(|(prefix, name)| {
            (
                Domain::from_name(name).unwrap_or(Domain::Otros),
                &stem[prefix.len()..],
            )
        })
        .unwrap_or((Domain::Otros, stem.as_str()));

    if rest.contains(PENETRATION_SUBCATEGORY) {
        return (domain, PENETRATION_SUBCATEGORY.to_string());
    }
    let sub = LOCATION_SUFFIX.replace(rest, "").trim_matches('_').to_string();
    let sub = if sub.is_empty() { "general".to_string() } else { sub };
    (domain, sub)
}

/// Reshape one cleaned table into unified rows. Returns `None` when the
/// table has no measurement columns. Rows whose value is missing or not
/// numeric are dropped.
pub fn long_chunk(df: &DataFrame, stem: &str, source_file: &str) -> Result<Option<DataFrame>> {
    let categories = category_columns(df, IDENTIFIER_COLUMNS);
    if categories.is_empty() {
        return Ok(None);
    }
    let index = present_columns(df, &["anio", "trimestre", "provincia"]);
    let long = unpivot(df, &index, &categories, "variable", "valor", ValuePolicy::KeepMissing)?;

    let height = long.height();
    let years = optional_i64(&long, "anio", height)?;
    let quarters = optional_i64(&long, "trimestre", height)?;
    let provinces: Vec<Option<String>> = if has_column(&long, "provincia") {
        string_values(&long, "provincia")?
            .into_iter()
            .map(|p| p.map(|p| normalize_str(&p)).filter(|p| !p.is_empty()))
            .collect()
    } else {
        vec![None; height]
    };
    let variables = string_values(&long, "variable")?;
    let values = f64_values(&long, "valor")?;

    let keep: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_some_and(|v| !v.is_nan()))
        .map(|(i, _)| i)
        .collect();

    let (domain, subcategory) = classify_stem(stem);
    let n = keep.len();
    let pick = |column: &[Option<i64>]| keep.iter().map(|&i| column[i]).collect::<Vec<_>>();

    let chunk = DataFrame::new(vec![
        Column::new("anio".into(), pick(&years)),
        Column::new("trimestre".into(), pick(&quarters)),
        Column::new(
            "ProvinciaNorm".into(),
            keep.iter().map(|&i| provinces[i].clone()).collect::<Vec<_>>(),
        ),
        Column::new("dominio".into(), vec![domain.as_str(); n]),
        Column::new("subcategoria".into(), vec![subcategory.as_str(); n]),
        Column::new(
            "variable".into(),
            keep.iter().map(|&i| variables[i].clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "valor".into(),
            keep.iter().map(|&i| values[i]).collect::<Vec<_>>(),
        ),
        Column::new("fuente_archivo".into(), vec![source_file; n]),
        Column::new("unidad".into(), vec![None::<&str>; n]),
    ])?;
    debug!(
        "{}: {} of {} reshaped rows kept as {}/{}",
        source_file,
        n,
        height,
        domain,
        subcategory
    );
    Ok(Some(chunk))
}

fn optional_i64(df: &DataFrame, name: &str, height: usize) -> Result<Vec<Option<i64>>> {
    if has_column(df, name) {
        i64_values(df, name)
    } else {
        Ok(vec![None; height])
    }
}

/// Empty table with the unified schema
pub fn empty_unified() -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Column::new("anio".into(), Vec::<Option<i64>>::new()),
        Column::new("trimestre".into(), Vec::<Option<i64>>::new()),
        Column::new("ProvinciaNorm".into(), Vec::<Option<String>>::new()),
        Column::new("dominio".into(), Vec::<String>::new()),
        Column::new("subcategoria".into(), Vec::<String>::new()),
        Column::new("variable".into(), Vec::<Option<String>>::new()),
        Column::new("valor".into(), Vec::<Option<f64>>::new()),
        Column::new("fuente_archivo".into(), Vec::<String>::new()),
        Column::new("unidad".into(), Vec::<Option<String>>::new()),
    ])?)
}

/// Concatenate chunks in the given order
pub fn unify(chunks: Vec<DataFrame>) -> Result<DataFrame> {
    if chunks.is_empty() {
        return empty_unified();
    }
    let frames: Vec<LazyFrame> = chunks.into_iter().map(|df| df.lazy()).collect();
    let unified = concat(frames, UnionArgs::default())?
        .select(UNIFIED_COLUMNS.iter().map(|name| col(*name)).collect::<Vec<_>>())
        .collect()?;
    Ok(unified)
}
