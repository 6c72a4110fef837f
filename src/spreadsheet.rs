//! Raw spreadsheet ingestion.
//!
//! Reads the first sheet of a workbook into a `DataFrame`. Published sheets
//! often carry a title block above the real header, so the header row is
//! detected rather than assumed.

use crate::error::{EtlError, Result};
use calamine::{Data, Reader, open_workbook_auto};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Read the first worksheet of `path` as a table.
pub fn read_first_sheet(path: &Path, header_candidates: usize) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names.first().ok_or_else(|| EtlError::InvalidFormat {
        path: path.to_path_buf(),
        reason: "workbook has no sheets".to_string(),
    })?;

    let range = workbook.worksheet_range(sheet_name)?;
    let (row_count, col_count) = range.get_size();
    debug!(
        "Sheet '{}' of {}: {} rows x {} columns",
        sheet_name,
        path.display(),
        row_count,
        col_count
    );

    let rows: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
    frame_from_rows(rows, header_candidates).map_err(|e| match e {
        EtlError::InvalidFormat { reason, .. } => EtlError::InvalidFormat {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Build a table from raw cell rows: drop blank rows, pick the header row,
/// then type each column.
pub fn frame_from_rows(rows: Vec<Vec<Data>>, header_candidates: usize) -> Result<DataFrame> {
    let rows: Vec<Vec<Data>> = rows.into_iter().filter(|r| !is_blank_row(r)).collect();
    if rows.is_empty() {
        return Err(EtlError::InvalidFormat {
            path: Default::default(),
            reason: "sheet contains no data".to_string(),
        });
    }

    let header_idx = detect_header_row(&rows, header_candidates);
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let names = header_names(&rows[header_idx], width);
    let body = &rows[header_idx + 1..];

    let mut columns = Vec::with_capacity(width);
    for (idx, name) in names.iter().enumerate() {
        let cells: Vec<&Data> = body
            .iter()
            .map(|row| row.get(idx).unwrap_or(&Data::Empty))
            .collect();

        // Unnamed padding columns with no values are layout noise
        if name.is_none() && cells.iter().all(|c| is_blank(c)) {
            continue;
        }
        let name = name.clone().unwrap_or_else(|| format!("unnamed_{}", idx));
        columns.push(typed_column(&name, &cells));
    }

    dedupe_names(&mut columns);
    Ok(DataFrame::new(columns)?)
}

/// Index of the header row.
///
/// The first row wins when every cell across the sheet width is text.
/// Otherwise the candidate among the first `candidates` rows with the most
/// text cells is used; earlier rows win ties.
pub fn detect_header_row(rows: &[Vec<Data>], candidates: usize) -> usize {
    let Some(first) = rows.first() else {
        return 0;
    };
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width > 0 && string_cells(first) == width {
        return 0;
    }

    let mut best = (0, string_cells(first));
    for (idx, row) in rows.iter().enumerate().take(candidates.max(1)).skip(1) {
        let count = string_cells(row);
        if count > best.1 {
            best = (idx, count);
        }
    }
    debug!("Header row detected at index {} ({} text cells)", best.0, best.1);
    best.0
}

fn string_cells(row: &[Data]) -> usize {
    row.iter()
        .filter(|c| matches!(c, Data::String(s) if !s.trim().is_empty()))
        .count()
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(is_blank)
}

fn header_names(row: &[Data], width: usize) -> Vec<Option<String>> {
    (0..width)
        .map(|idx| match row.get(idx) {
            None | Some(Data::Empty) => None,
            Some(Data::String(s)) if s.trim().is_empty() => None,
            Some(Data::String(s)) => Some(s.trim().to_string()),
            Some(Data::Float(f)) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
            Some(other) => Some(other.to_string().trim().to_string()),
        })
        .collect()
}

fn numeric_value(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        _ => None,
    }
}

/// Numeric when every non-blank cell is a number (integer-valued numbers
/// become `Int64`), text otherwise.
fn typed_column(name: &str, cells: &[&Data]) -> Column {
    let non_blank: Vec<&&Data> = cells.iter().filter(|c| !is_blank(c)).collect();
    let all_numeric = !non_blank.is_empty() && non_blank.iter().all(|c| numeric_value(c).is_some());

    if all_numeric {
        let values: Vec<Option<f64>> = cells.iter().map(|c| numeric_value(c)).collect();
        let integral = values
            .iter()
            .flatten()
            .all(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64);
        if integral {
            let ints: Vec<Option<i64>> = values.iter().map(|v| v.map(|f| f as i64)).collect();
            return Column::new(name.into(), ints);
        }
        return Column::new(name.into(), values);
    }

    let texts: Vec<Option<String>> = cells
        .iter()
        .map(|c| match c {
            Data::Empty => None,
            Data::String(s) if s.trim().is_empty() => None,
            Data::String(s) => Some(s.clone()),
            Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
            other => Some(other.to_string()),
        })
        .collect();
    Column::new(name.into(), texts)
}

/// Repeated header names get a numeric suffix (`total`, `total_1`, ...).
fn dedupe_names(columns: &mut [Column]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for column in columns.iter_mut() {
        let name = column.name().to_string();
        let count = seen.entry(name.clone()).or_insert(0);
        if *count > 0 {
            let renamed = format!("{}_{}", name, count);
            column.rename(renamed.into());
        }
        *count += 1;
    }
}
