//! Loading persisted dataset files for validation.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use log::debug;

use crate::errors::{CaptureError, Result};

const TIME_FALLBACKS: [&str; 3] = [
    "%Y-%m-%d-%H-%M-%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// One row reduced to what the continuity checks need.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    /// Which loaded file the row came from; index resets between segments
    /// are not packet loss.
    pub segment: usize,
    pub index: Option<i64>,
    pub captured_at: Option<NaiveDateTime>,
}

/// A loaded dataset file, or the concatenation of several.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetTable {
    pub name: String,
    pub rows: Vec<DatasetRow>,
    pub missing_values: usize,
    /// Columns with at least one missing value.
    pub columns_with_missing: usize,
    /// Index cells that were not plain integers and went through a float parse.
    pub coerced_index: usize,
}

/// Column names to look up in dataset headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub index: String,
    pub time: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            index: crate::frame::INDEX_COLUMN.to_string(),
            time: crate::frame::TIME_COLUMN.to_string(),
        }
    }
}

impl DatasetTable {
    /// Read a CSV dataset with a header row. Rows may be ragged.
    pub fn load(path: &Path, name: impl Into<String>, columns: &ColumnNames) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| CaptureError::Validation(format!("{}: {e}", path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| CaptureError::Validation(format!("{}: {e}", path.display())))?
            .clone();
        let position = |column: &str| {
            headers.iter().position(|h| h.trim() == column).ok_or_else(|| {
                CaptureError::Validation(format!(
                    "{}: missing column {column:?}",
                    path.display()
                ))
            })
        };
        let index_col = position(&columns.index)?;
        let time_col = position(&columns.time)?;

        let mut table = DatasetTable {
            name: name.into(),
            ..Default::default()
        };
        let mut missing_per_column = vec![0usize; headers.len()];

        for record in reader.records() {
            let record =
                record.map_err(|e| CaptureError::Validation(format!("{}: {e}", path.display())))?;

            for (col, missing) in missing_per_column.iter_mut().enumerate() {
                if record.get(col).map_or(true, |v| v.trim().is_empty()) {
                    *missing += 1;
                }
            }

            let index = match record.get(index_col).map(str::trim).filter(|v| !v.is_empty()) {
                Some(raw) => match raw.parse::<i64>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        table.coerced_index += 1;
                        coerce_index(raw)
                    }
                },
                None => None,
            };
            let captured_at = record.get(time_col).and_then(parse_timestamp);

            table.rows.push(DatasetRow {
                segment: 0,
                index,
                captured_at,
            });
        }

        table.missing_values = missing_per_column.iter().sum();
        table.columns_with_missing = missing_per_column.iter().filter(|&&m| m > 0).count();
        debug!(
            "Loaded {} rows from {}",
            table.rows.len(),
            path.display()
        );
        Ok(table)
    }

    /// Rows whose timestamp cell was empty or unparseable.
    pub fn unparsed_timestamps(&self) -> usize {
        self.rows.iter().filter(|r| r.captured_at.is_none()).count()
    }

    /// Concatenate tables, giving each its own segment.
    pub fn concat<'a, I>(name: impl Into<String>, tables: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a DatasetTable>,
    {
        let mut merged = DatasetTable {
            name: name.into(),
            ..Default::default()
        };
        let mut parts = 0usize;
        for (segment, table) in tables.into_iter().enumerate() {
            parts += 1;
            merged.missing_values += table.missing_values;
            merged.columns_with_missing = merged.columns_with_missing.max(table.columns_with_missing);
            merged.coerced_index += table.coerced_index;
            merged
                .rows
                .extend(table.rows.iter().map(|row| DatasetRow { segment, ..row.clone() }));
        }
        if parts == 0 {
            return Err(CaptureError::Validation(
                "no datasets to concatenate".to_string(),
            ));
        }
        Ok(merged)
    }
}

/// Parse a timestamp in the dataset format or a common fallback.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    TIME_FALLBACKS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

fn coerce_index(raw: &str) -> Option<i64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}
