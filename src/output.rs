//! Output formatting and persistence for crawled series.
//!
//! Supports pretty-printing, JSON logging, and comma-delimited tables.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::table::{DATE_COLUMN, HourlyTable, Row, WideTable, join_tables};

/// File name of the combined table written by [`merge_dir`].
pub const MERGED_FILE_NAME: &str = "merge.csv";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_rows<T>(path: &Path, table: &WideTable<T>, format: impl Fn(&T) -> String) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    writer.write_record(table.header())?;
    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(format(&row.date));
        record.extend(row.values.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = table.row_count(), "Table written");
    Ok(())
}

/// Writes a date-keyed table with a `Date,<label>...` header.
///
/// Parent directories are created as needed; an existing file is replaced.
pub fn write_table(path: &Path, table: &WideTable) -> Result<()> {
    write_rows(path, table, |d| d.format(DATE_FORMAT).to_string())
}

/// Writes an hourly table; the date column carries a full timestamp.
pub fn write_hourly(path: &Path, table: &HourlyTable) -> Result<()> {
    write_rows(path, table, |d| d.format(DATETIME_FORMAT).to_string())
}

/// Reads a table previously written by [`write_table`].
pub fn read_table(path: &Path) -> Result<WideTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    match headers.get(0) {
        Some(DATE_COLUMN) => {}
        other => bail!(
            "{}: first column must be {DATE_COLUMN}, found {:?}",
            path.display(),
            other
        ),
    }
    let labels: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw_date, DATETIME_FORMAT).map(|dt| dt.date())
            })
            .with_context(|| format!("{}: bad date {raw_date:?}", path.display()))?;
        let values = record
            .iter()
            .skip(1)
            .map(|v| if v.is_empty() { Ok(0.0) } else { v.parse::<f64>() })
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("{}: bad value on {raw_date}", path.display()))?;
        if values.len() != labels.len() {
            bail!("{}: row {raw_date} has {} values", path.display(), values.len());
        }
        rows.push(Row { date, values });
    }

    Ok(WideTable { labels, rows })
}

/// Suffixes every label that occurs in more than one table with `_<file stem>`.
fn qualify_shared_labels(paths: &[PathBuf], tables: &mut [WideTable]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for label in tables.iter().flat_map(|t| &t.labels) {
        *counts.entry(label.clone()).or_default() += 1;
    }

    for (path, table) in paths.iter().zip(tables.iter_mut()) {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        for label in &mut table.labels {
            if counts[label.as_str()] > 1 {
                let qualified = format!("{label}_{stem}");
                warn!(
                    label = %label,
                    qualified = %qualified,
                    "Column name shared by several tables"
                );
                *label = qualified;
            }
        }
    }
}

/// Joins every CSV table in `dir` on the date axis and writes [`MERGED_FILE_NAME`].
///
/// Inputs are taken in file-name order. A column name found in several inputs
/// (the same keyword crawled for different regions) gets the input's file stem
/// appended. Returns `None` when the directory holds no tables.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn merge_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(MERGED_FILE_NAME))
        .collect();
    inputs.sort();

    let mut tables = inputs
        .iter()
        .map(|path| read_table(path))
        .collect::<Result<Vec<_>>>()?;
    qualify_shared_labels(&inputs, &mut tables);

    let mut pending = inputs.iter().zip(tables);
    let Some((_, mut merged)) = pending.next() else {
        info!("No tables to merge");
        return Ok(None);
    };
    for (path, table) in pending {
        merged = join_tables(merged, table)
            .with_context(|| format!("Failed to merge {}", path.display()))?;
    }

    let dest = dir.join(MERGED_FILE_NAME);
    write_table(&dest, &merged)?;
    info!(
        inputs = inputs.len(),
        columns = merged.labels.len(),
        rows = merged.row_count(),
        path = %dest.display(),
        "Merged tables"
    );

    Ok(Some(dest))
}
