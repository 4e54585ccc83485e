//! Date-keyed wide tables built from several series sharing one axis.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::{CoreError, Result};
use crate::series::Series;

/// Name of the date column in every persisted table.
pub const DATE_COLUMN: &str = "Date";

#[derive(Debug, Clone, PartialEq)]
pub struct Row<T> {
    pub date: T,
    pub values: Vec<f64>,
}

/// One row per date, one value column per series label.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable<T = NaiveDate> {
    pub labels: Vec<String>,
    pub rows: Vec<Row<T>>,
}

/// Hourly re-sampling of a [`WideTable`].
pub type HourlyTable = WideTable<NaiveDateTime>;

impl<T> WideTable<T> {
    /// Header labels including the leading date column.
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(DATE_COLUMN)
            .chain(self.labels.iter().map(String::as_str))
            .collect()
    }

    pub fn column_count(&self) -> usize {
        self.labels.len() + 1
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Joins series on their shared date axis.
///
/// Every series must carry exactly the same dates in the same order as the
/// first one; anything else is an [`CoreError::AxisMismatch`]. Labels must be
/// unique.
pub fn join(series: &[Series]) -> Result<WideTable> {
    let Some(reference) = series.first() else {
        return Ok(WideTable {
            labels: Vec::new(),
            rows: Vec::new(),
        });
    };

    for other in &series[1..] {
        if other.len() != reference.len() || !other.dates().eq(reference.dates()) {
            return Err(CoreError::AxisMismatch {
                label: other.label.clone(),
                reference: reference.label.clone(),
            });
        }
    }

    check_unique_labels(series.iter().map(|s| s.label.as_str()))?;

    let rows = reference
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| Row {
            date: record.date,
            values: series.iter().map(|s| s.records[i].value).collect(),
        })
        .collect();

    Ok(WideTable {
        labels: series.iter().map(|s| s.label.clone()).collect(),
        rows,
    })
}

fn check_unique_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(CoreError::DuplicateLabel {
                label: label.to_string(),
            });
        }
    }
    Ok(())
}

fn first_label(table: &WideTable) -> String {
    table
        .labels
        .first()
        .map_or(DATE_COLUMN, String::as_str)
        .to_string()
}

/// Joins two tables column-wise, keeping `left`'s columns first.
///
/// The date axes are compared directly, so a table without value columns
/// still has to match.
pub fn join_tables(mut left: WideTable, right: WideTable) -> Result<WideTable> {
    let left_dates = left.rows.iter().map(|r| r.date);
    if !left_dates.eq(right.rows.iter().map(|r| r.date)) {
        return Err(CoreError::AxisMismatch {
            label: first_label(&right),
            reference: first_label(&left),
        });
    }

    left.labels.extend(right.labels);
    check_unique_labels(left.labels.iter().map(String::as_str))?;
    for (row, other) in left.rows.iter_mut().zip(right.rows) {
        row.values.extend(other.values);
    }
    Ok(left)
}

/// Re-samples a table onto an hourly axis from its first to its last date.
///
/// Values between two observations are linearly interpolated. Rows are
/// expected in ascending date order.
pub fn expand_hourly(table: &WideTable) -> HourlyTable {
    let mut rows = Vec::new();
    let hour = TimeDelta::hours(1);

    for pair in table.rows.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let start = from.date.and_time(chrono::NaiveTime::MIN);
        let end = to.date.and_time(chrono::NaiveTime::MIN);
        let total = (end - start).num_hours();
        if total <= 0 {
            continue;
        }

        let mut at = start;
        for step in 0..total {
            let t = step as f64 / total as f64;
            rows.push(Row {
                date: at,
                values: from
                    .values
                    .iter()
                    .zip(&to.values)
                    .map(|(a, b)| a + (b - a) * t)
                    .collect(),
            });
            at += hour;
        }
    }

    if let Some(last) = table.rows.last() {
        rows.push(Row {
            date: last.date.and_time(chrono::NaiveTime::MIN),
            values: last.values.clone(),
        });
    }

    WideTable {
        labels: table.labels.clone(),
        rows,
    }
}
