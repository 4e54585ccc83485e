use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use crate::error::Result;
use crate::series::{DateRange, Series, materialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearlyAverage {
    pub year: i32,
    pub average: f64,
}

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Groups a series by the calendar year of each record and averages each group.
///
/// Years come out ascending. A year with no records on the axis has no entry.
pub fn averages_by_year(series: &Series) -> Vec<YearlyAverage> {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for record in &series.records {
        by_year
            .entry(record.date.year())
            .or_default()
            .push(record.value);
    }

    by_year
        .into_iter()
        .map(|(year, values)| YearlyAverage {
            year,
            average: mean(&values),
        })
        .collect()
}

/// Materializes a decoded payload and reduces it to yearly averages.
pub fn yearly_averages(range: &DateRange, decoded: &str) -> Result<Vec<YearlyAverage>> {
    let series = materialize(range, decoded, "value")?;
    Ok(averages_by_year(&series))
}
