//! Turns a decoded payload into dated records.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Longest inclusive span, in days, for which the service answers with daily values.
pub const DAILY_SPAN_LIMIT: i64 = 366;

/// Inclusive calendar date range of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parses two `YYYY-MM-DD` strings. Single-digit months and days are accepted.
    pub fn parse(start: &str, end: &str) -> std::result::Result<Self, chrono::ParseError> {
        Ok(Self {
            start: NaiveDate::parse_from_str(start, "%Y-%m-%d")?,
            end: NaiveDate::parse_from_str(end, "%Y-%m-%d")?,
        })
    }

    /// Inclusive number of days covered by the range.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn granularity(&self) -> Granularity {
        if self.span_days() <= DAILY_SPAN_LIMIT {
            Granularity::Daily
        } else {
            Granularity::Weekly
        }
    }

    /// Generates `count` dates from `start` at the range's granularity.
    ///
    /// The count comes from the payload, not the span: a short payload under a
    /// long daily span still yields only `count` dates.
    pub fn axis(&self, count: usize) -> Vec<NaiveDate> {
        match self.granularity() {
            Granularity::Daily => self.start.iter_days().take(count).collect(),
            Granularity::Weekly => self.start.iter_weeks().take(count).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSeriesRecord {
    pub date: NaiveDate,
    pub value: f64,
}

/// A labelled sequence of records, one per decoded token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub records: Vec<TimeSeriesRecord>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.records.iter().map(|r| r.date)
    }
}

/// Splits a decoded payload on commas and parses each token.
///
/// Empty tokens are zero. Any other token that is not a finite number
/// (including `NaN` and `inf`) fails the whole payload.
pub fn parse_tokens(decoded: &str) -> Result<Vec<f64>> {
    decoded
        .split(',')
        .enumerate()
        .map(|(index, raw)| {
            let token = raw.trim();
            if token.is_empty() {
                return Ok(0.0);
            }
            token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CoreError::MalformedSeriesToken {
                    index,
                    token: raw.to_string(),
                })
        })
        .collect()
}

/// Builds the dated record sequence for one decoded payload.
pub fn materialize(range: &DateRange, decoded: &str, label: &str) -> Result<Series> {
    let values = parse_tokens(decoded)?;
    let axis = range.axis(values.len());
    if axis.len() != values.len() {
        return Err(CoreError::AxisOutOfRange {
            start: range.start,
            count: values.len(),
        });
    }

    let records = axis
        .into_iter()
        .zip(values)
        .map(|(date, value)| TimeSeriesRecord { date, value })
        .collect();

    Ok(Series {
        label: label.to_string(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).unwrap()
    }

    #[test]
    fn test_materialize_daily() {
        let series = materialize(&range("2024-01-01", "2024-01-03"), "1,2,3", "x").unwrap();
        assert_eq!(series.label, "x");
        assert_eq!(
            series.records,
            vec![
                TimeSeriesRecord {
                    date: date("2024-01-01"),
                    value: 1.0
                },
                TimeSeriesRecord {
                    date: date("2024-01-02"),
                    value: 2.0
                },
                TimeSeriesRecord {
                    date: date("2024-01-03"),
                    value: 3.0
                },
            ]
        );
    }

    #[test]
    fn test_empty_token_is_zero() {
        let series = materialize(&range("2024-01-01", "2024-01-03"), "1,,3", "x").unwrap();
        assert_eq!(series.records[1].value, 0.0);
        assert_eq!(series.records[1].date, date("2024-01-02"));
    }

    #[test]
    fn test_span_of_366_days_is_daily() {
        let r = range("2024-01-01", "2024-12-31");
        assert_eq!(r.span_days(), 366);
        assert_eq!(r.granularity(), Granularity::Daily);

        let series = materialize(&r, "1,2,3", "x").unwrap();
        let dates: Vec<_> = series.dates().collect();
        assert_eq!(
            dates,
            vec![date("2024-01-01"), date("2024-01-02"), date("2024-01-03")]
        );
    }

    #[test]
    fn test_span_of_367_days_is_weekly() {
        let r = range("2024-01-01", "2025-01-01");
        assert_eq!(r.span_days(), 367);
        assert_eq!(r.granularity(), Granularity::Weekly);

        let series = materialize(&r, "1,2,3", "x").unwrap();
        let dates: Vec<_> = series.dates().collect();
        assert_eq!(
            dates,
            vec![date("2024-01-01"), date("2024-01-08"), date("2024-01-15")]
        );
    }

    #[test]
    fn test_token_count_drives_length() {
        // 31-day daily span, two tokens
        let series = materialize(&range("2024-03-01", "2024-03-31"), "5,6", "x").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.records[1].date, date("2024-03-02"));

        // more tokens than days in the span
        let series = materialize(&range("2024-03-01", "2024-03-02"), "1,2,3,4", "x").unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series.records[3].date, date("2024-03-04"));
    }

    #[test]
    fn test_malformed_token_fails_series() {
        let err = materialize(&range("2024-01-01", "2024-01-03"), "1,abc,3", "x").unwrap_err();
        assert_eq!(
            err,
            CoreError::MalformedSeriesToken {
                index: 1,
                token: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_non_finite_tokens_are_malformed() {
        for token in ["NaN", "nan", "inf", "-infinity"] {
            let err = parse_tokens(&format!("1,{token},3")).unwrap_err();
            assert_eq!(
                err,
                CoreError::MalformedSeriesToken {
                    index: 1,
                    token: token.to_string()
                }
            );
        }
    }

    #[test]
    fn test_axis_past_last_date_fails() {
        let r = DateRange::new(NaiveDate::MAX, NaiveDate::MAX);
        let err = materialize(&r, "1,2,3", "x").unwrap_err();
        assert_eq!(
            err,
            CoreError::AxisOutOfRange {
                start: NaiveDate::MAX,
                count: 3
            }
        );
    }

    #[test]
    fn test_whitespace_tokens() {
        let values = parse_tokens(" 1, ,2.5").unwrap();
        assert_eq!(values, vec![1.0, 0.0, 2.5]);
    }

    #[test]
    fn test_empty_payload_is_single_zero() {
        assert_eq!(parse_tokens("").unwrap(), vec![0.0]);
    }

    #[test]
    fn test_reversed_range_is_daily() {
        let r = range("2024-02-01", "2024-01-01");
        assert!(r.span_days() <= 0);
        assert_eq!(r.granularity(), Granularity::Daily);
    }

    #[test]
    fn test_parse_accepts_unpadded_dates() {
        let r = range("2024-7-1", "2024-8-31");
        assert_eq!(r.start, date("2024-07-01"));
        assert_eq!(r.span_days(), 62);
    }
}
