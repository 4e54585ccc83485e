//! Errors raised by the pure decode/materialize/join core.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid key table: {reason}")]
    InvalidKeyTable { reason: String },

    #[error("symbol {symbol:?} at position {position} is not in the key table")]
    DecodeKeyMismatch { symbol: char, position: usize },

    #[error("token {index} is not a finite number: {token:?}")]
    MalformedSeriesToken { index: usize, token: String },

    #[error("{count} dates from {start} run past the last representable date")]
    AxisOutOfRange { start: NaiveDate, count: usize },

    #[error("series {label:?} does not share the date axis of {reference:?}")]
    AxisMismatch { label: String, reference: String },

    #[error("column {label:?} appears more than once")]
    DuplicateLabel { label: String },
}
