use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PricingError>;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("config error: {0}")]
    Config(String),

    #[error("catalog snapshot is empty")]
    EmptyCatalog,

    #[error("catalog row {row}: {reason}")]
    DataQuality { row: usize, reason: String },

    #[error("catalog is missing column `{0}`")]
    MissingColumn(String),

    #[error("index ({state}, {action}) out of range for a {states}x{actions} value table")]
    IndexOutOfRange {
        state: usize,
        action: usize,
        states: usize,
        actions: usize,
    },

    #[error("value table shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("discount levels mismatch: expected {expected:?}, found {found:?}")]
    DiscountLevelsMismatch { expected: Vec<f64>, found: Vec<f64> },

    #[error("training cancelled after {completed} episodes")]
    Cancelled { completed: usize },

    #[error("unknown product id `{0}`")]
    UnknownItem(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl PricingError {
    /// True for errors caused by the request rather than by the service state.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PricingError::UnknownItem(_))
    }
}
