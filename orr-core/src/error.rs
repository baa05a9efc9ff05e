//! Error types shared by the core pipeline

use thiserror::Error;

/// Errors raised while aligning, persisting or resampling timelines
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid time offset {0:?}")]
    InvalidOffset(String),

    #[error("table has no `time_offset` column")]
    MissingOffsetColumn,

    #[error("column `{name}` has {actual} values, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("competitor {driver_number} has no usable {stream} samples")]
    EmptyStream {
        driver_number: u32,
        stream: &'static str,
    },

    #[error("table has no rows")]
    EmptyTable,

    #[error("invalid frame step {0} ms")]
    InvalidStep(i64),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
