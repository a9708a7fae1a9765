//! Error types for data operations.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The shared SQLite connection was poisoned by a panic
    #[error("SQLite connection lock poisoned")]
    LockPoisoned,

    /// PostgreSQL (WRDS) error
    #[error("WRDS error: {0}")]
    Wrds(#[from] sqlx::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: NaiveDate,
        /// End date of the range
        end: NaiveDate,
    },

    /// No trading data found within the backward search window
    #[error("No trading data on or up to {lookback_days} days before {date}")]
    NoTradingData {
        /// Date originally requested
        date: NaiveDate,
        /// Number of calendar days searched backwards
        lookback_days: u32,
    },

    /// A query returned a column the decoder does not understand
    #[error("Unsupported column type {type_name} for column {column}")]
    UnsupportedColumn {
        /// Column name
        column: String,
        /// Database type name
        type_name: String,
    },

    /// A query result is missing an expected column
    #[error("Missing column in query result: {0}")]
    MissingColumn(String),

    /// Panel shape error
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
        /// What was being checked
        context: String,
    },

    /// Fama-French file layout did not match the expected format
    #[error("Factor file {file} line {line}: {reason}")]
    FactorFormat {
        /// Archive name
        file: String,
        /// 1-based line number within the CSV
        line: usize,
        /// What went wrong
        reason: String,
    },

    /// Missing credential in the process environment
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// Local mirror file does not exist
    #[error("CRSP mirror not found: {0}")]
    MirrorNotFound(PathBuf),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Zip archive error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
