//! Typed column extraction from query results.
//!
//! Databases disagree on numeric widths (CRSP stores `permno` as a double on
//! some mirrors), so every accessor casts before reading.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use polars::prelude::*;

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))
}

/// Integer column; nulls are an error.
pub(crate) fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let cast = column(df, name)?.cast(&DataType::Int64)?;
    cast.i64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| DataError::Parse(format!("Null value in column {}", name))))
        .collect()
}

/// Optional integer column.
pub(crate) fn opt_i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let cast = column(df, name)?.cast(&DataType::Int64)?;
    Ok(cast.i64()?.into_iter().collect())
}

/// Float column; nulls become `NaN`.
pub(crate) fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let cast = column(df, name)?.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Optional string column.
pub(crate) fn opt_string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let cast = column(df, name)?.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect())
}

/// Optional `YYYY-MM-DD` date column.
pub(crate) fn opt_date_column(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    opt_string_column(df, name)?
        .into_iter()
        .map(|v| v.map(|s| parse_date(&s)).transpose())
        .collect()
}

/// `YYYY-MM-DD` date column; nulls are an error.
pub(crate) fn date_column(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
    opt_date_column(df, name)?
        .into_iter()
        .map(|v| v.ok_or_else(|| DataError::Parse(format!("Null value in column {}", name))))
        .collect()
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    // Postgres renders timestamps as "YYYY-MM-DD HH:MM:SS" when cast to text.
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| DataError::Parse(format!("Invalid date {:?}: {}", value, e)))
}
