//! SQL data sources.
//!
//! The pipeline only needs one thing from a database: run a query and hand
//! back a table with named columns. [`QuerySource`] captures that contract;
//! [`WrdsSource`] talks to the WRDS PostgreSQL server and [`SqliteSource`]
//! reads a local CRSP mirror laid out with the same `crsp.*` table names.
//!
//! Queries are always parameterised. SQL text uses `$1, $2, ...`
//! placeholders and values travel separately as [`Param`]s.

mod columns;
pub mod sqlite;
pub mod wrds;

pub(crate) use columns::{
    date_column, f64_column, i64_column, opt_date_column, opt_i64_column, opt_string_column,
};
pub use sqlite::{DailyRecord, NameRecord, SqliteSource};
pub use wrds::{WrdsCredentials, WrdsSource};

use crate::error::Result;
use crate::ids::Permno;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::future::Future;

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Calendar date
    Date(NaiveDate),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDate> for Param {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<Permno> for Param {
    fn from(value: Permno) -> Self {
        Self::Int(value.get())
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Param>,
}

impl Query {
    /// Create a query with no parameters bound yet.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next positional parameter.
    #[must_use]
    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Bind several parameters in order.
    #[must_use]
    pub fn bind_all<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Comma separated `$first, $first+1, ...` placeholders for an `IN (...)` list.
pub fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Anything that can execute a query and return a table.
///
/// An empty result may come back as a DataFrame without columns; callers
/// check `height()` before reading columns.
pub trait QuerySource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Execute `query` and collect the full result.
    fn execute(&self, query: &Query) -> impl Future<Output = Result<DataFrame>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3, 3), "$3, $4, $5");
        assert_eq!(placeholders(1, 1), "$1");
        assert_eq!(placeholders(1, 0), "");
    }

    #[test]
    fn test_bind_order() {
        let query = Query::new("SELECT 1 WHERE a = $1 AND b IN ($2, $3)")
            .bind(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap())
            .bind_all([Permno(10001), Permno(10002)]);
        assert_eq!(query.params().len(), 3);
        assert_eq!(query.params()[1], Param::Int(10001));
        assert!(matches!(query.params()[0], Param::Date(_)));
    }
}
