//! SQLite-backed CRSP mirror.
//!
//! The mirror file is attached under the schema name `crsp`, so the same
//! `crsp.dsf` / `crsp.msenames` SQL runs here and against WRDS.

use super::{Param, Query, QuerySource};
use crate::error::{DataError, Result};
use crate::ids::Permno;
use chrono::NaiveDate;
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One row of the daily stock file (`crsp.dsf`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    /// Security identifier
    pub permno: Permno,
    /// Trading date
    pub date: NaiveDate,
    /// Shares outstanding (thousands)
    pub shrout: Option<f64>,
    /// Closing price; negative when it is a bid/ask average
    pub prc: Option<f64>,
    /// Holding period return
    pub ret: Option<f64>,
}

/// One row of the security names history (`crsp.msenames`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRecord {
    /// Security identifier
    pub permno: Permno,
    /// First date the name is valid
    pub namedt: Option<NaiveDate>,
    /// Last date the name is valid
    pub nameendt: Option<NaiveDate>,
    /// Ticker symbol
    pub ticker: Option<String>,
    /// Company name
    pub comnam: Option<String>,
    /// Share code
    pub shrcd: Option<i64>,
    /// Exchange code
    pub exchcd: Option<i64>,
}

/// Local CRSP mirror stored in SQLite.
#[derive(Debug)]
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    /// Open an existing mirror file.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database holding the `crsp` tables
    ///
    /// # Errors
    /// `DataError::MirrorNotFound` when `path` does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DataError::MirrorNotFound(path.to_path_buf()));
        }
        Self::attach(&path.to_string_lossy())
    }

    /// Open a mirror file, creating it with empty tables if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::attach(&path.as_ref().to_string_lossy())
    }

    /// Create an in-memory mirror (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::attach(":memory:")
    }

    fn attach(target: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("ATTACH DATABASE ?1 AS crsp", params![target])?;
        let source = Self {
            conn: Mutex::new(conn),
        };
        source.initialize_schema()?;
        Ok(source)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DataError::LockPoisoned)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        // Daily stock file
        conn.execute(
            "CREATE TABLE IF NOT EXISTS crsp.dsf (
                permno INTEGER NOT NULL,
                date TEXT NOT NULL,
                shrout REAL,
                prc REAL,
                ret REAL,
                PRIMARY KEY (permno, date)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS crsp.idx_dsf_date ON dsf(date)",
            [],
        )?;

        // Security names history
        conn.execute(
            "CREATE TABLE IF NOT EXISTS crsp.msenames (
                permno INTEGER NOT NULL,
                namedt TEXT,
                nameendt TEXT,
                ticker TEXT,
                comnam TEXT,
                shrcd INTEGER,
                exchcd INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS crsp.idx_msenames_permno ON msenames(permno)",
            [],
        )?;

        Ok(())
    }

    /// Store daily stock rows.
    pub fn put_daily(&self, records: &[DailyRecord]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for record in records {
            tx.execute(
                "INSERT OR REPLACE INTO crsp.dsf (permno, date, shrout, prc, ret)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.permno.get(),
                    record.date.to_string(),
                    record.shrout,
                    record.prc,
                    record.ret
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Store security name rows.
    pub fn put_names(&self, records: &[NameRecord]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for record in records {
            tx.execute(
                "INSERT INTO crsp.msenames
                 (permno, namedt, nameendt, ticker, comnam, shrcd, exchcd)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.permno.get(),
                    record.namedt.map(|d| d.to_string()),
                    record.nameendt.map(|d| d.to_string()),
                    record.ticker,
                    record.comnam,
                    record.shrcd,
                    record.exchcd
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn run(&self, query: &Query) -> Result<DataFrame> {
        let sql = to_sqlite_placeholders(query.sql());
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;

        for (i, param) in query.params().iter().enumerate() {
            let index = i + 1;
            match param {
                Param::Int(v) => stmt.raw_bind_parameter(index, v)?,
                Param::Float(v) => stmt.raw_bind_parameter(index, v)?,
                Param::Text(v) => stmt.raw_bind_parameter(index, v.as_str())?,
                Param::Date(v) => stmt.raw_bind_parameter(index, v.to_string())?,
            }
        }

        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut cells: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            for (j, column) in cells.iter_mut().enumerate() {
                column.push(row.get::<_, Value>(j)?);
            }
        }

        let columns: Vec<Column> = names
            .iter()
            .zip(cells)
            .map(|(name, values)| value_column(name, values))
            .collect();

        Ok(DataFrame::new(columns)?)
    }
}

impl QuerySource for SqliteSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn execute(&self, query: &Query) -> impl Future<Output = Result<DataFrame>> + Send {
        let result = self.run(query);
        async move { result }
    }
}

/// Rewrite `$n` placeholders to SQLite's `?n` form.
fn to_sqlite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            out.push('?');
        } else {
            out.push(c);
        }
    }
    out
}

/// Build a typed column from dynamically typed SQLite values.
///
/// Text anywhere makes a string column, otherwise any real makes a float
/// column, otherwise the column is integer.
fn value_column(name: &str, values: Vec<Value>) -> Column {
    let has_text = values
        .iter()
        .any(|v| matches!(v, Value::Text(_) | Value::Blob(_)));
    let has_real = values.iter().any(|v| matches!(v, Value::Real(_)));

    if has_text {
        let values: Vec<Option<String>> = values
            .into_iter()
            .map(|v| match v {
                Value::Text(s) => Some(s),
                Value::Integer(i) => Some(i.to_string()),
                Value::Real(f) => Some(f.to_string()),
                Value::Blob(_) | Value::Null => None,
            })
            .collect();
        Series::new(name.into(), values).into()
    } else if has_real {
        let values: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| match v {
                Value::Real(f) => Some(f),
                Value::Integer(i) => Some(i as f64),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values).into()
    } else {
        let values: Vec<Option<i64>> = values
            .into_iter()
            .map(|v| match v {
                Value::Integer(i) => Some(i),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values).into()
    }
}
