//! WRDS PostgreSQL source.

use super::{Param, Query, QuerySource};
use crate::error::{DataError, Result};
use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Column as _, Row, TypeInfo};
use std::fmt;
use std::future::Future;
use tracing::info;

/// Environment variable holding the WRDS user name.
pub const WRDS_USER_VAR: &str = "WRDS_USER";

/// Environment variable holding the WRDS password.
pub const WRDS_PASS_VAR: &str = "WRDS_PASS";

/// WRDS login.
#[derive(Clone)]
pub struct WrdsCredentials {
    username: String,
    password: String,
}

impl WrdsCredentials {
    /// Create credentials from explicit values.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read `WRDS_USER` / `WRDS_PASS` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DataError::MissingCredential(key.to_string()))
        };
        Ok(Self::new(fetch(WRDS_USER_VAR)?, fetch(WRDS_PASS_VAR)?))
    }

    /// User name.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for WrdsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrdsCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection to the WRDS PostgreSQL server.
#[derive(Debug, Clone)]
pub struct WrdsSource {
    pool: PgPool,
}

impl WrdsSource {
    /// WRDS PostgreSQL host.
    pub const HOST: &'static str = "wrds-pgdata.wharton.upenn.edu";
    /// WRDS PostgreSQL port.
    pub const PORT: u16 = 9737;
    /// WRDS database name.
    pub const DATABASE: &'static str = "wrds";

    /// Open a TLS connection to WRDS.
    pub async fn connect(credentials: &WrdsCredentials) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(Self::HOST)
            .port(Self::PORT)
            .database(Self::DATABASE)
            .username(&credentials.username)
            .password(&credentials.password)
            .ssl_mode(PgSslMode::Require);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!(user = credentials.username(), "Connected to WRDS");
        Ok(Self { pool })
    }

    async fn run(&self, query: &Query) -> Result<DataFrame> {
        let mut q = sqlx::query(query.sql());
        for param in query.params() {
            q = match param {
                Param::Int(v) => q.bind(*v),
                Param::Float(v) => q.bind(*v),
                Param::Text(v) => q.bind(v.clone()),
                Param::Date(v) => q.bind(*v),
            };
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows_to_frame(&rows)
    }
}

impl QuerySource for WrdsSource {
    fn name(&self) -> &str {
        "wrds"
    }

    fn execute(&self, query: &Query) -> impl Future<Output = Result<DataFrame>> + Send {
        self.run(query)
    }
}

fn rows_to_frame(rows: &[PgRow]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Ok(DataFrame::empty());
    };

    let mut columns: Vec<Column> = Vec::with_capacity(first.columns().len());
    for (index, meta) in first.columns().iter().enumerate() {
        let name = meta.name();
        let type_name = meta.type_info().name();
        let series = match type_name {
            "INT2" => int_series(name, rows, index, |r, i| {
                r.try_get::<Option<i16>, _>(i).map(|v| v.map(i64::from))
            })?,
            "INT4" => int_series(name, rows, index, |r, i| {
                r.try_get::<Option<i32>, _>(i).map(|v| v.map(i64::from))
            })?,
            "INT8" => int_series(name, rows, index, |r, i| r.try_get::<Option<i64>, _>(i))?,
            "FLOAT4" => {
                let values = rows
                    .iter()
                    .map(|r| r.try_get::<Option<f32>, _>(index).map(|v| v.map(f64::from)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Series::new(name.into(), values)
            }
            "FLOAT8" => {
                let values = rows
                    .iter()
                    .map(|r| r.try_get::<Option<f64>, _>(index))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Series::new(name.into(), values)
            }
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                let values = rows
                    .iter()
                    .map(|r| r.try_get::<Option<String>, _>(index))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Series::new(name.into(), values)
            }
            "DATE" => {
                let values = rows
                    .iter()
                    .map(|r| {
                        r.try_get::<Option<chrono::NaiveDate>, _>(index)
                            .map(|v| v.map(|d| d.to_string()))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Series::new(name.into(), values)
            }
            other => {
                return Err(DataError::UnsupportedColumn {
                    column: name.to_string(),
                    type_name: other.to_string(),
                });
            }
        };
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

fn int_series<F>(name: &str, rows: &[PgRow], index: usize, get: F) -> Result<Series>
where
    F: Fn(&PgRow, usize) -> std::result::Result<Option<i64>, sqlx::Error>,
{
    let values = rows
        .iter()
        .map(|r| get(r, index))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Series::new(name.into(), values))
}
