//! Database selection for the CLI.

use polars::prelude::DataFrame;
use r3k_data::source::{SqliteSource, WrdsCredentials, WrdsSource};
use r3k_data::{Query, QuerySource, Result};
use std::future::Future;
use std::path::Path;
use tracing::info;

/// WRDS or a local SQLite mirror.
#[derive(Debug)]
pub(crate) enum AnySource {
    Wrds(WrdsSource),
    Sqlite(SqliteSource),
}

impl AnySource {
    /// Open the mirror at `sqlite` if given, otherwise connect to WRDS with
    /// credentials from the environment.
    pub(crate) async fn connect(sqlite: Option<&Path>) -> Result<Self> {
        match sqlite {
            Some(path) => {
                info!(path = %path.display(), "Using local CRSP mirror");
                Ok(Self::Sqlite(SqliteSource::open(path)?))
            }
            None => {
                let credentials = WrdsCredentials::from_env()?;
                Ok(Self::Wrds(WrdsSource::connect(&credentials).await?))
            }
        }
    }
}

impl QuerySource for AnySource {
    fn name(&self) -> &str {
        match self {
            Self::Wrds(s) => s.name(),
            Self::Sqlite(s) => s.name(),
        }
    }

    fn execute(&self, query: &Query) -> impl Future<Output = Result<DataFrame>> + Send {
        async move {
            match self {
                Self::Wrds(s) => s.execute(query).await,
                Self::Sqlite(s) => s.execute(query).await,
            }
        }
    }
}
