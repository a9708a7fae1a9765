//! Cross-sectional market capitalisation for one trading date.

use crate::error::Result;
use crate::ids::Permno;
use crate::source::{Query, QuerySource, f64_column, i64_column};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const MARKET_CAP_SQL: &str = "SELECT CAST(permno AS INTEGER) AS permno, \
     CAST(shrout AS DOUBLE PRECISION) AS shrout, \
     CAST(prc AS DOUBLE PRECISION) AS prc \
     FROM crsp.dsf WHERE date = $1";

/// Shares and price for one security on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketCap {
    /// Security identifier
    pub permno: Permno,
    /// Shares outstanding (thousands), `NaN` if missing
    pub shrout: f64,
    /// Price, negative for bid/ask averages, `NaN` if missing
    pub prc: f64,
}

impl MarketCap {
    /// `|shrout| * |prc|`; `NaN` when either input is missing.
    pub fn value(&self) -> f64 {
        self.shrout.abs() * self.prc.abs()
    }
}

/// Fetch `(permno, shrout, prc)` for every security trading on `date`.
///
/// Rows come back in the order the database returned them. An empty vector
/// means nothing traded on `date`.
pub async fn fetch_market_caps<S: QuerySource>(source: &S, date: NaiveDate) -> Result<Vec<MarketCap>> {
    let query = Query::new(MARKET_CAP_SQL).bind(date);
    let df = source.execute(&query).await?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let permnos = i64_column(&df, "permno")?;
    let shrout = f64_column(&df, "shrout")?;
    let prc = f64_column(&df, "prc")?;

    Ok(permnos
        .into_iter()
        .zip(shrout)
        .zip(prc)
        .map(|((permno, shrout), prc)| MarketCap {
            permno: Permno(permno),
            shrout,
            prc,
        })
        .collect())
}
