//! Security name history (`crsp.msenames`).

use crate::error::Result;
use crate::ids::Permno;
use crate::source::{
    Query, QuerySource, i64_column, opt_date_column, opt_i64_column, opt_string_column,
    placeholders,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One name-history row for a security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockInfo {
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
    /// CRSP share code
    pub shrcd: Option<i64>,
    /// CRSP exchange code
    pub exchcd: Option<i64>,
}

/// Fetch every name-history row for `permnos`, ordered by permno then start date.
pub async fn fetch_info<S: QuerySource>(source: &S, permnos: &[Permno]) -> Result<Vec<StockInfo>> {
    let ids: Vec<Permno> = permnos.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT CAST(permno AS INTEGER) AS permno, CAST(namedt AS TEXT) AS namedt, \
         CAST(nameendt AS TEXT) AS nameendt, CAST(ticker AS TEXT) AS ticker, \
         CAST(comnam AS TEXT) AS comnam, CAST(shrcd AS INTEGER) AS shrcd, \
         CAST(exchcd AS INTEGER) AS exchcd \
         FROM crsp.msenames WHERE permno IN ({}) ORDER BY permno, namedt",
        placeholders(1, ids.len())
    );
    let query = Query::new(sql).bind_all(ids);

    let df = source.execute(&query).await?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let permno = i64_column(&df, "permno")?;
    let namedt = opt_date_column(&df, "namedt")?;
    let nameendt = opt_date_column(&df, "nameendt")?;
    let ticker = opt_string_column(&df, "ticker")?;
    let comnam = opt_string_column(&df, "comnam")?;
    let shrcd = opt_i64_column(&df, "shrcd")?;
    let exchcd = opt_i64_column(&df, "exchcd")?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        rows.push(StockInfo {
            permno: Permno(permno[i]),
            namedt: namedt[i],
            nameendt: nameendt[i],
            ticker: ticker[i].clone(),
            comnam: comnam[i].clone(),
            shrcd: shrcd[i],
            exchcd: exchcd[i],
        });
    }
    Ok(rows)
}
