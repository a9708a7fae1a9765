//! Daily returns for a set of securities.

use crate::error::{DataError, Result};
use crate::ids::Permno;
use crate::panel::ReturnsPanel;
use crate::source::{Query, QuerySource, date_column, f64_column, i64_column, placeholders};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

/// Fetch daily returns for `permnos` over `[start, end]` and pivot them wide.
///
/// Columns are the permnos with data in ascending order, then requested
/// permnos without any rows in the caller's order as all-`NaN` columns.
/// Duplicate requests collapse to one column.
///
/// # Errors
/// `DataError::InvalidDateRange` when `start > end`.
pub async fn fetch_returns<S: QuerySource>(
    source: &S,
    start: NaiveDate,
    end: NaiveDate,
    permnos: &[Permno],
) -> Result<ReturnsPanel> {
    if start > end {
        return Err(DataError::InvalidDateRange { start, end });
    }

    let mut seen = HashSet::new();
    let requested: Vec<Permno> = permnos.iter().copied().filter(|p| seen.insert(*p)).collect();
    if requested.is_empty() {
        return Ok(ReturnsPanel::empty());
    }

    let sql = format!(
        "SELECT CAST(permno AS INTEGER) AS permno, CAST(date AS TEXT) AS date, \
         CAST(ret AS DOUBLE PRECISION) AS ret \
         FROM crsp.dsf WHERE permno IN ({}) AND date >= $1 AND date <= $2 \
         ORDER BY permno, date",
        placeholders(3, requested.len())
    );
    let query = Query::new(sql)
        .bind(start)
        .bind(end)
        .bind_all(requested.iter().copied());

    debug!(
        source = source.name(),
        permnos = requested.len(),
        %start,
        %end,
        "Fetching daily returns"
    );

    let df = source.execute(&query).await?;
    if df.height() == 0 {
        return Ok(ReturnsPanel::from_long(Vec::new(), &requested));
    }

    let ids = i64_column(&df, "permno")?;
    let dates = date_column(&df, "date")?;
    let rets = f64_column(&df, "ret")?;

    let rows = ids
        .into_iter()
        .zip(dates)
        .zip(rets)
        .map(|((id, date), ret)| (Permno(id), date, ret));

    Ok(ReturnsPanel::from_long(rows, &requested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DailyRecord, SqliteSource};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_range() {
        let source = SqliteSource::in_memory().unwrap();
        let result = fetch_returns(&source, date(2020, 2, 1), date(2020, 1, 1), &[Permno(1)]).await;
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_empty_request() {
        let source = SqliteSource::in_memory().unwrap();
        let panel = fetch_returns(&source, date(2020, 1, 1), date(2020, 1, 31), &[])
            .await
            .unwrap();
        assert_eq!(panel.width(), 0);
        assert_eq!(panel.height(), 0);
    }

    #[tokio::test]
    async fn test_window_is_inclusive_and_dedups() {
        let source = SqliteSource::in_memory().unwrap();
        let rows: Vec<DailyRecord> = [2, 3, 6]
            .into_iter()
            .map(|d| DailyRecord {
                permno: Permno(7),
                date: date(2020, 1, d),
                shrout: None,
                prc: None,
                ret: Some(d as f64 / 100.0),
            })
            .collect();
        source.put_daily(&rows).unwrap();

        let panel = fetch_returns(&source, date(2020, 1, 2), date(2020, 1, 3), &[Permno(7), Permno(7)])
            .await
            .unwrap();
        assert_eq!(panel.permnos(), &[Permno(7)]);
        assert_eq!(panel.dates(), &[date(2020, 1, 2), date(2020, 1, 3)]);
    }
}
