//! Month-end market-cap snapshots.

use super::MembershipPanel;
use chrono::NaiveDate;
use r3k_data::crsp::{MarketCap, fetch_market_caps};
use r3k_data::{DataError, Permno, QuerySource, Result, YearMonth};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Snapshot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Number of largest securities kept per snapshot
    pub top_n: usize,
    /// Calendar days searched backwards for a trading day
    pub max_lookback_days: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            top_n: 3000,
            max_lookback_days: 10,
        }
    }
}

/// Result of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Date asked for
    pub requested: NaiveDate,
    /// Trading date actually used
    pub resolved: NaiveDate,
    /// Members, largest market cap first
    pub members: Vec<Permno>,
}

impl Snapshot {
    /// Month row the snapshot is recorded under.
    pub fn month(&self) -> YearMonth {
        YearMonth::of(self.resolved)
    }
}

/// The `n` largest securities by `|shrout| * |prc|`.
///
/// Rows with a non-finite market cap are ignored. Ties keep input order.
pub fn select_top(caps: &[MarketCap], n: usize) -> Vec<Permno> {
    let mut ranked: Vec<(f64, Permno)> = caps
        .iter()
        .map(|c| (c.value(), c.permno))
        .filter(|(v, _)| v.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked.into_iter().take(n).map(|(_, p)| p).collect()
}

/// Builds membership rows from the daily stock file.
#[derive(Debug)]
pub struct MembershipSnapshotter<'a, S> {
    source: &'a S,
    config: SnapshotConfig,
}

impl<'a, S: QuerySource> MembershipSnapshotter<'a, S> {
    /// Create a snapshotter over `source`.
    pub const fn new(source: &'a S, config: SnapshotConfig) -> Self {
        Self { source, config }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Rank securities on `date`, or on the closest earlier trading day.
    ///
    /// # Errors
    /// `DataError::NoTradingData` when nothing traded on `date` or in the
    /// `max_lookback_days` calendar days before it.
    pub async fn snapshot(&self, date: NaiveDate) -> Result<Snapshot> {
        let lookback_days = self.config.max_lookback_days;
        let mut day = date;

        for step in 0..=lookback_days {
            let caps = fetch_market_caps(self.source, day).await?;
            if !caps.is_empty() {
                return Ok(Snapshot {
                    requested: date,
                    resolved: day,
                    members: select_top(&caps, self.config.top_n),
                });
            }

            debug!(%day, step, "No trading data, stepping back one day");
            match day.pred_opt() {
                Some(prev) => day = prev,
                None => break,
            }
        }

        Err(DataError::NoTradingData {
            date,
            lookback_days,
        })
    }

    /// Snapshot `date` and mark the members in `panel` at the resolved month.
    pub async fn update(&self, panel: &mut MembershipPanel, date: NaiveDate) -> Result<Snapshot> {
        let snapshot = self.snapshot(date).await?;
        panel.mark(snapshot.month(), snapshot.members.iter().copied());

        info!(
            requested = %snapshot.requested,
            resolved = %snapshot.resolved,
            members = snapshot.members.len(),
            "Membership snapshot"
        );
        Ok(snapshot)
    }
}
