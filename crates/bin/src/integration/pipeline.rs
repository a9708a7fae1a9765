//! Batch runs over the data directory.
//!
//! Each run reads what earlier runs wrote (see [`DataLayout`]) and writes its
//! own output. The order is constituents, returns, info, fama, loadings.

use super::layout::DataLayout;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use r3k::{MembershipPanel, MembershipSnapshotter, SnapshotConfig};
use r3k_data::crsp::{fetch_info, fetch_returns};
use r3k_data::french::{Factor, FrenchClient};
use r3k_data::{DataError, QuerySource, ReturnsPanel, YearMonth};
use r3k_output::{
    ExportError, ExportFormat, Exporter, PanelStore, StoreError, WriteOutcome, read_factor_table,
    read_membership,
};
use r3k_risk::{LoadingConfig, LoadingEstimator};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Error type for pipeline runs.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PipelineError {
    /// Database, parse or download error.
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    /// Panel store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Reading or writing a CSV file failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Settings shared by every run.
#[derive(Debug, Clone)]
pub(crate) struct PipelineConfig {
    /// First date of the window.
    pub start: NaiveDate,
    /// Last date of the window.
    pub end: NaiveDate,
    /// Universe size and trading-day search.
    pub snapshot: SnapshotConfig,
    /// Months before each membership month whose returns are also fetched.
    pub lookback_months: usize,
    /// Months of returns pooled per loadings regression.
    pub window: usize,
    /// Concurrent panel file reads.
    pub concurrency: usize,
    /// Loading estimator settings.
    pub loadings: LoadingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2000, 12, 31).unwrap_or_default(),
            snapshot: SnapshotConfig::default(),
            lookback_months: 1,
            window: 1,
            concurrency: 8,
            loadings: LoadingConfig::default(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct RunSummary {
    /// Run name.
    pub run: &'static str,
    /// Files created.
    pub written: usize,
    /// Files already present and left alone.
    pub skipped: usize,
    /// Months with nothing to do.
    pub empty: usize,
    /// Records written across all files.
    pub records: usize,
    /// Recoverable problems reported along the way.
    pub warnings: usize,
    /// Main output location.
    pub output: PathBuf,
}

impl RunSummary {
    fn new(run: &'static str, output: PathBuf) -> Self {
        Self {
            run,
            output,
            ..Self::default()
        }
    }
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}

/// Snapshot every month end in the window and write the membership file.
///
/// A month end with no trading data inside the lookback is reported and
/// skipped; any other error ends the run.
pub(crate) async fn run_constituents<S: QuerySource>(
    source: &S,
    layout: &DataLayout,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new("constituents", layout.membership_path());
    let dates = YearMonth::month_ends(config.start, config.end);
    let snapshotter = MembershipSnapshotter::new(source, config.snapshot);
    let mut panel = MembershipPanel::with_months(dates.iter().copied().map(YearMonth::of));

    let pb = progress_bar(dates.len(), "Snapshotting month ends...");
    for date in dates {
        match snapshotter.update(&mut panel, date).await {
            Ok(snapshot) => summary.records += snapshot.members.len(),
            Err(e @ DataError::NoTradingData { .. }) => {
                pb.suspend(|| eprintln!("Warning: {}", e));
                summary.warnings += 1;
            }
            Err(e) => {
                pb.abandon();
                return Err(e.into());
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    panel.export_to_file(&summary.output, ExportFormat::Csv)?;
    summary.written = 1;
    info!(
        path = %summary.output.display(),
        months = panel.len(),
        securities = panel.permnos().len(),
        "Wrote membership panel"
    );
    Ok(summary)
}

/// Fetch one returns panel per month for the securities active that month.
///
/// Active means a member in the month or in one of the following
/// `lookback_months` panel rows. Months already on disk are skipped.
pub(crate) async fn run_returns<S: QuerySource>(
    source: &S,
    layout: &DataLayout,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let store = PanelStore::new(layout.returns_dir());
    let mut summary = RunSummary::new("returns", store.root().to_path_buf());
    let active = read_membership(&layout.membership_path())?.with_lookback(config.lookback_months);
    let months = YearMonth::range(config.start, config.end);

    let pb = progress_bar(months.len(), "Fetching monthly returns...");
    for month in months {
        pb.inc(1);
        if store.contains(month) {
            summary.skipped += 1;
            continue;
        }

        let permnos = active.members(month);
        if permnos.is_empty() {
            debug!(%month, "No active securities");
            summary.empty += 1;
            continue;
        }

        let panel = fetch_returns(source, month.first_day(), month.last_day(), &permnos).await?;
        match store.write(month, &panel)? {
            WriteOutcome::Written => {
                summary.written += 1;
                summary.records += panel.height() * panel.width();
            }
            WriteOutcome::Skipped => summary.skipped += 1,
        }
    }
    pb.finish_with_message("Done");

    info!(
        written = summary.written,
        skipped = summary.skipped,
        "Returns panels up to date"
    );
    Ok(summary)
}

/// Download the name history of every security ever in the membership panel.
pub(crate) async fn run_info<S: QuerySource>(
    source: &S,
    layout: &DataLayout,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new("info", layout.info_path());
    let permnos = read_membership(&layout.membership_path())?.permnos();

    let records = fetch_info(source, &permnos).await?;
    records.export_to_file(&summary.output, ExportFormat::Csv)?;

    summary.written = 1;
    summary.records = records.len();
    info!(securities = permnos.len(), rows = records.len(), "Wrote stock info");
    Ok(summary)
}

/// Download every factor family for the window and write the factor file.
pub(crate) async fn run_fama(
    client: &FrenchClient,
    layout: &DataLayout,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new("fama", layout.fama_path());

    let table = client.fetch_factors(config.start, config.end).await?;
    table.export_to_file(&summary.output, ExportFormat::Csv)?;

    summary.written = 1;
    summary.records = table.height();
    Ok(summary)
}

/// Estimate factor loadings for every stored month in the window.
///
/// Each month pools its own panel with up to `window - 1` earlier stored
/// months. Regressors are the factors in the factor file other than the
/// risk-free rate. Existing loadings files are replaced.
pub(crate) async fn run_loadings(
    layout: &DataLayout,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new("loadings", layout.root().join("loadings"));
    let table = read_factor_table(&layout.fama_path())?;
    let regressors: Vec<Factor> = Factor::REGRESSORS
        .into_iter()
        .filter(|f| table.factors().contains(f))
        .collect();

    let store = PanelStore::new(layout.returns_dir());
    let first = YearMonth::of(config.start);
    let last = YearMonth::of(config.end);
    let stored = store.months()?;
    let targets: Vec<YearMonth> = stored
        .iter()
        .copied()
        .filter(|m| *m >= first && *m <= last)
        .collect();

    let estimator = LoadingEstimator::new(config.loadings);
    let pb = progress_bar(targets.len(), "Estimating loadings...");
    for month in targets {
        let window = pooled_months(&stored, month, config.window);
        let panels = store.read_many(&window, None, config.concurrency).await?;
        let panel = ReturnsPanel::concat(&panels);

        let loadings = estimator.estimate_panel(&panel, &table, &regressors);
        let failed = loadings.len() - loadings.valid_count();
        if failed > 0 {
            pb.suspend(|| {
                eprintln!(
                    "Warning: {} of {} securities have no loadings for {}",
                    failed,
                    loadings.len(),
                    month
                );
            });
            summary.warnings += 1;
        }

        loadings.export_to_file(&layout.loadings_path(month), ExportFormat::Csv)?;
        summary.written += 1;
        summary.records += loadings.len();
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    Ok(summary)
}

/// Stored months in `(month - window, month]`, ascending.
fn pooled_months(stored: &[YearMonth], month: YearMonth, window: usize) -> Vec<YearMonth> {
    let mut earliest = month;
    for _ in 1..window.max(1) {
        earliest = earliest.prev();
    }
    stored
        .iter()
        .copied()
        .filter(|m| *m >= earliest && *m <= month)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use ndarray::Array2;
    use r3k_data::Permno;
    use r3k_data::french::FactorTable;
    use r3k_data::source::{DailyRecord, NameRecord, SqliteSource};
    use r3k_output::{read_loadings, read_panel, read_stock_info};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn row(permno: i64, date: NaiveDate, shrout: f64, ret: f64) -> DailyRecord {
        DailyRecord {
            permno: Permno(permno),
            date,
            shrout: Some(shrout),
            prc: Some(10.0),
            ret: Some(ret),
        }
    }

    /// Three securities trading on weekdays of Jan-Mar 2020; 10003 is the
    /// smallest and 10002 stops trading after January.
    fn mirror() -> SqliteSource {
        let source = SqliteSource::in_memory().unwrap();
        let mut rows = Vec::new();
        let mut day = date(2020, 1, 1);
        let mut i = 0.0;
        while day <= date(2020, 3, 31) {
            if day.weekday().number_from_monday() <= 5 {
                i += 1.0;
                rows.push(row(10001, day, 3000.0, 0.001 * (i % 7.0)));
                rows.push(row(10003, day, 100.0, -0.002 * (i % 5.0)));
                if day.month0() == 0 {
                    rows.push(row(10002, day, 2000.0, 0.003));
                }
            }
            day = day.succ_opt().unwrap();
        }
        source.put_daily(&rows).unwrap();
        source
            .put_names(&[NameRecord {
                permno: Permno(10001),
                namedt: Some(date(1990, 1, 1)),
                nameendt: None,
                ticker: Some("AAA".to_string()),
                comnam: Some("ALPHA CORP".to_string()),
                shrcd: Some(11),
                exchcd: Some(1),
            }])
            .unwrap();
        source
    }

    fn config(top_n: usize) -> PipelineConfig {
        PipelineConfig {
            start: date(2020, 1, 1),
            end: date(2020, 3, 31),
            snapshot: SnapshotConfig {
                top_n,
                ..SnapshotConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn layout(dir: &tempfile::TempDir) -> DataLayout {
        DataLayout::new(dir.path().join("data"), dir.path().join("scratch"))
    }

    #[tokio::test]
    async fn test_constituents_marks_top_n_per_month() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let summary = run_constituents(&mirror(), &layout, &config(2)).await.unwrap();
        assert_eq!(summary.warnings, 0);

        let panel = read_membership(&layout.membership_path()).unwrap();
        assert_eq!(panel.months(), vec![ym(2020, 1), ym(2020, 2), ym(2020, 3)]);
        assert_eq!(panel.members(ym(2020, 1)), vec![Permno(10001), Permno(10002)]);
        // 2020-02-29 is a Saturday; the snapshot falls back to Friday.
        assert_eq!(panel.members(ym(2020, 2)), vec![Permno(10001), Permno(10003)]);
    }

    #[tokio::test]
    async fn test_constituents_skips_partial_last_month() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let mut cfg = config(2);
        cfg.end = date(2020, 3, 15);

        let summary = run_constituents(&mirror(), &layout, &cfg).await.unwrap();
        assert_eq!(summary.warnings, 0);

        let panel = read_membership(&layout.membership_path()).unwrap();
        assert_eq!(panel.months(), vec![ym(2020, 1), ym(2020, 2)]);
    }

    #[tokio::test]
    async fn test_constituents_warns_on_missing_month() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let mut cfg = config(2);
        cfg.end = date(2020, 4, 30);

        let summary = run_constituents(&mirror(), &layout, &cfg).await.unwrap();
        assert_eq!(summary.warnings, 1);

        let panel = read_membership(&layout.membership_path()).unwrap();
        assert_eq!(panel.len(), 4);
        assert!(panel.members(ym(2020, 4)).is_empty());
    }

    #[tokio::test]
    async fn test_returns_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let source = mirror();
        let cfg = config(2);
        run_constituents(&source, &layout, &cfg).await.unwrap();

        let first = run_returns(&source, &layout, &cfg).await.unwrap();
        assert_eq!(first.written, 3);
        assert_eq!(first.skipped, 0);

        // January includes February's members through the lookback.
        let january = read_panel(&layout.returns_dir().join("2020-01.parquet"), None).unwrap();
        assert_eq!(
            january.permnos(),
            &[Permno(10001), Permno(10002), Permno(10003)]
        );

        let second = run_returns(&source, &layout, &cfg).await.unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.skipped, 3);
    }

    #[tokio::test]
    async fn test_info_run_writes_known_names() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let source = mirror();
        run_constituents(&source, &layout, &config(3)).await.unwrap();

        let summary = run_info(&source, &layout).await.unwrap();
        assert_eq!(summary.records, 1);
        let info = read_stock_info(&layout.info_path()).unwrap();
        assert_eq!(info[0].ticker.as_deref(), Some("AAA"));
    }

    #[tokio::test]
    async fn test_loadings_run_pools_window() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let source = mirror();
        let mut cfg = config(3);
        run_constituents(&source, &layout, &cfg).await.unwrap();
        run_returns(&source, &layout, &cfg).await.unwrap();

        let days: Vec<NaiveDate> = cfg.start.iter_days().take_while(|d| *d <= cfg.end).collect();
        let values = Array2::from_shape_fn((days.len(), 2), |(i, j)| {
            if j == 0 {
                0.001 * ((i * 7 % 11) as f64 - 5.0)
            } else {
                0.0001
            }
        });
        FactorTable::new(days, vec![Factor::MktRf, Factor::Rf], values)
            .unwrap()
            .export_to_file(&layout.fama_path(), ExportFormat::Csv)
            .unwrap();

        cfg.window = 2;
        let summary = run_loadings(&layout, &cfg).await.unwrap();
        assert_eq!(summary.written, 3);

        // February pools January, where 10002 last traded.
        let february = read_loadings(&layout.loadings_path(ym(2020, 2))).unwrap();
        assert_eq!(february.factors(), &[Factor::MktRf]);
        assert_eq!(february.len(), 3);
        let alpha = february.get(Permno(10001)).unwrap();
        let beta = february.get(Permno(10002)).unwrap();
        assert!(alpha.is_valid());
        assert!(beta.is_valid());
        assert!(beta.observations < alpha.observations);

        let march = read_loadings(&layout.loadings_path(ym(2020, 3))).unwrap();
        assert!(march.get(Permno(10002)).is_none());
    }

    #[test]
    fn test_pooled_months() {
        let stored = [ym(2020, 1), ym(2020, 2), ym(2020, 4)];
        assert_eq!(pooled_months(&stored, ym(2020, 4), 3), vec![ym(2020, 2), ym(2020, 4)]);
        assert_eq!(pooled_months(&stored, ym(2020, 2), 1), vec![ym(2020, 2)]);
        assert_eq!(pooled_months(&stored, ym(2020, 2), 0), vec![ym(2020, 2)]);
    }
}
