//! Monthly parquet store for daily returns panels.
//!
//! Layout: `<root>/YYYY-MM.parquet`, one [`ReturnsPanel`] per month. Files
//! are written once; an existing file is never overwritten, so re-running a
//! month is a no-op and invalidation is the caller's job (delete the file).

use futures::stream::{self, StreamExt, TryStreamExt};
use polars::prelude::*;
use r3k_data::{DataError, Permno, ReturnsPanel, YearMonth};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// File extension of stored panels.
const EXTENSION: &str = "parquet";

/// Panel store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet encode/decode error
    #[error("Parquet error: {0}")]
    Polars(#[from] PolarsError),

    /// Stored panel could not be rebuilt
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// A blocking read task panicked or was cancelled
    #[error("Read task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Path has no parent directory
    #[error("Invalid panel path: {0}")]
    InvalidPath(PathBuf),
}

/// What [`write_panel`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new file was created
    Written,
    /// The file already existed and was left untouched
    Skipped,
}

/// Write `panel` to `path` unless a file is already there.
///
/// The parquet file is written to a temporary file in the same directory and
/// renamed into place, so a crash never leaves a partial file at `path`.
pub fn write_panel(panel: &ReturnsPanel, path: &Path) -> Result<WriteOutcome, StoreError> {
    if path.exists() {
        debug!(path = %path.display(), "Panel exists, skipping write");
        return Ok(WriteOutcome::Skipped);
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| StoreError::InvalidPath(path.to_path_buf()))?;
    fs::create_dir_all(dir)?;

    let mut df = panel.to_dataframe()?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    ParquetWriter::new(tmp.as_file_mut()).finish(&mut df)?;

    let outcome = persist_new(tmp, path)?;
    if outcome == WriteOutcome::Written {
        debug!(
            path = %path.display(),
            dates = panel.height(),
            permnos = panel.width(),
            "Wrote panel"
        );
    }
    Ok(outcome)
}

/// Move `tmp` to `path` unless another writer got there first.
///
/// The temporary file is removed either way.
fn persist_new(tmp: NamedTempFile, path: &Path) -> Result<WriteOutcome, StoreError> {
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(WriteOutcome::Written),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "Panel appeared during write, keeping existing file");
            Ok(WriteOutcome::Skipped)
        }
        Err(e) => Err(StoreError::Io(e.error)),
    }
}

/// Read the panel at `path`, optionally projected onto `permnos`.
///
/// With a projection, stored columns that were requested come first in file
/// order, then requested permnos absent from the file as all-`NaN` columns in
/// the caller's order.
pub fn read_panel(path: &Path, permnos: Option<&[Permno]>) -> Result<ReturnsPanel, StoreError> {
    let file = File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    let panel = ReturnsPanel::from_dataframe(&df)?;

    let Some(requested) = permnos else {
        return Ok(panel);
    };

    let wanted: HashSet<Permno> = requested.iter().copied().collect();
    let stored: HashSet<Permno> = panel.permnos().iter().copied().collect();
    let order: Vec<Permno> = panel
        .permnos()
        .iter()
        .copied()
        .filter(|p| wanted.contains(p))
        .chain(requested.iter().copied().filter(|p| !stored.contains(p)))
        .collect();

    Ok(panel.select(&order))
}

/// Read many panels concurrently.
///
/// At most `concurrency` blocking reads run at once. Results come back in the
/// order of `paths`, not completion order; the first failure aborts the batch.
pub async fn read_many(
    paths: &[PathBuf],
    permnos: Option<&[Permno]>,
    concurrency: usize,
) -> Result<Vec<ReturnsPanel>, StoreError> {
    let permnos: Option<Arc<[Permno]>> = permnos.map(Arc::from);

    let reads = paths.iter().cloned().map(|path| {
        let permnos = permnos.clone();
        async move {
            tokio::task::spawn_blocking(move || read_panel(&path, permnos.as_deref())).await?
        }
    });

    stream::iter(reads)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Directory of monthly panel files.
#[derive(Debug, Clone)]
pub struct PanelStore {
    root: PathBuf,
}

impl PanelStore {
    /// Create a store rooted at `root` (created lazily on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for `month`.
    pub fn path_for(&self, month: YearMonth) -> PathBuf {
        self.root.join(format!("{}.{}", month, EXTENSION))
    }

    /// True when `month` has been written.
    pub fn contains(&self, month: YearMonth) -> bool {
        self.path_for(month).exists()
    }

    /// Write `month` unless it already exists.
    pub fn write(&self, month: YearMonth, panel: &ReturnsPanel) -> Result<WriteOutcome, StoreError> {
        write_panel(panel, &self.path_for(month))
    }

    /// Read `month`, optionally projected onto `permnos`.
    pub fn read(&self, month: YearMonth, permnos: Option<&[Permno]>) -> Result<ReturnsPanel, StoreError> {
        read_panel(&self.path_for(month), permnos)
    }

    /// Read several months concurrently, in the order given.
    pub async fn read_many(
        &self,
        months: &[YearMonth],
        permnos: Option<&[Permno]>,
        concurrency: usize,
    ) -> Result<Vec<ReturnsPanel>, StoreError> {
        let paths: Vec<PathBuf> = months.iter().map(|m| self.path_for(*m)).collect();
        read_many(&paths, permnos, concurrency).await
    }

    /// Months present on disk, ascending. A missing directory is empty.
    pub fn months(&self) -> Result<Vec<YearMonth>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut months = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }
            if let Some(month) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<YearMonth>().ok())
            {
                months.push(month);
            }
        }
        months.sort();
        Ok(months)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn sample() -> ReturnsPanel {
        ReturnsPanel::from_long(
            vec![
                (Permno(10001), date(2), 0.01),
                (Permno(10001), date(3), -0.02),
                (Permno(10002), date(3), 0.005),
            ],
            &[],
        )
    }

    #[test]
    fn test_path_layout() {
        let store = PanelStore::new("/data/returns/raw");
        assert_eq!(
            store.path_for(YearMonth::new(2020, 1).unwrap()),
            PathBuf::from("/data/returns/raw/2020-01.parquet")
        );
    }

    #[test]
    fn test_projection_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2020-01.parquet");
        write_panel(&sample(), &path).unwrap();

        let requested = [Permno(99), Permno(10002), Permno(10001)];
        let panel = read_panel(&path, Some(&requested)).unwrap();
        assert_eq!(
            panel.permnos(),
            &[Permno(10001), Permno(10002), Permno(99)]
        );
        assert!(panel.column(Permno(99)).unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_months_lists_only_panels() {
        let dir = tempfile::tempdir().unwrap();
        let store = PanelStore::new(dir.path().join("raw"));
        assert!(store.months().unwrap().is_empty());

        store.write(YearMonth::new(2020, 2).unwrap(), &sample()).unwrap();
        store.write(YearMonth::new(2020, 1).unwrap(), &sample()).unwrap();
        fs::write(store.root().join("notes.txt"), "x").unwrap();

        assert_eq!(
            store.months().unwrap(),
            vec![YearMonth::new(2020, 1).unwrap(), YearMonth::new(2020, 2).unwrap()]
        );
    }

    #[test]
    fn test_persist_keeps_concurrent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2020-01.parquet");

        let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
        std::io::Write::write_all(tmp.as_file_mut(), b"late").unwrap();
        fs::write(&path, b"first").unwrap();

        assert_eq!(persist_new(tmp, &path).unwrap(), WriteOutcome::Skipped);
        assert_eq!(fs::read(&path).unwrap(), b"first");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_panel(&dir.path().join("2020-01.parquet"), None);
        assert!(matches!(result, Err(StoreError::Io(_))));
    }
}
