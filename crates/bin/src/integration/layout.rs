//! On-disk layout of the r3k data directory.
//!
//! ```text
//! <root>/russell3000.csv.gz        membership panel
//! <root>/permno_info.csv.gz        stock name history
//! <root>/returns/raw/YYYY-MM.parquet
//! <root>/fama/fama.csv.gz          factor returns
//! <root>/loadings/YYYY-MM.csv      factor loadings
//! ```

use r3k_data::YearMonth;
use std::path::{Path, PathBuf};

/// Get the default data directory.
///
/// `./data` when it exists, otherwise a platform-specific location:
/// - Linux: `~/.local/share/r3k/`
/// - macOS: `~/Library/Application Support/r3k/`
/// - Windows: `%LOCALAPPDATA%\r3k\`
pub(crate) fn default_data_dir() -> PathBuf {
    let local = PathBuf::from("data");
    if local.is_dir() {
        return local;
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("r3k")
}

/// Get the default scratch directory for downloads.
pub(crate) fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("r3k")
}

/// Paths of every file the pipeline reads or writes.
#[derive(Debug, Clone)]
pub(crate) struct DataLayout {
    root: PathBuf,
    scratch: PathBuf,
}

impl DataLayout {
    /// Layout rooted at `root`, downloads spilled to `scratch`.
    pub(crate) fn new(root: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch: scratch.into(),
        }
    }

    /// Layout at the default locations.
    pub(crate) fn from_defaults(root: Option<PathBuf>) -> Self {
        Self::new(root.unwrap_or_else(default_data_dir), default_scratch_dir())
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn membership_path(&self) -> PathBuf {
        self.root.join("russell3000.csv.gz")
    }

    pub(crate) fn info_path(&self) -> PathBuf {
        self.root.join("permno_info.csv.gz")
    }

    pub(crate) fn returns_dir(&self) -> PathBuf {
        self.root.join("returns").join("raw")
    }

    pub(crate) fn fama_path(&self) -> PathBuf {
        self.root.join("fama").join("fama.csv.gz")
    }

    pub(crate) fn loadings_path(&self, month: YearMonth) -> PathBuf {
        self.root.join("loadings").join(format!("{}.csv", month))
    }

    /// Scratch directory, created if needed.
    pub(crate) fn scratch_dir(&self) -> std::io::Result<&Path> {
        std::fs::create_dir_all(&self.scratch)?;
        Ok(&self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("/d", "/tmp/r3k");
        assert_eq!(layout.membership_path(), PathBuf::from("/d/russell3000.csv.gz"));
        assert_eq!(layout.returns_dir(), PathBuf::from("/d/returns/raw"));
        assert_eq!(layout.fama_path(), PathBuf::from("/d/fama/fama.csv.gz"));
        assert_eq!(
            layout.loadings_path(YearMonth::new(2021, 3).unwrap()),
            PathBuf::from("/d/loadings/2021-03.csv")
        );
    }
}
