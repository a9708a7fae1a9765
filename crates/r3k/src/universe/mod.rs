//! Universe management for r3k.
//!
//! This module builds the monthly membership panel: which securities were
//! among the largest `n` by market capitalisation at each month-end.

pub mod membership;
pub mod snapshot;

pub use membership::MembershipPanel;
pub use snapshot::{MembershipSnapshotter, Snapshot, SnapshotConfig, select_top};

use r3k_data::{Permno, YearMonth};

/// Trait for point-in-time stock universes.
pub trait Universe {
    /// Members for `month`, in ascending permno order.
    fn members(&self, month: YearMonth) -> Vec<Permno>;

    /// Check if a security is in the universe for `month`.
    fn contains(&self, month: YearMonth, permno: Permno) -> bool {
        self.members(month).contains(&permno)
    }

    /// Get the number of constituents for `month`.
    fn size(&self, month: YearMonth) -> usize {
        self.members(month).len()
    }
}

impl Universe for MembershipPanel {
    fn members(&self, month: YearMonth) -> Vec<Permno> {
        self.members(month)
    }

    fn contains(&self, month: YearMonth, permno: Permno) -> bool {
        self.is_member(month, permno)
    }
}
