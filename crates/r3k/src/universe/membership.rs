//! Month-by-security membership matrix.

use r3k_data::{Permno, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Boolean membership panel indexed by (`YearMonth`, `Permno`).
///
/// Only marked securities exist on the entity axis, so a security that was
/// never a member has no column. A month row can exist with no members (for
/// example when rows are pre-seeded for a window); unmarked cells read as
/// not-a-member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPanel {
    rows: BTreeMap<YearMonth, BTreeSet<Permno>>,
}

impl MembershipPanel {
    /// Create an empty panel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a panel with an empty row for every month.
    pub fn with_months<I>(months: I) -> Self
    where
        I: IntoIterator<Item = YearMonth>,
    {
        Self {
            rows: months.into_iter().map(|m| (m, BTreeSet::new())).collect(),
        }
    }

    /// Mark `permnos` as members of `month`, creating the row if needed.
    pub fn mark<I>(&mut self, month: YearMonth, permnos: I)
    where
        I: IntoIterator<Item = Permno>,
    {
        self.rows.entry(month).or_default().extend(permnos);
    }

    /// Month rows, ascending.
    pub fn months(&self) -> Vec<YearMonth> {
        self.rows.keys().copied().collect()
    }

    /// Every security ever marked, ascending.
    pub fn permnos(&self) -> Vec<Permno> {
        self.rows
            .values()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Members of `month`, ascending. Empty for unknown months.
    pub fn members(&self, month: YearMonth) -> Vec<Permno> {
        self.rows
            .get(&month)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Cell value.
    pub fn is_member(&self, month: YearMonth, permno: Permno) -> bool {
        self.rows
            .get(&month)
            .is_some_and(|set| set.contains(&permno))
    }

    /// Number of month rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no month rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Extend every membership backwards by `months` rows.
    ///
    /// A security that is a member in some row is also treated as active in
    /// the `months` rows before it, so a model estimated over a month has the
    /// prior month's data available. Rows are panel rows, not calendar months.
    #[must_use]
    pub fn with_lookback(&self, months: usize) -> Self {
        let keys = self.months();
        let mut extended = self.clone();
        for (i, month) in keys.iter().enumerate() {
            let Some(members) = self.rows.get(month) else {
                continue;
            };
            for earlier in keys[i.saturating_sub(months)..i].iter() {
                extended.mark(*earlier, members.iter().copied());
            }
        }
        extended
    }
}
