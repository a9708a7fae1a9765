//! Fama-French factor returns from the Ken French data library.
//!
//! Four daily families are used: the 2x3 five-factor file, momentum,
//! short-term reversal and long-term reversal. Each is published as a zipped
//! CSV with a text preamble, a header row and a footer; [`parse`] handles the
//! layout and [`client`] the download.

pub mod client;
pub mod parse;

pub use client::{FRENCH_BASE_URL, FrenchClient, load_archive};
pub use parse::parse_factor_csv;

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// A single factor return series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Market excess return
    MktRf,
    /// Small minus big
    Smb,
    /// High minus low (value)
    Hml,
    /// Robust minus weak (profitability)
    Rmw,
    /// Conservative minus aggressive (investment)
    Cma,
    /// Risk-free rate
    Rf,
    /// Momentum
    Mom,
    /// Short-term reversal
    StRev,
    /// Long-term reversal
    LtRev,
}

impl Factor {
    /// Every factor, in storage order.
    pub const ALL: [Self; 9] = [
        Self::MktRf,
        Self::Smb,
        Self::Hml,
        Self::Rmw,
        Self::Cma,
        Self::Rf,
        Self::Mom,
        Self::StRev,
        Self::LtRev,
    ];

    /// Factors used as regressors. The risk-free rate is stored but not regressed on.
    pub const REGRESSORS: [Self; 8] = [
        Self::MktRf,
        Self::Smb,
        Self::Hml,
        Self::Rmw,
        Self::Cma,
        Self::Mom,
        Self::StRev,
        Self::LtRev,
    ];

    /// Column name used in r3k files.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MktRf => "mkt_rf",
            Self::Smb => "smb",
            Self::Hml => "hml",
            Self::Rmw => "rmw",
            Self::Cma => "cma",
            Self::Rf => "rf",
            Self::Mom => "mom",
            Self::StRev => "st_rev",
            Self::LtRev => "lt_rev",
        }
    }

    /// Column label in the published CSV.
    pub const fn source_label(&self) -> &'static str {
        match self {
            Self::MktRf => "Mkt-RF",
            Self::Smb => "SMB",
            Self::Hml => "HML",
            Self::Rmw => "RMW",
            Self::Cma => "CMA",
            Self::Rf => "RF",
            Self::Mom => "Mom",
            Self::StRev => "ST_Rev",
            Self::LtRev => "LT_Rev",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Factor {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s || f.source_label() == s)
            .ok_or_else(|| DataError::Parse(format!("Unknown factor: {}", s)))
    }
}

/// One downloadable factor file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorFamily {
    /// Five factors (2x3), daily
    FiveFactor,
    /// Momentum, daily
    Momentum,
    /// Short-term reversal, daily
    ShortTermReversal,
    /// Long-term reversal, daily
    LongTermReversal,
}

impl FactorFamily {
    /// Every family, in join order.
    pub const ALL: [Self; 4] = [
        Self::FiveFactor,
        Self::Momentum,
        Self::ShortTermReversal,
        Self::LongTermReversal,
    ];

    /// Archive file name relative to the library base URL.
    pub const fn archive(&self) -> &'static str {
        match self {
            Self::FiveFactor => "F-F_Research_Data_5_Factors_2x3_daily_CSV.zip",
            Self::Momentum => "F-F_Momentum_Factor_daily_CSV.zip",
            Self::ShortTermReversal => "F-F_ST_Reversal_Factor_daily_CSV.zip",
            Self::LongTermReversal => "F-F_LT_Reversal_Factor_daily_CSV.zip",
        }
    }

    /// Preamble lines before the column header row.
    pub const fn skip_lines(&self) -> usize {
        match self {
            Self::FiveFactor => 3,
            Self::Momentum | Self::ShortTermReversal | Self::LongTermReversal => 13,
        }
    }

    /// Factors published in this file, in column order.
    pub const fn factors(&self) -> &'static [Factor] {
        match self {
            Self::FiveFactor => &[
                Factor::MktRf,
                Factor::Smb,
                Factor::Hml,
                Factor::Rmw,
                Factor::Cma,
                Factor::Rf,
            ],
            Self::Momentum => &[Factor::Mom],
            Self::ShortTermReversal => &[Factor::StRev],
            Self::LongTermReversal => &[Factor::LtRev],
        }
    }
}

/// Daily factor returns, dates by factors, in decimal units.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorTable {
    dates: Vec<NaiveDate>,
    factors: Vec<Factor>,
    values: Array2<f64>,
}

impl FactorTable {
    /// Create a table, checking that `values` is `dates.len() x factors.len()`.
    pub fn new(dates: Vec<NaiveDate>, factors: Vec<Factor>, values: Array2<f64>) -> Result<Self> {
        if values.dim() != (dates.len(), factors.len()) {
            return Err(DataError::DimensionMismatch {
                expected: dates.len() * factors.len(),
                actual: values.len(),
                context: "factor table".to_string(),
            });
        }
        Ok(Self {
            dates,
            factors,
            values,
        })
    }

    /// A table with no rows and no columns.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            factors: Vec::new(),
            values: Array2::zeros((0, 0)),
        }
    }

    /// Dates (row index).
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Factors (column index).
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Raw values.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Number of dates.
    pub fn height(&self) -> usize {
        self.dates.len()
    }

    /// One factor's series, if present.
    pub fn column(&self, factor: Factor) -> Option<ArrayView1<'_, f64>> {
        self.factors
            .iter()
            .position(|f| *f == factor)
            .map(|j| self.values.column(j))
    }

    /// Keep rows with `start <= date <= end`.
    pub fn filter(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let rows: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect();

        Self {
            dates: rows.iter().map(|&i| self.dates[i]).collect(),
            factors: self.factors.clone(),
            values: self.values.select(ndarray::Axis(0), &rows),
        }
    }

    /// Outer join on date. Factors already present keep `self`'s values.
    pub fn outer_join(&self, other: &Self) -> Self {
        let dates: Vec<NaiveDate> = self
            .dates
            .iter()
            .chain(other.dates.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut factors = self.factors.clone();
        for factor in &other.factors {
            if !factors.contains(factor) {
                factors.push(*factor);
            }
        }

        let row_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let mut values = Array2::from_elem((dates.len(), factors.len()), f64::NAN);

        for (j, factor) in factors.iter().enumerate() {
            let source = if self.factors.contains(factor) { self } else { other };
            if let Some(series) = source.column(*factor) {
                for (date, value) in source.dates.iter().zip(series.iter()) {
                    values[[row_index[date], j]] = *value;
                }
            }
        }

        Self {
            dates,
            factors,
            values,
        }
    }

    /// Factor matrix for `dates` and `factors`, `NaN` where either is absent.
    pub fn align(&self, dates: &[NaiveDate], factors: &[Factor]) -> Array2<f64> {
        let row_index: HashMap<NaiveDate, usize> =
            self.dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut out = Array2::from_elem((dates.len(), factors.len()), f64::NAN);
        for (j, factor) in factors.iter().enumerate() {
            let Some(series) = self.column(*factor) else {
                continue;
            };
            for (i, date) in dates.iter().enumerate() {
                if let Some(&row) = row_index.get(date) {
                    out[[i, j]] = series[row];
                }
            }
        }
        out
    }
}
