//! Security identifiers and calendar keys.

use crate::error::{DataError, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CRSP permanent security number.
///
/// Stable across ticker and name changes; never reused.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Permno(pub i64);

impl Permno {
    /// Raw integer value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for Permno {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| DataError::Parse(format!("Invalid permno label: {:?}", s)))
    }
}

/// A calendar month, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth(NaiveDate);

impl YearMonth {
    /// Create a month from year and month number (1-12).
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(|| DataError::Parse(format!("Invalid month: {}-{}", year, month)))
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self(date.with_day0(0).unwrap_or(date))
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month number (1-12).
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// First calendar day of the month.
    pub const fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// Last calendar day of the month.
    pub fn last_day(&self) -> NaiveDate {
        self.next().0 - Days::new(1)
    }

    /// The following month.
    pub fn next(&self) -> Self {
        Self(self.0 + Months::new(1))
    }

    /// The preceding month.
    pub fn prev(&self) -> Self {
        Self(self.0 - Months::new(1))
    }

    /// Every month touched by `[start, end]`, in order.
    pub fn range(start: NaiveDate, end: NaiveDate) -> Vec<Self> {
        let last = Self::of(end);
        let mut months = Vec::new();
        let mut current = Self::of(start);
        while start <= end && current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// Month-end dates falling inside `[start, end]`.
    pub fn month_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        Self::range(start, end)
            .into_iter()
            .map(|m| m.last_day())
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| DataError::Parse(format!("Invalid month label: {:?}", s)))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| DataError::Parse(format!("Invalid month label: {:?}", s)))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| DataError::Parse(format!("Invalid month label: {:?}", s)))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}
