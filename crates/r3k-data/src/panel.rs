//! Wide daily returns panel.
//!
//! A [`ReturnsPanel`] holds one row per trading date and one column per
//! [`Permno`]. Missing observations are `NaN`. Column order is significant and
//! is preserved through every transformation below.

use crate::error::{DataError, Result};
use crate::ids::Permno;
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, ArrayView2};
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Name of the date index column in stored panels.
pub const DATE_COLUMN: &str = "date";

/// Date format used for the stored index.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Daily returns, dates by permnos.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsPanel {
    dates: Vec<NaiveDate>,
    permnos: Vec<Permno>,
    values: Array2<f64>,
}

impl ReturnsPanel {
    /// Create a panel, checking that `values` is `dates.len() x permnos.len()`.
    pub fn new(dates: Vec<NaiveDate>, permnos: Vec<Permno>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != dates.len() {
            return Err(DataError::DimensionMismatch {
                expected: dates.len(),
                actual: values.nrows(),
                context: "panel rows".to_string(),
            });
        }
        if values.ncols() != permnos.len() {
            return Err(DataError::DimensionMismatch {
                expected: permnos.len(),
                actual: values.ncols(),
                context: "panel columns".to_string(),
            });
        }
        Ok(Self {
            dates,
            permnos,
            values,
        })
    }

    /// A panel with no dates and no columns.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            permnos: Vec::new(),
            values: Array2::zeros((0, 0)),
        }
    }

    /// Pivot long `(permno, date, return)` rows into a wide panel.
    ///
    /// Columns appear in the order permnos are first seen in `rows`, followed
    /// by any `requested` permno that never appeared, in the caller's order,
    /// as an all-`NaN` column. Dates are the sorted union of row dates.
    pub fn from_long<I>(rows: I, requested: &[Permno]) -> Self
    where
        I: IntoIterator<Item = (Permno, NaiveDate, f64)>,
    {
        let rows: Vec<_> = rows.into_iter().collect();

        let mut permnos = Vec::new();
        let mut seen = HashSet::new();
        for (permno, _, _) in &rows {
            if seen.insert(*permno) {
                permnos.push(*permno);
            }
        }
        for permno in requested {
            if seen.insert(*permno) {
                permnos.push(*permno);
            }
        }

        let dates: Vec<NaiveDate> = rows
            .iter()
            .map(|(_, date, _)| *date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let row_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let col_index: HashMap<Permno, usize> =
            permnos.iter().enumerate().map(|(j, p)| (*p, j)).collect();

        let mut values = Array2::from_elem((dates.len(), permnos.len()), f64::NAN);
        for (permno, date, ret) in rows {
            values[[row_index[&date], col_index[&permno]]] = ret;
        }

        Self {
            dates,
            permnos,
            values,
        }
    }

    /// Trading dates (row index).
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Permnos (column index).
    pub fn permnos(&self) -> &[Permno] {
        &self.permnos
    }

    /// Raw values, dates by permnos.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Number of dates.
    pub fn height(&self) -> usize {
        self.dates.len()
    }

    /// Number of permno columns.
    pub fn width(&self) -> usize {
        self.permnos.len()
    }

    /// Returns for a single permno.
    pub fn column(&self, permno: Permno) -> Option<ArrayView1<'_, f64>> {
        self.permnos
            .iter()
            .position(|p| *p == permno)
            .map(|j| self.values.column(j))
    }

    /// Project onto `permnos` in the given order, filling unknown ids with `NaN`.
    pub fn select(&self, permnos: &[Permno]) -> Self {
        let index: HashMap<Permno, usize> = self
            .permnos
            .iter()
            .enumerate()
            .map(|(j, p)| (*p, j))
            .collect();

        let mut unique = Vec::with_capacity(permnos.len());
        let mut seen = HashSet::new();
        for permno in permnos {
            if seen.insert(*permno) {
                unique.push(*permno);
            }
        }

        let mut values = Array2::from_elem((self.dates.len(), unique.len()), f64::NAN);
        for (j, permno) in unique.iter().enumerate() {
            if let Some(&src) = index.get(permno) {
                values.column_mut(j).assign(&self.values.column(src));
            }
        }

        Self {
            dates: self.dates.clone(),
            permnos: unique,
            values,
        }
    }

    /// Concatenate panels along the date axis.
    ///
    /// Dates are the sorted union; columns appear in first-seen order across
    /// `panels`. When two panels share a date and permno, the later non-`NaN`
    /// value wins; a `NaN` never overwrites an observed return.
    pub fn concat(panels: &[Self]) -> Self {
        let mut permnos = Vec::new();
        let mut seen = HashSet::new();
        let mut dates = BTreeSet::new();
        for panel in panels {
            dates.extend(panel.dates.iter().copied());
            for permno in &panel.permnos {
                if seen.insert(*permno) {
                    permnos.push(*permno);
                }
            }
        }
        let dates: Vec<NaiveDate> = dates.into_iter().collect();

        let row_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let col_index: HashMap<Permno, usize> =
            permnos.iter().enumerate().map(|(j, p)| (*p, j)).collect();

        let mut values = Array2::from_elem((dates.len(), permnos.len()), f64::NAN);
        for panel in panels {
            for (i, date) in panel.dates.iter().enumerate() {
                let row = row_index[date];
                for (j, permno) in panel.permnos.iter().enumerate() {
                    let value = panel.values[[i, j]];
                    if !value.is_nan() {
                        values[[row, col_index[permno]]] = value;
                    }
                }
            }
        }

        Self {
            dates,
            permnos,
            values,
        }
    }

    /// Convert to a DataFrame with string labels.
    ///
    /// The date index becomes a `date` column of `YYYY-MM-DD` strings and each
    /// permno becomes a `Float64` column named by its decimal string, so that
    /// labels survive typed columnar formats.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.permnos.len() + 1);
        let dates: Vec<String> = self
            .dates
            .iter()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .collect();
        columns.push(Series::new(DATE_COLUMN.into(), dates).into());

        for (j, permno) in self.permnos.iter().enumerate() {
            let values: Vec<f64> = self.values.column(j).to_vec();
            columns.push(Series::new(permno.to_string().into(), values).into());
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Rebuild a panel from [`ReturnsPanel::to_dataframe`] output.
    ///
    /// Column labels are parsed back into [`Permno`]s; nulls become `NaN`.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let date_column = df
            .column(DATE_COLUMN)
            .map_err(|_| DataError::MissingColumn(DATE_COLUMN.to_string()))?
            .cast(&DataType::String)?;

        let dates = date_column
            .str()?
            .into_iter()
            .map(|value| {
                let value =
                    value.ok_or_else(|| DataError::Parse("Null date in panel".to_string()))?;
                NaiveDate::parse_from_str(value, DATE_FORMAT)
                    .map_err(|e| DataError::Parse(format!("Invalid panel date {}: {}", value, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let value_columns: Vec<&Column> = df
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != DATE_COLUMN)
            .collect();

        let mut permnos = Vec::with_capacity(value_columns.len());
        let mut values = Array2::from_elem((dates.len(), value_columns.len()), f64::NAN);
        for (j, column) in value_columns.into_iter().enumerate() {
            permnos.push(column.name().as_str().parse::<Permno>()?);
            let column = column.cast(&DataType::Float64)?;
            for (i, value) in column.f64()?.into_iter().enumerate() {
                values[[i, j]] = value.unwrap_or(f64::NAN);
            }
        }

        Self::new(dates, permnos, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> ReturnsPanel {
        ReturnsPanel::from_long(
            vec![
                (Permno(10001), date(2020, 1, 2), 0.01),
                (Permno(10001), date(2020, 1, 3), -0.02),
                (Permno(10002), date(2020, 1, 3), 0.005),
            ],
            &[],
        )
    }

    #[test]
    fn test_from_long_pivots() {
        let panel = sample();
        assert_eq!(panel.dates(), &[date(2020, 1, 2), date(2020, 1, 3)]);
        assert_eq!(panel.permnos(), &[Permno(10001), Permno(10002)]);
        assert_eq!(panel.values()[[0, 0]], 0.01);
        assert_eq!(panel.values()[[1, 1]], 0.005);
        assert!(panel.values()[[0, 1]].is_nan());
    }

    #[test]
    fn test_from_long_appends_missing_requested() {
        let panel = ReturnsPanel::from_long(
            vec![(Permno(10002), date(2020, 1, 2), 0.01)],
            &[Permno(10003), Permno(10002), Permno(10001), Permno(10003)],
        );
        assert_eq!(
            panel.permnos(),
            &[Permno(10002), Permno(10003), Permno(10001)]
        );
        assert!(
            panel
                .column(Permno(10003))
                .unwrap()
                .iter()
                .all(|v| v.is_nan())
        );
    }

    #[test]
    fn test_select_fills_unknown() {
        let panel = sample().select(&[Permno(10002), Permno(99999)]);
        assert_eq!(panel.permnos(), &[Permno(10002), Permno(99999)]);
        assert_eq!(panel.values()[[1, 0]], 0.005);
        assert!(panel.column(Permno(99999)).unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_concat_unions_dates_and_columns() {
        let jan = sample();
        let feb = ReturnsPanel::from_long(
            vec![
                (Permno(10003), date(2020, 2, 3), 0.03),
                (Permno(10001), date(2020, 2, 3), 0.04),
            ],
            &[],
        );
        let joined = ReturnsPanel::concat(&[jan, feb]);
        assert_eq!(joined.height(), 3);
        assert_eq!(
            joined.permnos(),
            &[Permno(10001), Permno(10002), Permno(10003)]
        );
        assert_eq!(joined.column(Permno(10001)).unwrap()[2], 0.04);
        assert!(joined.column(Permno(10003)).unwrap()[0].is_nan());
    }

    #[test]
    fn test_concat_overlap_keeps_observed_values() {
        let later = ReturnsPanel::from_long(
            vec![(Permno(10002), date(2020, 1, 3), 0.9)],
            &[Permno(10002), Permno(10001)],
        );
        assert!(later.column(Permno(10001)).unwrap()[0].is_nan());

        let joined = ReturnsPanel::concat(&[sample(), later]);
        assert_eq!(joined.height(), 2);
        assert_eq!(joined.column(Permno(10001)).unwrap()[1], -0.02);
        assert_eq!(joined.column(Permno(10002)).unwrap()[1], 0.9);
    }

    #[test]
    fn test_dataframe_labels_are_strings() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.get_column_names(), vec!["date", "10001", "10002"]);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_dataframe_round_trip() {
        let panel = sample();
        let back = ReturnsPanel::from_dataframe(&panel.to_dataframe().unwrap()).unwrap();
        assert_eq!(back.dates(), panel.dates());
        assert_eq!(back.permnos(), panel.permnos());
        assert_eq!(back.values()[[0, 0]], 0.01);
        assert!(back.values()[[0, 1]].is_nan());
    }

    #[test]
    fn test_new_rejects_bad_shape() {
        let result = ReturnsPanel::new(vec![date(2020, 1, 2)], vec![Permno(1)], Array2::zeros((2, 1)));
        assert!(matches!(result, Err(DataError::DimensionMismatch { .. })));
    }
}
