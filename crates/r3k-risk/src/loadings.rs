//! Factor Loadings
//!
//! Time-series regression of one security's daily returns on the factors:
//!
//! r_t = a + b_1 * f_1,t + ... + b_k * f_k,t + e_t
//!
//! Only dates where the return and every factor are finite are used.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use r3k_data::french::{Factor, FactorTable};
use r3k_data::{Permno, ReturnsPanel};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toraniko_math::{MathError, weighted_least_squares};
use tracing::debug;

/// Name of the intercept coefficient.
pub const INTERCEPT: &str = "intercept";

/// Loading estimation errors
#[derive(Debug, Error)]
pub enum LoadingError {
    /// Too few dates with a finite return and finite factors
    #[error("Insufficient observations: need {required}, have {available}")]
    InsufficientObservations {
        /// Minimum rows needed
        required: usize,
        /// Usable rows
        available: usize,
    },

    /// Returns and factors disagree on the number of dates
    #[error("Dimension mismatch: {returns} return rows vs {factors} factor rows")]
    DimensionMismatch {
        /// Return rows
        returns: usize,
        /// Factor rows
        factors: usize,
    },

    /// A loadings row has the wrong number of coefficients
    #[error("Expected {expected} coefficients, got {actual}")]
    CoefficientCount {
        /// Intercept plus factor count
        expected: usize,
        /// Coefficients in the row
        actual: usize,
    },

    /// Regression failed (singular design)
    #[error("Regression failed: {0}")]
    Regression(#[from] MathError),

    /// Coefficients came back as NaN or infinite
    #[error("Non-finite coefficients")]
    NonFinite,
}

/// Loading estimation configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingConfig {
    /// Minimum usable observations. The effective floor is never below
    /// `1 + k`, the number of coefficients.
    pub min_observations: usize,
}

/// A successful regression.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    /// Intercept followed by one slope per factor
    pub coefficients: Array1<f64>,
    /// In-sample R-squared
    pub r_squared: f64,
    /// Rows used
    pub observations: usize,
}

/// Loadings for one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadings {
    /// Security identifier
    pub permno: Permno,
    /// Intercept followed by one slope per factor; all `NaN` on failure
    pub coefficients: Vec<f64>,
    /// In-sample R-squared, `NaN` on failure
    pub r_squared: f64,
    /// Usable rows
    pub observations: usize,
}

impl Loadings {
    /// A failed estimate with `1 + factors` `NaN` coefficients.
    pub fn nan(permno: Permno, factors: usize, observations: usize) -> Self {
        Self {
            permno,
            coefficients: vec![f64::NAN; factors + 1],
            r_squared: f64::NAN,
            observations,
        }
    }

    /// Intercept.
    pub fn intercept(&self) -> f64 {
        self.coefficients.first().copied().unwrap_or(f64::NAN)
    }

    /// True when the regression succeeded.
    pub fn is_valid(&self) -> bool {
        self.coefficients.iter().all(|c| c.is_finite())
    }
}

/// Loadings for every security in a panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingsTable {
    factors: Vec<Factor>,
    rows: Vec<Loadings>,
}

impl LoadingsTable {
    /// Create a table. Every row must carry `1 + factors.len()` coefficients.
    pub fn new(factors: Vec<Factor>, rows: Vec<Loadings>) -> Result<Self, LoadingError> {
        if let Some(bad) = rows.iter().find(|r| r.coefficients.len() != factors.len() + 1) {
            return Err(LoadingError::CoefficientCount {
                expected: factors.len() + 1,
                actual: bad.coefficients.len(),
            });
        }
        Ok(Self { factors, rows })
    }

    /// Regressors, in coefficient order after the intercept.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Rows in panel column order.
    pub fn rows(&self) -> &[Loadings] {
        &self.rows
    }

    /// Coefficient names: `intercept` then factor names.
    pub fn coefficient_names(&self) -> Vec<&'static str> {
        std::iter::once(INTERCEPT)
            .chain(self.factors.iter().map(Factor::name))
            .collect()
    }

    /// Loadings for one security.
    pub fn get(&self, permno: Permno) -> Option<&Loadings> {
        self.rows.iter().find(|r| r.permno == permno)
    }

    /// Number of securities.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no securities.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of securities with a successful fit.
    pub fn valid_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_valid()).count()
    }
}

/// OLS loading estimator
#[derive(Debug, Clone, Default)]
pub struct LoadingEstimator {
    config: LoadingConfig,
}

impl LoadingEstimator {
    /// Create a new estimator
    pub const fn new(config: LoadingConfig) -> Self {
        Self { config }
    }

    /// Regress `returns` (n) on `[1 | factors]` (n x k).
    ///
    /// Rows with a non-finite return or any non-finite factor are dropped.
    pub fn try_estimate(
        &self,
        returns: ArrayView1<'_, f64>,
        factors: ArrayView2<'_, f64>,
    ) -> Result<Fit, LoadingError> {
        if returns.len() != factors.nrows() {
            return Err(LoadingError::DimensionMismatch {
                returns: returns.len(),
                factors: factors.nrows(),
            });
        }

        let k = factors.ncols();
        let usable: Vec<usize> = (0..returns.len())
            .filter(|&i| returns[i].is_finite() && factors.row(i).iter().all(|f| f.is_finite()))
            .collect();

        let required = self.config.min_observations.max(k + 1);
        if usable.len() < required {
            return Err(LoadingError::InsufficientObservations {
                required,
                available: usable.len(),
            });
        }

        let n = usable.len();
        let y: Array1<f64> = usable.iter().map(|&i| returns[i]).collect();
        let mut x = Array2::ones((n, k + 1));
        for (row, &i) in usable.iter().enumerate() {
            for j in 0..k {
                x[[row, j + 1]] = factors[[i, j]];
            }
        }
        let weights = Array1::ones(n);

        let result = weighted_least_squares(&y, &x, &weights)?;
        if !result.coefficients.iter().all(|c| c.is_finite()) {
            return Err(LoadingError::NonFinite);
        }

        Ok(Fit {
            coefficients: result.coefficients,
            r_squared: result.r_squared,
            observations: n,
        })
    }

    /// Estimate loadings for one security, falling back to a `NaN` record.
    pub fn estimate(
        &self,
        permno: Permno,
        returns: ArrayView1<'_, f64>,
        factors: ArrayView2<'_, f64>,
    ) -> Loadings {
        match self.try_estimate(returns, factors) {
            Ok(fit) => Loadings {
                permno,
                coefficients: fit.coefficients.to_vec(),
                r_squared: fit.r_squared,
                observations: fit.observations,
            },
            Err(err) => {
                debug!(%permno, error = %err, "Loading estimate failed");
                let available = match err {
                    LoadingError::InsufficientObservations { available, .. } => available,
                    _ => usable_rows(returns, factors),
                };
                Loadings::nan(permno, factors.ncols(), available)
            }
        }
    }

    /// Estimate loadings for every column of `panel` on `factors`.
    ///
    /// Factor rows are aligned to the panel's dates; dates without factor
    /// data are unusable for every security.
    pub fn estimate_panel(
        &self,
        panel: &ReturnsPanel,
        table: &FactorTable,
        factors: &[Factor],
    ) -> LoadingsTable {
        let x = table.align(panel.dates(), factors);
        let values = panel.values();

        let rows = panel
            .permnos()
            .iter()
            .enumerate()
            .map(|(j, permno)| self.estimate(*permno, values.column(j), x.view()))
            .collect();

        LoadingsTable {
            factors: factors.to_vec(),
            rows,
        }
    }
}

fn usable_rows(returns: ArrayView1<'_, f64>, factors: ArrayView2<'_, f64>) -> usize {
    if returns.len() != factors.nrows() {
        return 0;
    }
    (0..returns.len())
        .filter(|&i| returns[i].is_finite() && factors.row(i).iter().all(|f| f.is_finite()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rstest::rstest;

    fn design() -> Array2<f64> {
        array![
            [0.010, 0.002],
            [-0.004, 0.001],
            [0.007, -0.003],
            [0.001, 0.004],
            [-0.012, 0.000],
            [0.003, -0.001],
        ]
    }

    #[test]
    fn test_recovers_exact_coefficients() {
        let x = design();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| 0.001 + 1.2 * r[0] - 0.5 * r[1])
            .collect();

        let fit = LoadingEstimator::default()
            .try_estimate(y.view(), x.view())
            .unwrap();
        assert_eq!(fit.observations, 6);
        assert_relative_eq!(fit.coefficients[0], 0.001, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficients[1], 1.2, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficients[2], -0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_skips_non_finite_rows() {
        let mut x = design();
        let mut y: Array1<f64> = x.rows().into_iter().map(|r| 2.0 * r[0]).collect();
        y[0] = f64::NAN;
        x[[1, 1]] = f64::INFINITY;

        let fit = LoadingEstimator::default()
            .try_estimate(y.view(), x.view())
            .unwrap();
        assert_eq!(fit.observations, 4);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rank_deficient_gives_nan_record() {
        let x = array![
            [0.01, 0.01],
            [0.02, 0.02],
            [-0.01, -0.01],
            [0.03, 0.03],
        ];
        let y = array![0.01, 0.02, 0.00, 0.01];

        let loadings = LoadingEstimator::default().estimate(Permno(7), y.view(), x.view());
        assert_eq!(loadings.coefficients.len(), 3);
        assert!(loadings.coefficients.iter().all(|c| c.is_nan()));
        assert!(!loadings.is_valid());
    }

    #[rstest]
    #[case(0, 3)]
    #[case(2, 3)]
    #[case(5, 5)]
    fn test_insufficient_observations(#[case] min_observations: usize, #[case] required: usize) {
        let x = array![[0.01, 0.02], [0.03, -0.01]];
        let y = array![0.01, 0.02];
        let estimator = LoadingEstimator::new(LoadingConfig { min_observations });

        match estimator.try_estimate(y.view(), x.view()) {
            Err(LoadingError::InsufficientObservations {
                required: r,
                available,
            }) => {
                assert_eq!(r, required);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientObservations, got {:?}", other),
        }

        let record = estimator.estimate(Permno(1), y.view(), x.view());
        assert_eq!(record.coefficients.len(), 3);
        assert_eq!(record.observations, 2);
    }

    #[test]
    fn test_dimension_mismatch_gives_nan_record() {
        let x = design();
        let y = array![0.01, 0.02];
        let record = LoadingEstimator::default().estimate(Permno(1), y.view(), x.view());
        assert_eq!(record.coefficients.len(), 3);
        assert!(!record.is_valid());
    }

    #[test]
    fn test_table_rejects_ragged_rows() {
        let rows = vec![Loadings::nan(Permno(1), 2, 0)];
        assert!(matches!(
            LoadingsTable::new(vec![Factor::MktRf], rows),
            Err(LoadingError::CoefficientCount {
                expected: 2,
                actual: 3
            })
        ));
    }
}
