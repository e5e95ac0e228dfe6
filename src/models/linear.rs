//! Baseline and ridge regressors

use crate::error::{CyclecastError, Result};
use crate::pipeline::{FeatureMatrix, Regressor};
use ndarray::{Array1, Array2};

/// Dummy regressor predicting the training-target mean.
#[derive(Debug, Clone, Default)]
pub struct BaselineRegressor {
    mean: Option<f64>,
}

impl BaselineRegressor {
    /// Create an unfitted baseline.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Regressor for BaselineRegressor {
    fn fit(&mut self, _x: &FeatureMatrix, y: &Array1<f64>) -> Result<()> {
        if y.is_empty() {
            return Err(CyclecastError::ValidationError(
                "cannot fit baseline on empty target".to_string(),
            ));
        }
        self.mean = Some(y.sum() / y.len() as f64);
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Array1<f64>> {
        let mean = self.mean.ok_or(CyclecastError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.n_rows(), mean))
    }
}

/// Ridge regression via the normal equations.
///
/// Fits weights plus an unpenalised intercept by solving
/// `(X'X + alpha*I) w = X'y` with Gaussian elimination. Non-finite feature
/// values are treated as `0.0`, matching the matrix-conversion convention.
#[derive(Debug, Clone)]
pub struct RidgeRegressor {
    alpha: f64,
    /// Feature weights followed by the intercept.
    weights: Option<Array1<f64>>,
}

impl RidgeRegressor {
    /// Create a ridge regressor with the given L2 penalty.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            weights: None,
        }
    }

    fn design_row(x: &FeatureMatrix, i: usize, p: usize) -> impl Iterator<Item = f64> + '_ {
        (0..=p).map(move |j| {
            if j == p {
                1.0
            } else {
                let v = x.values[[i, j]];
                if v.is_finite() {
                    v
                } else {
                    0.0
                }
            }
        })
    }
}

impl Regressor for RidgeRegressor {
    fn fit(&mut self, x: &FeatureMatrix, y: &Array1<f64>) -> Result<()> {
        let n = x.n_rows();
        let p = x.n_cols();
        if n == 0 || n != y.len() {
            return Err(CyclecastError::ValidationError(format!(
                "ridge fit requires matching non-empty shapes, got {} rows and {} targets",
                n,
                y.len()
            )));
        }

        // Gram matrix of the bias-augmented design, penalty on all but the bias.
        let mut xtx = Array2::<f64>::zeros((p + 1, p + 1));
        let mut xty = Array1::<f64>::zeros(p + 1);

        for i in 0..n {
            let row: Vec<f64> = Self::design_row(x, i, p).collect();
            for a in 0..=p {
                xty[a] += row[a] * y[i];
                for b in 0..=p {
                    xtx[[a, b]] += row[a] * row[b];
                }
            }
        }
        for j in 0..p {
            xtx[[j, j]] += self.alpha;
        }

        self.weights = Some(solve(xtx, xty)?);
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Array1<f64>> {
        let weights = self.weights.as_ref().ok_or(CyclecastError::ModelNotFitted)?;
        let p = weights.len() - 1;
        if x.n_cols() != p {
            return Err(CyclecastError::ValidationError(format!(
                "ridge fitted on {} features, got {}",
                p,
                x.n_cols()
            )));
        }

        let mut out = Array1::zeros(x.n_rows());
        for i in 0..x.n_rows() {
            out[i] = Self::design_row(x, i, p)
                .zip(weights.iter())
                .map(|(v, w)| v * w)
                .sum();
        }
        Ok(out)
    }
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[[i, col]]
                    .abs()
                    .partial_cmp(&a[[j, col]].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);

        if a[[pivot, col]].abs() < 1e-12 {
            return Err(CyclecastError::ComputationError(
                "singular system in ridge solve".to_string(),
            ));
        }

        if pivot != col {
            for j in 0..n {
                let tmp = a[[col, j]];
                a[[col, j]] = a[[pivot, j]];
                a[[pivot, j]] = tmp;
            }
            b.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            for j in col..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut sum = b[row];
        for j in (row + 1)..n {
            sum -= a[[row, j]] * x[j];
        }
        x[row] = sum / a[[row, row]];
    }
    Ok(x)
}
