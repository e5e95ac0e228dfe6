//! Stacking meta-regressor over frozen delegate models

use crate::error::{CyclecastError, Result};
use crate::models::{PretrainedLinear, RidgeRegressor};
use crate::pipeline::{FeatureMatrix, Regressor};
use ndarray::{Array1, Array2};

/// An ensemble whose meta-regressor is fit on the predictions of frozen,
/// pre-trained delegate models.
///
/// The delegates are resolved before construction and never refit here; the
/// ensemble's `fit` only trains the meta level. Candidate delegate subsets
/// are a search hyperparameter, so every search candidate must construct a
/// fresh `StackedRegressor` from a freshly resolved delegate list.
pub struct StackedRegressor {
    delegates: Vec<PretrainedLinear>,
    meta: RidgeRegressor,
}

impl StackedRegressor {
    /// Create an ensemble over the given delegates with a ridge meta level.
    pub fn new(delegates: Vec<PretrainedLinear>, meta: RidgeRegressor) -> Self {
        Self { delegates, meta }
    }

    /// Number of delegate models.
    pub fn n_delegates(&self) -> usize {
        self.delegates.len()
    }

    /// Delegate predictions as the meta-level feature matrix.
    fn meta_features(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        let n = x.n_rows();
        let mut values = Array2::zeros((n, self.delegates.len()));
        let mut names = Vec::with_capacity(self.delegates.len());

        for (j, delegate) in self.delegates.iter().enumerate() {
            let pred = delegate.predict(x)?;
            for i in 0..n {
                values[[i, j]] = pred[i];
            }
            names.push(delegate.name().to_string());
        }

        Ok(FeatureMatrix { names, values })
    }
}

impl Regressor for StackedRegressor {
    fn fit(&mut self, x: &FeatureMatrix, y: &Array1<f64>) -> Result<()> {
        if self.delegates.is_empty() {
            return Err(CyclecastError::ValidationError(
                "stacking requires at least one delegate model".to_string(),
            ));
        }
        let meta_x = self.meta_features(x)?;
        self.meta.fit(&meta_x, y)
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Array1<f64>> {
        let meta_x = self.meta_features(x)?;
        self.meta.predict(&meta_x)
    }
}
