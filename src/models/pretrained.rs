//! Frozen pre-trained linear estimators
//!
//! These are loaded from coefficient tables by the model registry and are
//! never refit: `fit` is a no-op so they can sit inside a stacking ensemble
//! without being disturbed by the ensemble's own fit.

use crate::error::Result;
use crate::pipeline::{FeatureMatrix, Regressor};
use ndarray::Array1;

/// A fitted linear model: intercept plus named-feature weights.
#[derive(Debug, Clone)]
pub struct PretrainedLinear {
    name: String,
    intercept: f64,
    weights: Vec<(String, f64)>,
}

impl PretrainedLinear {
    /// Create a pre-trained model from its coefficients.
    pub fn new(name: impl Into<String>, intercept: f64, weights: Vec<(String, f64)>) -> Self {
        Self {
            name: name.into(),
            intercept,
            weights,
        }
    }

    /// The model's identifier, e.g. `short_temp_201`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Regressor for PretrainedLinear {
    fn fit(&mut self, _x: &FeatureMatrix, _y: &Array1<f64>) -> Result<()> {
        // Frozen at load time.
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Array1<f64>> {
        let mut out = Array1::from_elem(x.n_rows(), self.intercept);
        for (feature, weight) in &self.weights {
            let col = x.column(feature)?;
            out = out + col * *weight;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_linear_form() {
        let model = PretrainedLinear::new(
            "full_201",
            1.0,
            vec![("bikes_3h".to_string(), 2.0), ("docks".to_string(), 0.5)],
        );

        let df = df!(
            "bikes_3h" => &[1.0, 2.0],
            "docks" => &[10.0, 20.0],
        )
        .unwrap();
        let x = FeatureMatrix::from_frame(&df, &[]).unwrap();

        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.to_vec(), vec![1.0 + 2.0 + 5.0, 1.0 + 4.0 + 10.0]);
    }

    #[test]
    fn test_missing_feature_is_error() {
        let model = PretrainedLinear::new("m", 0.0, vec![("absent".to_string(), 1.0)]);
        let df = df!("present" => &[1.0]).unwrap();
        let x = FeatureMatrix::from_frame(&df, &[]).unwrap();
        assert!(model.predict(&x).is_err());
    }
}
