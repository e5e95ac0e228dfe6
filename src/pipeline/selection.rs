//! Variance-threshold feature selection

use super::{FeatureMatrix, Transform, TransformReport};
use crate::error::{CyclecastError, Result};
use ndarray::Array1;
use polars::prelude::*;

/// Drops features whose variance does not exceed a threshold.
///
/// The fitted per-feature variances and support mask are exposed through
/// [`Transform::report`] so the experiment engine can persist them alongside
/// the run results.
#[derive(Debug, Clone)]
pub struct VarianceThreshold {
    threshold: f64,
    names: Option<Vec<String>>,
    variances: Option<Vec<f64>>,
    support: Option<Vec<bool>>,
}

impl VarianceThreshold {
    /// Create a selector with the given variance threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            names: None,
            variances: None,
            support: None,
        }
    }

    fn support(&self) -> Result<&[bool]> {
        self.support
            .as_deref()
            .ok_or(CyclecastError::ModelNotFitted)
    }
}

impl Transform for VarianceThreshold {
    fn fit(&mut self, x: &FeatureMatrix, _y: &Array1<f64>) -> Result<()> {
        let n = x.n_rows();
        if n == 0 {
            return Err(CyclecastError::ValidationError(
                "cannot fit variance threshold on an empty matrix".to_string(),
            ));
        }

        // Population variance (ddof 0).
        let mut variances = Vec::with_capacity(x.n_cols());
        for j in 0..x.n_cols() {
            let col = x.values.column(j);
            let mean = col.sum() / n as f64;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            variances.push(var);
        }

        let support: Vec<bool> = variances.iter().map(|&v| v > self.threshold).collect();

        if !support.iter().any(|&s| s) {
            return Err(CyclecastError::ValidationError(format!(
                "no feature exceeds variance threshold {}",
                self.threshold
            )));
        }

        self.names = Some(x.names.clone());
        self.variances = Some(variances);
        self.support = Some(support);
        Ok(())
    }

    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        let support = self.support()?;
        let keep: Vec<usize> = support
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .map(|(j, _)| j)
            .collect();
        Ok(x.select_columns(&keep))
    }

    fn report(&self) -> Option<TransformReport> {
        let names = self.names.as_ref()?;
        let variances = self.variances.as_ref()?;
        let support = self.support.as_ref()?;

        let table = df!(
            "feature" => names.clone(),
            "variance" => variances.clone(),
            "support" => support.clone(),
        )
        .ok()?;

        Some(TransformReport {
            name: "variancethreshold".to_string(),
            table,
        })
    }
}
