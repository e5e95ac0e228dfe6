//! Transform/regressor pipeline abstractions
//!
//! A [`Pipeline`] is an ordered sequence of [`Transform`] steps terminating in
//! a [`Regressor`], fit and applied as one unit. Data moves through the
//! pipeline as a [`FeatureMatrix`] so that by-name column access survives
//! feature selection.

pub mod selection;

pub use selection::VarianceThreshold;

use crate::error::{CyclecastError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// A numeric feature matrix with column names.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Column names, aligned with the columns of `values`.
    pub names: Vec<String>,
    /// Row-major feature values.
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    /// Extract numeric columns from a DataFrame into a row-major matrix.
    ///
    /// String columns and the excluded names are skipped; every remaining
    /// column is cast to `Float64` with nulls filled as `0.0`.
    pub fn from_frame(df: &DataFrame, exclude: &[&str]) -> Result<Self> {
        let mut names = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();

        for col in df.get_columns() {
            let name = col.name().as_str();
            if exclude.contains(&name) || matches!(col.dtype(), DataType::String) {
                continue;
            }
            let casted = col.cast(&DataType::Float64)?;
            let values: Vec<f64> = casted
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            names.push(name.to_string());
            columns.push(values);
        }

        let n_rows = df.height();
        let n_cols = names.len();
        let values = Array2::from_shape_fn((n_rows, n_cols), |(i, j)| columns[j][i]);

        Ok(Self { names, values })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of feature columns.
    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Select rows by index.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        let values = Array2::from_shape_fn((indices.len(), self.n_cols()), |(i, j)| {
            self.values[[indices[i], j]]
        });
        Self {
            names: self.names.clone(),
            values,
        }
    }

    /// The chronological prefix of the matrix (first `n` rows).
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.n_rows());
        let values = Array2::from_shape_fn((n, self.n_cols()), |(i, j)| self.values[[i, j]]);
        Self {
            names: self.names.clone(),
            values,
        }
    }

    /// Select columns by index, preserving order.
    pub fn select_columns(&self, keep: &[usize]) -> Self {
        let names = keep.iter().map(|&j| self.names[j].clone()).collect();
        let values = Array2::from_shape_fn((self.n_rows(), keep.len()), |(i, j)| {
            self.values[[i, keep[j]]]
        });
        Self { names, values }
    }

    /// Reorder columns to match `names`, dropping any extras.
    ///
    /// Errors with [`CyclecastError::FeatureNotFound`] when a requested
    /// column is absent.
    pub fn align_to(&self, names: &[String]) -> Result<Self> {
        if self.names.as_slice() == names {
            return Ok(self.clone());
        }
        let keep = names
            .iter()
            .map(|name| {
                self.names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| CyclecastError::FeatureNotFound(name.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(self.select_columns(&keep))
    }

    /// The values of a named column.
    pub fn column(&self, name: &str) -> Result<Array1<f64>> {
        let idx = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| CyclecastError::FeatureNotFound(name.to_string()))?;
        Ok(self.values.column(idx).to_owned())
    }
}

/// Fitted-state report a transform can expose for diagnostics output.
#[derive(Debug, Clone)]
pub struct TransformReport {
    /// Lower-case transform name, used in the diagnostics file name.
    pub name: String,
    /// Per-feature diagnostics table.
    pub table: DataFrame,
}

/// A fittable feature transform.
pub trait Transform {
    /// Fit the transform to training data.
    fn fit(&mut self, x: &FeatureMatrix, y: &Array1<f64>) -> Result<()>;

    /// Apply the fitted transform.
    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix>;

    /// Optional per-feature diagnostics from the fitted state.
    fn report(&self) -> Option<TransformReport> {
        None
    }
}

/// A regression estimator.
pub trait Regressor {
    /// Fit the regressor to training data.
    fn fit(&mut self, x: &FeatureMatrix, y: &Array1<f64>) -> Result<()>;

    /// Predict targets for new data.
    fn predict(&self, x: &FeatureMatrix) -> Result<Array1<f64>>;
}

/// A composed transform-then-regress pipeline.
pub struct Pipeline {
    steps: Vec<(String, Box<dyn Transform>)>,
    regressor: Box<dyn Regressor>,
    feature_names: Option<Vec<String>>,
}

impl Pipeline {
    /// Create a pipeline terminating in the given regressor.
    pub fn new(regressor: Box<dyn Regressor>) -> Self {
        Self {
            steps: Vec::new(),
            regressor,
            feature_names: None,
        }
    }

    /// Append a named transform step.
    pub fn with_step(mut self, name: impl Into<String>, step: Box<dyn Transform>) -> Self {
        self.steps.push((name.into(), step));
        self
    }

    /// Fit all steps and the terminal regressor, recording the training
    /// column layout.
    pub fn fit(&mut self, x: &FeatureMatrix, y: &Array1<f64>) -> Result<()> {
        self.feature_names = Some(x.names.clone());
        let mut current = x.clone();
        for (_, step) in self.steps.iter_mut() {
            step.fit(&current, y)?;
            current = step.transform(&current)?;
        }
        self.regressor.fit(&current, y)
    }

    /// Predict by applying all fitted steps then the regressor.
    ///
    /// Input columns are matched to the training layout by name, so a
    /// reordered test table predicts the same as the training order.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Array1<f64>> {
        let mut current = match &self.feature_names {
            Some(names) => x.align_to(names)?,
            None => x.clone(),
        };
        for (_, step) in self.steps.iter() {
            current = step.transform(&current)?;
        }
        self.regressor.predict(&current)
    }

    /// Diagnostics reports from all fitted steps that expose one.
    pub fn reports(&self) -> Vec<TransformReport> {
        self.steps
            .iter()
            .filter_map(|(_, step)| step.report())
            .collect()
    }
}
