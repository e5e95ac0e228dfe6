//! Processing specifications
//!
//! A [`ProcessingSpec`] bundles the target column with the fixed
//! pre-processing chain applied before fitting, the curried post-processing
//! step applied to raw predictions, and the submission formatter.

use crate::data::schema::{BIKES, BIKES_FRACTION, DOCKS, ID};
use crate::error::{CyclecastError, Result};
use ndarray::Array1;
use polars::prelude::*;

/// A fixed pre-processing step: table in, table out.
pub type PreProcessing = Box<dyn Fn(&DataFrame) -> Result<DataFrame> + Send + Sync>;

/// A curried post-processing step: given the test covariates, produce the
/// transform to apply to raw predictions.
pub type PostProcessing =
    Box<dyn Fn(&DataFrame) -> Result<Box<dyn Fn(&Array1<f64>) -> Array1<f64>>> + Send + Sync>;

/// Formats predictions into the externally consumable submission table.
pub type SubmitFn = Box<dyn Fn(&DataFrame, &Array1<f64>) -> Result<DataFrame> + Send + Sync>;

/// Processing specification.
///
/// `pre` steps must compose left-to-right; `post` must invert whatever
/// transform `pre` applied to the target.
pub struct ProcessingSpec {
    /// The target variable.
    pub target: String,
    pre: Vec<PreProcessing>,
    post: PostProcessing,
    submit: SubmitFn,
}

impl Default for ProcessingSpec {
    fn default() -> Self {
        Self {
            target: BIKES.to_string(),
            pre: vec![pre_dropna_row(vec![BIKES.to_string()])],
            post: post_identity(),
            submit: submission(),
        }
    }
}

impl ProcessingSpec {
    /// A spec predicting the given target with no pre/post-processing.
    pub fn identity(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            pre: vec![pre_identity()],
            post: post_identity(),
            submit: submission(),
        }
    }

    /// The fraction-target variant: predict bikes/docks, de-normalise after.
    pub fn bikes_fraction() -> Self {
        Self {
            target: BIKES_FRACTION.to_string(),
            pre: vec![
                pre_bikes_fraction(),
                pre_dropna_row(vec![BIKES_FRACTION.to_string()]),
            ],
            post: post_undo_bikes_fraction(),
            submit: submission(),
        }
    }

    /// Replace the pre-processing chain.
    pub fn with_pre(mut self, pre: Vec<PreProcessing>) -> Self {
        self.pre = pre;
        self
    }

    /// Replace the post-processing step.
    pub fn with_post(mut self, post: PostProcessing) -> Self {
        self.post = post;
        self
    }

    /// Replace the submission formatter.
    pub fn with_submit(mut self, submit: SubmitFn) -> Self {
        self.submit = submit;
        self
    }

    /// Apply the pre-processing chain left-to-right.
    pub fn pre(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut current = df.clone();
        for step in &self.pre {
            current = step(&current)?;
        }
        Ok(current)
    }

    /// Build the prediction post-processor for a test table.
    pub fn post(&self, x_test: &DataFrame) -> Result<Box<dyn Fn(&Array1<f64>) -> Array1<f64>>> {
        (self.post)(x_test)
    }

    /// Format predictions into the submission table.
    pub fn submit(&self, x_test: &DataFrame, y_pred: &Array1<f64>) -> Result<DataFrame> {
        (self.submit)(x_test, y_pred)
    }

    /// Split a pre-processed table into features and the target vector.
    ///
    /// Null targets are a data error; `pre` is expected to have dropped them.
    pub fn split_target(&self, df: &DataFrame) -> Result<(DataFrame, Array1<f64>)> {
        let target = df.column(self.target.as_str()).map_err(|_| {
            CyclecastError::DataError(format!("missing target column: {}", self.target))
        })?;
        if target.null_count() > 0 {
            return Err(CyclecastError::DataError(format!(
                "target column {} contains {} nulls after pre-processing",
                self.target,
                target.null_count()
            )));
        }

        let casted = target.cast(&DataType::Float64)?;
        let y: Vec<f64> = casted.f64()?.into_no_null_iter().collect();
        let x = df.drop(self.target.as_str())?;
        Ok((x, Array1::from_vec(y)))
    }
}

/// Pre-processing: identity/no-op.
pub fn pre_identity() -> PreProcessing {
    Box::new(|df| Ok(df.clone()))
}

/// Pre-processing: drop rows with nulls in the given columns.
pub fn pre_dropna_row(columns: Vec<String>) -> PreProcessing {
    Box::new(move |df| {
        let mut mask: Option<BooleanChunked> = None;
        for column in &columns {
            let not_null = df.column(column)?.is_not_null();
            mask = Some(match mask {
                Some(m) => m & not_null,
                None => not_null,
            });
        }
        match mask {
            Some(m) => Ok(df.filter(&m)?),
            None => Ok(df.clone()),
        }
    })
}

/// Pre-processing: drop the given columns.
pub fn pre_drop_columns(columns: Vec<String>) -> PreProcessing {
    Box::new(move |df| {
        let mut current = df.clone();
        for column in &columns {
            current = current.drop(column)?;
        }
        Ok(current)
    })
}

/// Pre-processing: replace the bikes count with the bikes/docks fraction.
pub fn pre_bikes_fraction() -> PreProcessing {
    Box::new(|df| {
        let bikes = df.column(BIKES)?.cast(&DataType::Float64)?;
        let docks = df.column(DOCKS)?.cast(&DataType::Float64)?;
        let fraction: Vec<Option<f64>> = bikes
            .f64()?
            .into_iter()
            .zip(docks.f64()?)
            .map(|(b, d)| match (b, d) {
                (Some(b), Some(d)) if d > 0.0 => Some(b / d),
                _ => None,
            })
            .collect();

        let mut out = df.clone();
        out.with_column(Column::new(BIKES_FRACTION.into(), fraction))?;
        Ok(out.drop(BIKES)?)
    })
}

/// Post-processing: identity/no-op.
pub fn post_identity() -> PostProcessing {
    Box::new(|_x_test| Ok(Box::new(|y_pred: &Array1<f64>| y_pred.clone())))
}

/// Post-processing: clip the fraction to [0, 1] and multiply by docks.
pub fn post_undo_bikes_fraction() -> PostProcessing {
    Box::new(|x_test| {
        let docks = x_test.column(DOCKS)?.cast(&DataType::Float64)?;
        let docks: Vec<f64> = docks.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect();
        Ok(Box::new(move |y_pred: &Array1<f64>| {
            y_pred
                .iter()
                .zip(docks.iter())
                .map(|(p, d)| p.clamp(0.0, 1.0) * d)
                .collect()
        }))
    })
}

/// The default submission formatter: `Id` from the test table, `bikes` from
/// the predictions, order preserved.
pub fn submission() -> SubmitFn {
    Box::new(|x_test, y_pred| {
        let ids = x_test.column(ID)?.cast(&DataType::Int64)?;
        let ids: Vec<Option<i64>> = ids.i64()?.into_iter().collect();
        if ids.len() != y_pred.len() {
            return Err(CyclecastError::ValidationError(format!(
                "submission mismatch: {} test rows, {} predictions",
                ids.len(),
                y_pred.len()
            )));
        }
        Ok(df!(
            "Id" => ids,
            "bikes" => y_pred.to_vec(),
        )?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_frame() -> DataFrame {
        df!(
            "docks" => &[20i64, 20, 40, 40],
            "bikes" => &[Some(5.0), None, Some(10.0), Some(20.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_dropna_removes_null_targets() {
        let df = train_frame();
        let spec = ProcessingSpec::default();
        let out = spec.pre(&df).unwrap();

        assert!(out.height() <= df.height());
        assert_eq!(out.column(BIKES).unwrap().null_count(), 0);
        assert_eq!(out.height(), 3);
    }

    #[test]
    fn test_bikes_fraction_round_trip() {
        let df = train_frame();
        let spec = ProcessingSpec::bikes_fraction();
        let out = spec.pre(&df).unwrap();

        // bikes replaced by the fraction, null row dropped
        assert!(out.column(BIKES).is_err());
        assert_eq!(out.height(), 3);
        let (_, y) = spec.split_target(&out).unwrap();
        assert_eq!(y.to_vec(), vec![0.25, 0.25, 0.5]);

        // post de-normalises back to counts, clipping out-of-range fractions
        let x_test = df!("id" => &[1i64, 2], "docks" => &[20i64, 40]).unwrap();
        let post = spec.post(&x_test).unwrap();
        let y_pred = Array1::from_vec(vec![0.5, 1.2]);
        let restored = post(&y_pred);
        assert_eq!(restored.to_vec(), vec![10.0, 40.0]);
    }

    #[test]
    fn test_submission_preserves_order() {
        let x_test = df!(
            "id" => &[3i64, 1, 2],
            "docks" => &[20i64, 20, 20],
        )
        .unwrap();
        let y_pred = Array1::from_vec(vec![5.0, 6.0, 7.0]);

        let spec = ProcessingSpec::default();
        let out = spec.submit(&x_test, &y_pred).unwrap();

        assert_eq!(out.height(), y_pred.len());
        let ids: Vec<i64> = out
            .column("Id")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_split_target_rejects_nulls() {
        let df = train_frame();
        let spec = ProcessingSpec::default();
        assert!(spec.split_target(&df).is_err());
    }

    #[test]
    fn test_missing_target_is_data_error() {
        let df = df!("docks" => &[20i64]).unwrap();
        let spec = ProcessingSpec::default();
        assert!(matches!(
            spec.split_target(&df),
            Err(CyclecastError::DataError(_))
        ));
    }
}
