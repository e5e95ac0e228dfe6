//! Experiment execution and evaluation engine
//!
//! The abstractions here define a reusable model/processing specification,
//! run it through hyperparameter search or plain fit/predict under a
//! chronological cross-validation scheme, and aggregate per-fold scores for
//! downstream statistical comparison.
//!
//! - [`ModelSpec`]/[`ProcessingSpec`] — declarative experiment definitions
//! - [`cv`] — chronological cross-validation splitting
//! - [`search`] — grid and successive-halving hyperparameter search
//! - [`engine`] — the shared fit-or-search core and result persistence
//! - [`PerStationExperiment`], [`PooledExperiment`], [`StackedExperiment`] —
//!   the three experiment granularities

pub mod cv;
pub mod engine;
pub mod per_station;
pub mod pooled;
pub mod processing;
pub mod search;
pub mod stacked;

pub use cv::{CrossValidator, CvSplit, CvStrategy};
pub use engine::{ExperimentCore, SplitOutcome};
pub use per_station::PerStationExperiment;
pub use pooled::PooledExperiment;
pub use processing::ProcessingSpec;
pub use search::SearchStrategy;
pub use stacked::StackedExperiment;

use crate::error::Result;
use crate::pipeline::Pipeline;
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    /// A list of names, e.g. the delegate families of a stacking ensemble.
    StrList(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
            ParamValue::StrList(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

/// An ordered hyperparameter grid: parameter name to candidate values.
///
/// Candidates are enumerated as the cartesian product in insertion order, so
/// the first grid axis varies slowest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    entries: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    /// Create an empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grid axis.
    pub fn with(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.entries.push((name.into(), values));
        self
    }

    /// All candidate assignments (cartesian product).
    ///
    /// An empty grid yields a single empty assignment.
    pub fn candidates(&self) -> Vec<ParamSet> {
        let mut sets = vec![ParamSet::default()];
        for (name, values) in &self.entries {
            let mut next = Vec::with_capacity(sets.len() * values.len());
            for set in &sets {
                for value in values {
                    let mut grown = set.clone();
                    grown.insert(name.clone(), value.clone());
                    next.push(grown);
                }
            }
            sets = next;
        }
        sets
    }
}

/// One hyperparameter assignment out of a grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    /// Insert a parameter value.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    /// Look up a parameter value.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Numeric parameter, lifting integers to floats.
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => Some(*v),
            Some(ParamValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// Name-list parameter.
    pub fn str_list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ParamValue::StrList(v)) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Metric used to select and report scores.
///
/// One canonical lower-is-better error value is held everywhere inside the
/// engine; no sign flipping happens in business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scoring {
    #[default]
    MeanAbsoluteError,
}

impl Scoring {
    /// The error of a prediction against the truth (lower is better).
    pub fn error(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        match self {
            Scoring::MeanAbsoluteError => {
                let n = y_true.len().max(1) as f64;
                y_true
                    .iter()
                    .zip(y_pred.iter())
                    .map(|(t, p)| (t - p).abs())
                    .sum::<f64>()
                    / n
            }
        }
    }
}

/// Factory building a fresh pipeline for one hyperparameter assignment.
///
/// The search loop calls this for every candidate (and every fold), so any
/// data-dependent resolution — such as fetching a stacking ensemble's
/// delegate models from the registry — happens anew per candidate and can
/// never leak state from a previous assignment.
pub type PipelineFactory = Box<dyn Fn(&ParamSet) -> Result<Pipeline> + Send + Sync>;

/// Declarative model specification.
pub struct ModelSpec {
    /// Identifier used to build output file paths; unique per experiment family.
    pub name: String,
    /// Builds the pipeline to evaluate for a given parameter assignment.
    pub build: PipelineFactory,
    /// If set, the grid to search; otherwise the pipeline is fit as built.
    pub params: Option<ParamGrid>,
    /// The metric used for selection and reporting.
    pub scoring: Scoring,
}

impl ModelSpec {
    /// Create a model specification with no parameter grid.
    pub fn new(name: impl Into<String>, build: PipelineFactory) -> Self {
        Self {
            name: name.into(),
            build,
            params: None,
            scoring: Scoring::default(),
        }
    }

    /// Attach a parameter grid to search.
    pub fn with_params(mut self, params: ParamGrid) -> Self {
        self.params = Some(params);
        self
    }
}

/// The shared contract of all experiment runners.
pub trait Experiment {
    /// Run the experiment, populating predictions and fold scores.
    fn run(&mut self) -> Result<()>;

    /// Persist predictions (and fold scores, if any) to CSV.
    ///
    /// Fails with [`crate::CyclecastError::NoResults`] when called before a
    /// completed `run()`.
    fn save(&self) -> Result<()>;

    /// The predictions table, once run.
    fn data(&self) -> Option<&DataFrame>;

    /// The fold-score table, once run (absent when no cross-validator was
    /// configured).
    fn scores(&self) -> Option<&DataFrame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_cartesian_product() {
        let grid = ParamGrid::new()
            .with(
                "alpha",
                vec![ParamValue::Float(0.1), ParamValue::Float(1.0)],
            )
            .with("fit_bias", vec![ParamValue::Bool(true), ParamValue::Bool(false)]);

        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].float("alpha"), Some(0.1));
        assert_eq!(candidates[3].float("alpha"), Some(1.0));
    }

    #[test]
    fn test_empty_grid_single_candidate() {
        let grid = ParamGrid::new();
        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], ParamSet::default());
    }

    #[test]
    fn test_param_set_display() {
        let mut set = ParamSet::default();
        set.insert("alpha", ParamValue::Float(0.5));
        set.insert(
            "models",
            ParamValue::StrList(vec!["full".to_string(), "short".to_string()]),
        );
        assert_eq!(set.to_string(), "{alpha: 0.5, models: [full, short]}");
    }

    #[test]
    fn test_mae_scoring() {
        let y_true = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let y_pred = Array1::from_vec(vec![2.0, 2.0, 1.0]);
        let err = Scoring::MeanAbsoluteError.error(&y_true, &y_pred);
        assert!((err - 1.0).abs() < 1e-12);
    }
}
