//! Cyclecast - bicycle-sharing demand prediction experiments
//!
//! An experimentation harness for short-horizon bike-availability
//! forecasting: per-station, pooled and stacked model experiments with
//! chronological cross-validation, hyperparameter search, per-fold score
//! persistence and statistical comparison of the results.
//!
//! # Modules
//!
//! - [`data`] - CSV loading, schema constants, pre-trained model registry
//! - [`pipeline`] - transform/regressor pipeline over a named feature matrix
//! - [`models`] - baseline, ridge, frozen linear and stacking regressors
//! - [`experiment`] - cross-validation, search, and the experiment runners
//! - [`stats`] - paired t, Friedman and Nemenyi comparison of saved scores
//! - [`cli`] - argument parsing and logging setup

pub mod cli;
pub mod data;
pub mod error;
pub mod experiment;
pub mod models;
pub mod pipeline;
pub mod stats;

pub use error::{CyclecastError, Result};

/// Common imports for downstream code.
pub mod prelude {
    pub use crate::data::{CsvDataLoader, ModelRegistry, PooledSource, StationSource};
    pub use crate::error::{CyclecastError, Result};
    pub use crate::experiment::{
        CrossValidator, CvStrategy, Experiment, ModelSpec, ParamGrid, ParamSet, ParamValue,
        PerStationExperiment, PooledExperiment, ProcessingSpec, Scoring, SearchStrategy,
        StackedExperiment,
    };
    pub use crate::models::{
        BaselineRegressor, PretrainedLinear, RidgeRegressor, StackedRegressor,
    };
    pub use crate::pipeline::{FeatureMatrix, Pipeline, Regressor, Transform, VarianceThreshold};
    pub use crate::stats::{ComparisonEngine, SIGNIFICANCE_LEVEL};
}
