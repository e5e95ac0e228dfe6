//! Stacked-ensemble experiment runner
//!
//! A pooled experiment whose pipeline is a [`StackedRegressor`] over frozen
//! per-station models from the registry. The delegate subset is a search
//! hyperparameter (`models`), so the pipeline factory resolves the delegates
//! from the registry anew for every candidate.

use crate::data::{ModelRegistry, PooledSource, MODEL_FAMILIES};
use crate::error::{CyclecastError, Result};
use crate::experiment::engine::ExperimentCore;
use crate::experiment::pooled::PooledExperiment;
use crate::experiment::processing::ProcessingSpec;
use crate::experiment::{Experiment, ModelSpec, ParamGrid, ParamSet, ParamValue};
use crate::models::{RidgeRegressor, StackedRegressor};
use crate::pipeline::Pipeline;
use polars::prelude::DataFrame;
use std::path::Path;
use std::sync::Arc;

/// Default ridge penalty for the meta level.
const META_ALPHA: f64 = 1.0;

/// Pooled experiment over a stacking ensemble of registry models.
pub struct StackedExperiment<S: PooledSource> {
    inner: PooledExperiment<S>,
}

impl<S: PooledSource> StackedExperiment<S> {
    /// Create a stacking experiment searching over delegate subsets.
    ///
    /// `candidates` lists the delegate-family subsets to try; each becomes
    /// one value of the `models` grid axis.
    pub fn new(
        name: impl Into<String>,
        output_path: impl AsRef<Path>,
        source: S,
        registry: Arc<ModelRegistry>,
        candidates: Vec<Vec<String>>,
    ) -> Self {
        let grid = ParamGrid::new().with(
            "models",
            candidates
                .into_iter()
                .map(ParamValue::StrList)
                .collect(),
        );

        let model = ModelSpec::new(
            name,
            Box::new(move |params: &ParamSet| {
                let families: Vec<String> = params
                    .str_list("models")
                    .ok_or_else(|| {
                        CyclecastError::ConfigError(
                            "stacking candidate is missing the models parameter".to_string(),
                        )
                    })?
                    .to_vec();
                // Fresh delegates per candidate; nothing survives between
                // parameter assignments.
                let delegates = registry.estimators(&families)?;
                let ensemble =
                    StackedRegressor::new(delegates, RidgeRegressor::new(META_ALPHA));
                Ok(Pipeline::new(Box::new(ensemble)))
            }),
        )
        .with_params(grid);

        let core = ExperimentCore::new(output_path.as_ref(), ProcessingSpec::default(), model);
        Self {
            inner: PooledExperiment::new(core, source),
        }
    }

    /// Every delegate family known to the registry, as a single candidate.
    pub fn all_families() -> Vec<Vec<String>> {
        vec![MODEL_FAMILIES.iter().map(|s| s.to_string()).collect()]
    }

    /// Attach a cross-validator and search strategy via the inner core.
    pub fn configure(
        self,
        cv: crate::experiment::cv::CrossValidator,
        search: crate::experiment::search::SearchStrategy,
    ) -> Self {
        Self {
            inner: self
                .inner
                .map_core(|core| core.with_cv(cv).with_search(search)),
        }
    }
}

impl<S: PooledSource> Experiment for StackedExperiment<S> {
    fn run(&mut self) -> Result<()> {
        self.inner.run()
    }

    fn save(&self) -> Result<()> {
        self.inner.save()
    }

    fn data(&self) -> Option<&DataFrame> {
        self.inner.data()
    }

    fn scores(&self) -> Option<&DataFrame> {
        self.inner.scores()
    }
}
