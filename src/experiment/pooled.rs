//! Pooled experiment runner
//!
//! Fits one model on the concatenated training data of every station and
//! predicts the full test set in a single pass.

use crate::data::PooledSource;
use crate::error::{CyclecastError, Result};
use crate::experiment::engine::ExperimentCore;
use crate::experiment::Experiment;
use polars::prelude::*;
use tracing::info;

/// Runs one model over the pooled training data of all stations.
pub struct PooledExperiment<S: PooledSource> {
    core: ExperimentCore,
    source: S,
    data: Option<DataFrame>,
    scores: Option<DataFrame>,
}

impl<S: PooledSource> PooledExperiment<S> {
    pub fn new(core: ExperimentCore, source: S) -> Self {
        Self {
            core,
            source,
            data: None,
            scores: None,
        }
    }

    /// The shared core, for wrappers that delegate to this runner.
    pub fn core(&self) -> &ExperimentCore {
        &self.core
    }

    /// Rebuild the runner with a reconfigured core.
    pub fn map_core(self, f: impl FnOnce(ExperimentCore) -> ExperimentCore) -> Self {
        Self {
            core: f(self.core),
            source: self.source,
            data: self.data,
            scores: self.scores,
        }
    }
}

impl<S: PooledSource> Experiment for PooledExperiment<S> {
    fn run(&mut self) -> Result<()> {
        let raw = self.source.train()?;
        let train = self.core.processing().pre(&raw)?;
        let test = self.source.test()?;

        let outcome = self.core.run_split(&train, &test)?;
        info!(
            experiment = self.core.name(),
            best_error = outcome.best_error,
            "pooled run complete"
        );

        self.data = Some(outcome.submission);
        self.scores = outcome.fold_scores;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let data = self.data.as_ref().ok_or(CyclecastError::NoResults)?;
        self.core.save(data, self.scores.as_ref())
    }

    fn data(&self) -> Option<&DataFrame> {
        self.data.as_ref()
    }

    fn scores(&self) -> Option<&DataFrame> {
        self.scores.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::cv::CrossValidator;
    use crate::experiment::processing::ProcessingSpec;
    use crate::experiment::{ModelSpec, ParamGrid, ParamSet, ParamValue};
    use crate::models::RidgeRegressor;
    use crate::pipeline::Pipeline;

    struct SyntheticSource;

    impl PooledSource for SyntheticSource {
        fn train(&self) -> Result<DataFrame> {
            let n = 60;
            let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let ys: Vec<f64> = xs.iter().map(|v| 2.0 * v).collect();
            Ok(df!("x" => xs, "bikes" => ys)?)
        }

        fn test(&self) -> Result<DataFrame> {
            Ok(df!("id" => &[1i64, 2, 3], "x" => &[5.0, 6.0, 7.0])?)
        }
    }

    #[test]
    fn test_pooled_run_searches_once() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelSpec::new(
            "ridge_pooled",
            Box::new(|params: &ParamSet| {
                let alpha = params.float("alpha").unwrap_or(1.0);
                Ok(Pipeline::new(Box::new(RidgeRegressor::new(alpha))))
            }),
        )
        .with_params(ParamGrid::new().with(
            "alpha",
            vec![ParamValue::Float(0.001), ParamValue::Float(10.0)],
        ));
        let core = ExperimentCore::new(dir.path(), ProcessingSpec::default(), model)
            .with_cv(CrossValidator::time_series(5));

        let mut experiment = PooledExperiment::new(core, SyntheticSource);
        experiment.run().unwrap();

        assert_eq!(experiment.data().unwrap().height(), 3);
        assert_eq!(experiment.scores().unwrap().height(), 5);

        experiment.save().unwrap();
        assert!(dir.path().join("ridge_pooled_submission.csv").exists());
        assert!(dir.path().join("ridge_pooled_cv.csv").exists());
    }

    #[test]
    fn test_save_before_run_is_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelSpec::new(
            "ridge_pooled",
            Box::new(|_: &ParamSet| Ok(Pipeline::new(Box::new(RidgeRegressor::new(1.0))))),
        );
        let core = ExperimentCore::new(dir.path(), ProcessingSpec::default(), model);
        let experiment = PooledExperiment::new(core, SyntheticSource);
        assert!(matches!(experiment.save(), Err(CyclecastError::NoResults)));
    }
}
