//! Shared experiment core
//!
//! [`ExperimentCore`] owns the pieces every experiment granularity shares:
//! the processing specification, the model specification, the optional
//! cross-validator and the search strategy. Runners hand it one train/test
//! split at a time and collect the outcomes; `save` writes the accumulated
//! tables as CSV.

use crate::data::schema::ID;
use crate::error::{CyclecastError, Result};
use crate::experiment::cv::CrossValidator;
use crate::experiment::processing::ProcessingSpec;
use crate::experiment::search::{run_search, SearchStrategy};
use crate::experiment::{ModelSpec, ParamSet};
use crate::pipeline::FeatureMatrix;
use ndarray::{Array1, Axis};
use polars::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

/// The outcome of one train/test split.
pub struct SplitOutcome {
    /// The formatted submission table for this split.
    pub submission: DataFrame,
    /// The selected candidate's mean cross-validated error.
    pub best_error: f64,
    /// Per-fold errors as a `split`/`score` table, absent when no
    /// cross-validator was configured.
    pub fold_scores: Option<DataFrame>,
}

/// The shared fit-or-search core.
pub struct ExperimentCore {
    output_path: PathBuf,
    processing: ProcessingSpec,
    model: ModelSpec,
    cv: Option<CrossValidator>,
    search: SearchStrategy,
}

impl ExperimentCore {
    /// Create a core writing its outputs under `output_path`.
    pub fn new(output_path: impl Into<PathBuf>, processing: ProcessingSpec, model: ModelSpec) -> Self {
        Self {
            output_path: output_path.into(),
            processing,
            model,
            cv: None,
            search: SearchStrategy::default(),
        }
    }

    /// Attach a cross-validator.
    pub fn with_cv(mut self, cv: CrossValidator) -> Self {
        self.cv = Some(cv);
        self
    }

    /// Select the hyperparameter search strategy.
    pub fn with_search(mut self, search: SearchStrategy) -> Self {
        self.search = search;
        self
    }

    /// The experiment name (the model specification's name).
    pub fn name(&self) -> &str {
        &self.model.name
    }

    /// The processing specification.
    pub fn processing(&self) -> &ProcessingSpec {
        &self.processing
    }

    /// Run one train/test split end to end.
    ///
    /// `train` must already be pre-processed; `test` is the raw covariate
    /// table whose row order the submission preserves.
    pub fn run_split(&self, train: &DataFrame, test: &DataFrame) -> Result<SplitOutcome> {
        let (x_df, y) = self.processing.split_target(train)?;
        let x = FeatureMatrix::from_frame(&x_df, &[ID])?;
        let x_test = FeatureMatrix::from_frame(test, &[ID])?;

        let (pipeline, best_error, fold_errors) = match (&self.model.params, &self.cv) {
            (Some(_), Some(cv)) => {
                let mut transcript = self.open_transcript()?;
                let outcome =
                    run_search(self.search, &self.model, cv, &x, &y, &mut transcript)?;
                info!(
                    experiment = self.name(),
                    best_params = %outcome.best_params,
                    best_error = outcome.best_error,
                    n_candidates = outcome.n_candidates,
                    "search complete"
                );
                (outcome.pipeline, outcome.best_error, Some(outcome.fold_errors))
            }
            _ => {
                let mut pipeline = (self.model.build)(&ParamSet::default())?;
                pipeline.fit(&x, &y)?;

                let fold_errors = match &self.cv {
                    Some(cv) => Some(self.cross_validate(cv, &x, &y)?),
                    None => None,
                };
                let best_error = match &fold_errors {
                    Some(errors) => errors.iter().sum::<f64>() / errors.len().max(1) as f64,
                    None => {
                        let y_fit = pipeline.predict(&x)?;
                        self.model.scoring.error(&y, &y_fit)
                    }
                };
                (pipeline, best_error, fold_errors)
            }
        };

        self.write_diagnostics(&pipeline);

        let y_raw = pipeline.predict(&x_test)?;
        let post = self.processing.post(test)?;
        let y_final = post(&y_raw);
        let submission = self.processing.submit(test, &y_final)?;

        let fold_scores = match fold_errors {
            Some(errors) => {
                let splits: Vec<i64> = (0..errors.len() as i64).collect();
                Some(df!("split" => splits, "score" => errors)?)
            }
            None => None,
        };

        Ok(SplitOutcome {
            submission,
            best_error,
            fold_scores,
        })
    }

    /// Persist the accumulated tables.
    ///
    /// Predictions are sorted by `Id` and written to
    /// `<name>_submission.csv`; fold scores, when present, to
    /// `<name>_cv.csv`.
    pub fn save(&self, data: &DataFrame, scores: Option<&DataFrame>) -> Result<()> {
        std::fs::create_dir_all(&self.output_path)?;

        let sorted = data.sort([ID_SUBMISSION], SortMultipleOptions::default())?;
        self.write_csv(&format!("{}_submission.csv", self.name()), &sorted)?;

        if let Some(scores) = scores {
            self.write_csv(&format!("{}_cv.csv", self.name()), scores)?;
        }

        info!(
            experiment = self.name(),
            path = %self.output_path.display(),
            "results saved"
        );
        Ok(())
    }

    /// Cross-validate the default-built pipeline, one fresh fit per fold.
    fn cross_validate(
        &self,
        cv: &CrossValidator,
        x: &FeatureMatrix,
        y: &Array1<f64>,
    ) -> Result<Vec<f64>> {
        let splits = cv.split(x.n_rows())?;
        if splits.is_empty() {
            return Err(CyclecastError::ValidationError(format!(
                "not enough samples ({}) for cross-validation",
                x.n_rows()
            )));
        }

        let mut fold_errors = Vec::with_capacity(splits.len());
        for split in &splits {
            let mut pipeline = (self.model.build)(&ParamSet::default())?;
            let x_train = x.take_rows(&split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            pipeline.fit(&x_train, &y_train)?;

            let x_test = x.take_rows(&split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);
            let y_pred = pipeline.predict(&x_test)?;
            fold_errors.push(self.model.scoring.error(&y_test, &y_pred));
        }
        Ok(fold_errors)
    }

    /// Open the search transcript in append mode so every split of a
    /// multi-split run lands in one file.
    fn open_transcript(&self) -> Result<BufWriter<File>> {
        std::fs::create_dir_all(&self.output_path)?;
        let path = self.output_path.join(format!("{}_cv.log", self.name()));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    /// Write per-transform diagnostics tables. Best-effort: a failed write
    /// is logged, never fatal.
    fn write_diagnostics(&self, pipeline: &crate::pipeline::Pipeline) {
        for report in pipeline.reports() {
            let name = format!("{}_{}.csv", self.name(), report.name);
            let mut table = report.table;
            if let Err(e) = std::fs::create_dir_all(&self.output_path)
                .map_err(CyclecastError::from)
                .and_then(|_| {
                    let file = File::create(self.output_path.join(&name))?;
                    CsvWriter::new(file).include_header(true).finish(&mut table)?;
                    Ok(())
                })
            {
                warn!(experiment = self.name(), file = name, error = %e, "diagnostics write failed");
            }
        }
    }

    fn write_csv(&self, name: &str, df: &DataFrame) -> Result<()> {
        let file = File::create(self.output_path.join(name))?;
        CsvWriter::new(file)
            .include_header(true)
            .finish(&mut df.clone())?;
        Ok(())
    }
}

/// The submission table's identifier column.
const ID_SUBMISSION: &str = "Id";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ParamGrid, ParamValue};
    use crate::models::RidgeRegressor;
    use crate::pipeline::Pipeline;

    fn train_frame(n: usize) -> DataFrame {
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|v| 3.0 * v + 2.0).collect();
        df!("x" => xs, "bikes" => ys).unwrap()
    }

    fn test_frame() -> DataFrame {
        df!("id" => &[2i64, 1], "x" => &[10.0, 20.0]).unwrap()
    }

    fn ridge_model(name: &str) -> ModelSpec {
        ModelSpec::new(
            name,
            Box::new(|params: &ParamSet| {
                let alpha = params.float("alpha").unwrap_or(0.001);
                Ok(Pipeline::new(Box::new(RidgeRegressor::new(alpha))))
            }),
        )
    }

    #[test]
    fn test_run_split_with_search_produces_fold_scores() {
        let dir = tempfile::tempdir().unwrap();
        let model = ridge_model("ridge").with_params(
            ParamGrid::new().with(
                "alpha",
                vec![ParamValue::Float(0.001), ParamValue::Float(10.0)],
            ),
        );
        let core = ExperimentCore::new(dir.path(), ProcessingSpec::default(), model)
            .with_cv(CrossValidator::time_series(5));

        let outcome = core.run_split(&train_frame(60), &test_frame()).unwrap();

        let scores = outcome.fold_scores.expect("cv configured, scores expected");
        assert_eq!(scores.height(), 5);
        assert_eq!(scores.get_column_names_str(), vec!["split", "score"]);
        assert_eq!(outcome.submission.height(), 2);

        // The search transcript exists and names the winner.
        let log = std::fs::read_to_string(dir.path().join("ridge_cv.log")).unwrap();
        assert!(log.contains("best:"));
    }

    #[test]
    fn test_run_split_without_cv_has_no_fold_scores() {
        let dir = tempfile::tempdir().unwrap();
        let core = ExperimentCore::new(dir.path(), ProcessingSpec::default(), ridge_model("plain"));

        let outcome = core.run_split(&train_frame(30), &test_frame()).unwrap();
        assert!(outcome.fold_scores.is_none());
        assert!(outcome.best_error.is_finite());
    }

    #[test]
    fn test_save_sorts_submission_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let core = ExperimentCore::new(dir.path(), ProcessingSpec::default(), ridge_model("plain"));

        let data = df!("Id" => &[3i64, 1, 2], "bikes" => &[7.0, 5.0, 6.0]).unwrap();
        core.save(&data, None).unwrap();

        let text = std::fs::read_to_string(dir.path().join("plain_submission.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Id,bikes");
        assert!(lines[1].starts_with("1,"));
        assert!(lines[3].starts_with("3,"));
    }

    #[test]
    fn test_save_writes_cv_scores() {
        let dir = tempfile::tempdir().unwrap();
        let core = ExperimentCore::new(dir.path(), ProcessingSpec::default(), ridge_model("plain"));

        let data = df!("Id" => &[1i64], "bikes" => &[5.0]).unwrap();
        let scores = df!("split" => &[0i64, 1], "score" => &[1.5, 2.5]).unwrap();
        core.save(&data, Some(&scores)).unwrap();

        assert!(dir.path().join("plain_cv.csv").exists());
    }
}
