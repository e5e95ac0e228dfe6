//! Hyperparameter search
//!
//! Two strategies share the same contract: build a fresh pipeline per
//! candidate through the model's factory, score it fold-by-fold under the
//! experiment's cross-validator, and return the winner refit on the full
//! training data together with its per-fold errors.

use crate::error::{CyclecastError, Result};
use crate::experiment::cv::CrossValidator;
use crate::experiment::{ModelSpec, ParamSet, Scoring};
use crate::pipeline::{FeatureMatrix, Pipeline};
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

/// Successive-halving culling factor.
const HALVING_FACTOR: usize = 3;

/// Hyperparameter search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Exhaustive evaluation of every candidate at full resources.
    #[default]
    Grid,
    /// Successive halving: all candidates start on a small chronological
    /// prefix of the training data; each rung keeps the best third and
    /// triples the prefix.
    Halving,
}

/// The result of a completed search.
pub struct SearchOutcome {
    /// The winning parameter assignment.
    pub best_params: ParamSet,
    /// The winner's mean cross-validated error (lower is better).
    pub best_error: f64,
    /// The winner's per-fold errors at full resources.
    pub fold_errors: Vec<f64>,
    /// The winning pipeline, refit on the full training data.
    pub pipeline: Pipeline,
    /// Number of candidates enumerated from the grid.
    pub n_candidates: usize,
}

/// Run the model's configured search over its parameter grid.
///
/// Candidate evaluations are appended to `transcript` as they happen so a
/// failed run still leaves a usable log.
pub fn run_search(
    strategy: SearchStrategy,
    spec: &ModelSpec,
    cv: &CrossValidator,
    x: &FeatureMatrix,
    y: &Array1<f64>,
    transcript: &mut dyn Write,
) -> Result<SearchOutcome> {
    let candidates = spec
        .params
        .as_ref()
        .map(|grid| grid.candidates())
        .unwrap_or_else(|| vec![ParamSet::default()]);

    match strategy {
        SearchStrategy::Grid => grid_search(spec, &candidates, cv, x, y, transcript),
        SearchStrategy::Halving => halving_search(spec, &candidates, cv, x, y, transcript),
    }
}

fn grid_search(
    spec: &ModelSpec,
    candidates: &[ParamSet],
    cv: &CrossValidator,
    x: &FeatureMatrix,
    y: &Array1<f64>,
    transcript: &mut dyn Write,
) -> Result<SearchOutcome> {
    writeln!(transcript, "grid search: {} candidates", candidates.len())?;

    let mut best: Option<(ParamSet, f64, Vec<f64>)> = None;
    for params in candidates {
        let fold_errors = evaluate_candidate(spec, params, cv, x, y)?;
        let mean_error = mean(&fold_errors);
        writeln!(transcript, "{params} -> {mean_error:.6}")?;
        debug!(candidate = %params, error = mean_error, "evaluated candidate");

        // Ties keep the earlier candidate.
        if best.as_ref().map_or(true, |(_, e, _)| mean_error < *e) {
            best = Some((params.clone(), mean_error, fold_errors));
        }
    }

    let (best_params, best_error, fold_errors) = best.ok_or_else(|| {
        CyclecastError::ValidationError("search produced no candidates".to_string())
    })?;
    writeln!(transcript, "best: {best_params} -> {best_error:.6}")?;

    let mut pipeline = (spec.build)(&best_params)?;
    pipeline.fit(x, y)?;

    Ok(SearchOutcome {
        best_params,
        best_error,
        fold_errors,
        pipeline,
        n_candidates: candidates.len(),
    })
}

fn halving_search(
    spec: &ModelSpec,
    candidates: &[ParamSet],
    cv: &CrossValidator,
    x: &FeatureMatrix,
    y: &Array1<f64>,
    transcript: &mut dyn Write,
) -> Result<SearchOutcome> {
    let n_samples = x.n_rows();
    let min_resources = cv.min_samples().max(1);
    if n_samples < min_resources {
        return Err(CyclecastError::ValidationError(format!(
            "halving search needs at least {min_resources} samples, got {n_samples}"
        )));
    }

    // Start small enough that every rung can triple the prefix before
    // hitting the full data.
    let n_rungs = rungs_for(candidates.len());
    let mut resources = (n_samples / HALVING_FACTOR.pow(n_rungs as u32)).max(min_resources);
    let mut survivors: Vec<ParamSet> = candidates.to_vec();

    writeln!(
        transcript,
        "halving search: {} candidates, {} rungs, starting at {} samples",
        candidates.len(),
        n_rungs,
        resources.min(n_samples)
    )?;

    while survivors.len() > 1 {
        let resource = resources.min(n_samples);
        let x_rung = x.head(resource);
        let y_rung = y.slice(ndarray::s![..resource]).to_owned();

        writeln!(
            transcript,
            "rung: {} candidates at {} samples",
            survivors.len(),
            resource
        )?;

        let mut scored: Vec<(usize, f64)> = Vec::with_capacity(survivors.len());
        for (idx, params) in survivors.iter().enumerate() {
            let fold_errors = evaluate_candidate(spec, params, cv, &x_rung, &y_rung)?;
            let mean_error = mean(&fold_errors);
            writeln!(transcript, "{params} -> {mean_error:.6}")?;
            scored.push((idx, mean_error));
        }

        // Stable by candidate order, so ties keep the earlier candidate.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        let keep = (survivors.len() + HALVING_FACTOR - 1) / HALVING_FACTOR;
        let mut kept_indices: Vec<usize> = scored[..keep].iter().map(|(i, _)| *i).collect();
        kept_indices.sort_unstable();
        survivors = kept_indices.into_iter().map(|i| survivors[i].clone()).collect();

        resources = resources.saturating_mul(HALVING_FACTOR);
    }

    let best_params = survivors.into_iter().next().ok_or_else(|| {
        CyclecastError::ValidationError("search produced no candidates".to_string())
    })?;

    // The winner's reported errors always come from a full-resource pass so
    // they are comparable with grid-search results.
    let fold_errors = evaluate_candidate(spec, &best_params, cv, x, y)?;
    let best_error = mean(&fold_errors);
    writeln!(transcript, "best: {best_params} -> {best_error:.6}")?;

    let mut pipeline = (spec.build)(&best_params)?;
    pipeline.fit(x, y)?;

    Ok(SearchOutcome {
        best_params,
        best_error,
        fold_errors,
        pipeline,
        n_candidates: candidates.len(),
    })
}

/// Number of culling rungs needed to reduce `n` candidates to one.
fn rungs_for(n: usize) -> usize {
    let mut rungs = 0;
    let mut remaining = n.max(1);
    while remaining > 1 {
        remaining = (remaining + HALVING_FACTOR - 1) / HALVING_FACTOR;
        rungs += 1;
    }
    rungs
}

/// Cross-validate one parameter assignment, building a fresh pipeline per
/// fold through the model's factory.
fn evaluate_candidate(
    spec: &ModelSpec,
    params: &ParamSet,
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
        let x_train = x.take_rows(&split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.take_rows(&split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut pipeline = (spec.build)(params)?;
        pipeline.fit(&x_train, &y_train)?;
        let y_pred = pipeline.predict(&x_test)?;
        fold_errors.push(score(spec.scoring, &y_test, &y_pred));
    }

    Ok(fold_errors)
}

fn score(scoring: Scoring, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    scoring.error(y_true, y_pred)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ParamGrid, ParamValue};
    use crate::models::RidgeRegressor;
    use polars::prelude::*;

    fn linear_data(n: usize) -> (FeatureMatrix, Array1<f64>) {
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|v| 2.0 * v + 1.0).collect();
        let df = df!("x" => xs).unwrap();
        let x = FeatureMatrix::from_frame(&df, &[]).unwrap();
        (x, Array1::from_vec(ys))
    }

    fn ridge_spec() -> ModelSpec {
        ModelSpec::new(
            "ridge",
            Box::new(|params: &ParamSet| {
                let alpha = params.float("alpha").unwrap_or(1.0);
                Ok(Pipeline::new(Box::new(RidgeRegressor::new(alpha))))
            }),
        )
        .with_params(
            ParamGrid::new().with(
                "alpha",
                vec![
                    ParamValue::Float(0.001),
                    ParamValue::Float(1.0),
                    ParamValue::Float(100.0),
                ],
            ),
        )
    }

    #[test]
    fn test_grid_search_picks_lowest_error() {
        let (x, y) = linear_data(60);
        let spec = ridge_spec();
        let cv = CrossValidator::time_series(5);

        let mut transcript = Vec::new();
        let outcome =
            run_search(SearchStrategy::Grid, &spec, &cv, &x, &y, &mut transcript).unwrap();

        // Weakest regularisation fits the exactly-linear data best.
        assert_eq!(outcome.best_params.float("alpha"), Some(0.001));
        assert_eq!(outcome.n_candidates, 3);
        assert_eq!(outcome.fold_errors.len(), 5);

        let log = String::from_utf8(transcript).unwrap();
        assert!(log.contains("grid search: 3 candidates"));
        assert!(log.contains("best:"));
    }

    #[test]
    fn test_grid_best_error_is_mean_of_fold_errors() {
        let (x, y) = linear_data(60);
        let spec = ridge_spec();
        let cv = CrossValidator::time_series(5);

        let mut transcript = Vec::new();
        let outcome =
            run_search(SearchStrategy::Grid, &spec, &cv, &x, &y, &mut transcript).unwrap();

        let mean_err =
            outcome.fold_errors.iter().sum::<f64>() / outcome.fold_errors.len() as f64;
        assert!((outcome.best_error - mean_err).abs() < 1e-12);
    }

    #[test]
    fn test_halving_search_converges_to_same_winner() {
        let (x, y) = linear_data(120);
        let spec = ridge_spec();
        let cv = CrossValidator::time_series(5);

        let mut transcript = Vec::new();
        let outcome =
            run_search(SearchStrategy::Halving, &spec, &cv, &x, &y, &mut transcript).unwrap();

        assert_eq!(outcome.best_params.float("alpha"), Some(0.001));
        // Fold errors come from a full-resource pass over the winner.
        assert_eq!(outcome.fold_errors.len(), 5);

        let log = String::from_utf8(transcript).unwrap();
        assert!(log.contains("halving search: 3 candidates"));
        assert!(log.contains("rung:"));
    }

    #[test]
    fn test_search_without_grid_evaluates_single_candidate() {
        let (x, y) = linear_data(30);
        let spec = ModelSpec::new(
            "ridge_fixed",
            Box::new(|_: &ParamSet| Ok(Pipeline::new(Box::new(RidgeRegressor::new(1.0))))),
        );
        let cv = CrossValidator::time_series(5);

        let mut transcript = Vec::new();
        let outcome =
            run_search(SearchStrategy::Grid, &spec, &cv, &x, &y, &mut transcript).unwrap();
        assert_eq!(outcome.n_candidates, 1);
        assert_eq!(outcome.best_params, ParamSet::default());
    }

    #[test]
    fn test_rungs_for() {
        assert_eq!(rungs_for(1), 0);
        assert_eq!(rungs_for(3), 1);
        assert_eq!(rungs_for(9), 2);
        assert_eq!(rungs_for(10), 3);
    }
}
