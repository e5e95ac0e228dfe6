//! Cyclecast - experiment runner entry point

use clap::Parser;
use cyclecast::cli::{init_logging, Cli, LogConfig};
use cyclecast::data::schema::{STATION_MAX, STATION_MIN};
use cyclecast::data::{CsvDataLoader, ModelRegistry, MODEL_FAMILIES};
use cyclecast::experiment::{
    CrossValidator, Experiment, ExperimentCore, ModelSpec, ParamGrid, ParamSet, ParamValue,
    PerStationExperiment, PooledExperiment, ProcessingSpec, SearchStrategy, StackedExperiment,
};
use cyclecast::models::{BaselineRegressor, RidgeRegressor};
use cyclecast::pipeline::{Pipeline, VarianceThreshold};
use cyclecast::stats::ComparisonEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Ridge penalties searched by the regularised experiments.
const RIDGE_ALPHAS: [f64; 4] = [0.1, 1.0, 10.0, 100.0];

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_cli(&cli))?;

    let mut ran = 0;
    for (name, task) in [
        ("baseline", "task_1a"),
        ("ridge", "task_1a"),
        ("ridge_halving", "task_1a"),
        ("ridge_pooled", "task_1b"),
        ("stacking", "task_2"),
    ] {
        if !cli.selected(name) {
            continue;
        }
        info!(experiment = name, task, "running");
        run_experiment(&cli, name, task)?;
        ran += 1;
    }

    if cli.selected("compare") {
        run_comparisons(&cli)?;
        ran += 1;
    }

    if ran == 0 {
        anyhow::bail!("no known experiment selected: {:?}", cli.experiment);
    }
    Ok(())
}

fn run_experiment(cli: &Cli, name: &str, task: &str) -> anyhow::Result<()> {
    let output = cli.output_dir.join(task).join(name);
    let loader = CsvDataLoader::new(&cli.data_dir);

    match name {
        "baseline" => {
            let core = ExperimentCore::new(&output, ProcessingSpec::default(), baseline_spec())
                .with_cv(CrossValidator::time_series(5));
            run_and_save(PerStationExperiment::new(core, loader))
        }
        "ridge" => {
            let core = ExperimentCore::new(&output, ProcessingSpec::bikes_fraction(), ridge_spec("ridge"))
                .with_cv(CrossValidator::time_series(5));
            run_and_save(PerStationExperiment::new(core, loader))
        }
        "ridge_halving" => {
            let core = ExperimentCore::new(
                &output,
                ProcessingSpec::bikes_fraction(),
                ridge_spec("ridge_halving"),
            )
            .with_cv(CrossValidator::time_series(5))
            .with_search(SearchStrategy::Halving);
            run_and_save(PerStationExperiment::new(core, loader))
        }
        "ridge_pooled" => {
            let core = ExperimentCore::new(
                &output,
                ProcessingSpec::bikes_fraction(),
                ridge_spec("ridge_pooled"),
            )
            .with_cv(CrossValidator::time_series(5))
            .with_search(SearchStrategy::Halving);
            run_and_save(PooledExperiment::new(core, loader))
        }
        "stacking" => {
            let registry = Arc::new(ModelRegistry::new(
                &cli.models_dir,
                STATION_MIN..=STATION_MAX,
            ));
            let experiment = StackedExperiment::new(
                "stacking",
                &output,
                loader,
                registry,
                delegate_candidates(),
            )
            .configure(CrossValidator::time_series(5), SearchStrategy::Grid);
            run_and_save(experiment)
        }
        other => anyhow::bail!("unknown experiment: {other}"),
    }
}

fn baseline_spec() -> ModelSpec {
    ModelSpec::new(
        "baseline",
        Box::new(|_: &ParamSet| Ok(Pipeline::new(Box::new(BaselineRegressor::new())))),
    )
}

/// Variance-filtered ridge with a penalty grid.
fn ridge_spec(name: &str) -> ModelSpec {
    ModelSpec::new(
        name,
        Box::new(|params: &ParamSet| {
            let alpha = params.float("alpha").unwrap_or(1.0);
            Ok(Pipeline::new(Box::new(RidgeRegressor::new(alpha)))
                .with_step("variance", Box::new(VarianceThreshold::new(0.0))))
        }),
    )
    .with_params(ParamGrid::new().with(
        "alpha",
        RIDGE_ALPHAS.iter().copied().map(ParamValue::Float).collect(),
    ))
}

/// Delegate subsets tried by the stacking search: each family alone, plus
/// all families together.
fn delegate_candidates() -> Vec<Vec<String>> {
    let mut candidates: Vec<Vec<String>> = MODEL_FAMILIES
        .iter()
        .map(|family| vec![family.to_string()])
        .collect();
    candidates.push(MODEL_FAMILIES.iter().map(|s| s.to_string()).collect());
    candidates
}

fn run_and_save(mut experiment: impl Experiment) -> anyhow::Result<()> {
    experiment.run()?;
    experiment.save()?;
    Ok(())
}

/// Statistical comparison battery over previously saved scores.
fn run_comparisons(cli: &Cli) -> anyhow::Result<()> {
    let results = analysis_dir(&cli.output_dir);
    let engine = ComparisonEngine::new(&cli.output_dir, &results);

    let per_station = [
        ("task_1a", "baseline"),
        ("task_1a", "ridge"),
        ("task_1a", "ridge_halving"),
    ];
    engine.compare("task_1a", &per_station)?;
    engine.compare_stations("task_1a_stations", &per_station)?;
    let (statistic, p_value) = engine.friedman_with_posthoc("task_1a", &per_station)?;
    info!(statistic, p_value, "task_1a omnibus");

    // The pooled experiments share the 5-split layout, so they pair across
    // tasks.
    let pooled = [("task_1b", "ridge_pooled"), ("task_2", "stacking")];
    match engine.compare("pooled", &pooled) {
        Ok(_) => {}
        Err(e) => info!(error = %e, "pooled comparison skipped"),
    }

    for (task, experiment) in pooled {
        match engine.mean_score(task, experiment) {
            Ok((mean, var)) => info!(task, experiment, mean, var, "fold scores"),
            Err(e) => info!(task, experiment, error = %e, "scores unavailable, skipping"),
        }
    }
    Ok(())
}

fn analysis_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("analysis")
}
