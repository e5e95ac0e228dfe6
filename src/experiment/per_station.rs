//! Per-station experiment runner
//!
//! Fits one independent model per station and concatenates the per-station
//! submissions and fold scores. Stations stay fully isolated: nothing fit on
//! one station's data is reused for another.

use crate::data::schema::{STATION_MAX, STATION_MIN};
use crate::data::StationSource;
use crate::error::{CyclecastError, Result};
use crate::experiment::engine::ExperimentCore;
use crate::experiment::Experiment;
use polars::prelude::*;
use std::ops::RangeInclusive;
use tracing::info;

/// Runs one model per station over a station band.
pub struct PerStationExperiment<S: StationSource> {
    core: ExperimentCore,
    source: S,
    stations: RangeInclusive<u32>,
    data: Option<DataFrame>,
    scores: Option<DataFrame>,
}

impl<S: StationSource> PerStationExperiment<S> {
    /// Create a runner over the default station band.
    pub fn new(core: ExperimentCore, source: S) -> Self {
        Self::with_stations(core, source, STATION_MIN..=STATION_MAX)
    }

    /// Create a runner over an explicit station band.
    pub fn with_stations(
        core: ExperimentCore,
        source: S,
        stations: RangeInclusive<u32>,
    ) -> Self {
        Self {
            core,
            source,
            stations,
            data: None,
            scores: None,
        }
    }
}

impl<S: StationSource> Experiment for PerStationExperiment<S> {
    fn run(&mut self) -> Result<()> {
        let mut submissions: Option<DataFrame> = None;
        let mut scores: Option<DataFrame> = None;
        let mut best_errors = Vec::new();

        for station_id in self.stations.clone() {
            let raw = self.source.train(station_id)?;
            let train = self.core.processing().pre(&raw)?;
            let test = self.source.test(station_id)?;

            let outcome = self.core.run_split(&train, &test)?;
            info!(
                experiment = self.core.name(),
                station = station_id,
                best_error = outcome.best_error,
                "station complete"
            );
            best_errors.push(outcome.best_error);

            submissions = Some(match submissions {
                Some(acc) => acc.vstack(&outcome.submission)?,
                None => outcome.submission,
            });

            if let Some(mut fold_scores) = outcome.fold_scores {
                let station_col = vec![station_id as i64; fold_scores.height()];
                fold_scores.with_column(Column::new("station".into(), station_col))?;
                let tagged = fold_scores.select(["station", "split", "score"])?;
                scores = Some(match scores {
                    Some(acc) => acc.vstack(&tagged)?,
                    None => tagged,
                });
            }
        }

        if !best_errors.is_empty() {
            let mean = best_errors.iter().sum::<f64>() / best_errors.len() as f64;
            info!(
                experiment = self.core.name(),
                stations = best_errors.len(),
                mean_best_error = mean,
                "all stations complete"
            );
        }

        self.data = submissions;
        self.scores = scores;
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
