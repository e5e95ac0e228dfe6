//! Registry of pre-trained per-station linear models
//!
//! The stacking experiments compose frozen robust-linear-model fits that were
//! produced offline, one coefficient CSV per station and model family. The
//! registry resolves family names to ready-to-predict [`PretrainedLinear`]
//! estimators; it never refits anything.

use crate::error::{CyclecastError, Result};
use crate::models::PretrainedLinear;
use polars::prelude::*;
use std::fs::File;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// The model families available per station.
pub const MODEL_FAMILIES: [&str; 6] = [
    "full",
    "full_temp",
    "short",
    "short_full",
    "short_full_temp",
    "short_temp",
];

/// The intercept row label in the coefficient CSVs.
const INTERCEPT: &str = "(Intercept)";

/// Maps coefficient-table feature labels to data-set column names.
fn column_for(label: &str) -> &str {
    match label {
        "full_profile_3h_diff_bikes" => "bikes_3h_diff_avg_full",
        "short_profile_3h_diff_bikes" => "bikes_3h_diff_avg_short",
        "full_profile_bikes" => "bikes_avg_full",
        "short_profile_bikes" => "bikes_avg_short",
        "temperature.C" => "temperature",
        other => other,
    }
}

/// Resolver of pre-trained per-station linear models.
pub struct ModelRegistry {
    models_dir: PathBuf,
    stations: RangeInclusive<u32>,
}

impl ModelRegistry {
    /// Create a registry rooted at the directory holding the coefficient CSVs.
    pub fn new(models_dir: impl Into<PathBuf>, stations: RangeInclusive<u32>) -> Self {
        Self {
            models_dir: models_dir.into(),
            stations,
        }
    }

    /// Resolve one station's estimator for a single model family.
    pub fn station_estimator(&self, station_id: u32, family: &str) -> Result<PretrainedLinear> {
        if !MODEL_FAMILIES.contains(&family) {
            return Err(CyclecastError::ConfigError(format!(
                "unknown model family: {family}"
            )));
        }

        let path = self
            .models_dir
            .join(format!("model_station_{station_id}_rlm_{family}.csv"));
        let table = read_coefficients(&path)?;

        let mut intercept = None;
        let mut weights = Vec::new();
        for (label, weight) in table {
            if label == INTERCEPT {
                intercept = Some(weight);
            } else {
                weights.push((column_for(&label).to_string(), weight));
            }
        }

        let intercept = intercept.ok_or_else(|| {
            CyclecastError::DataError(format!("{}: missing intercept row", path.display()))
        })?;

        Ok(PretrainedLinear::new(
            format!("{family}_{station_id}"),
            intercept,
            weights,
        ))
    }

    /// Resolve one station's estimators for the given families.
    pub fn station_estimators(
        &self,
        station_id: u32,
        families: &[String],
    ) -> Result<Vec<PretrainedLinear>> {
        families
            .iter()
            .map(|family| self.station_estimator(station_id, family))
            .collect()
    }

    /// Resolve the given families for every station in the registry's band.
    pub fn estimators(&self, families: &[String]) -> Result<Vec<PretrainedLinear>> {
        let mut all = Vec::new();
        for station_id in self.stations.clone() {
            all.extend(self.station_estimators(station_id, families)?);
        }
        Ok(all)
    }
}

/// Read a `feature,weight` coefficient CSV.
fn read_coefficients(path: &Path) -> Result<Vec<(String, f64)>> {
    let file = File::open(path)
        .map_err(|e| CyclecastError::DataError(format!("{}: {}", path.display(), e)))?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(file)
        .finish()?;

    let features = df.column("feature")?.str()?;
    let weights = df.column("weight")?.cast(&DataType::Float64)?;
    let weights = weights.f64()?;

    features
        .into_iter()
        .zip(weights)
        .map(|(label, weight)| match (label, weight) {
            (Some(label), Some(weight)) => Ok((label.to_string(), weight)),
            _ => Err(CyclecastError::DataError(format!(
                "{}: null coefficient row",
                path.display()
            ))),
        })
        .collect()
}
