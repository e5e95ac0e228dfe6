//! Data loading for per-station and pooled experiments

use crate::data::schema::{STATION, STATION_MAX, STATION_MIN};
use crate::error::{CyclecastError, Result};
use polars::prelude::*;
use std::fs::File;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Source of per-station train/test tables.
///
/// Experiments depend on this trait rather than on concrete files, so tests
/// can run against in-memory frames.
pub trait StationSource {
    /// Training data for a single station.
    fn train(&self, station_id: u32) -> Result<DataFrame>;

    /// Test data for a single station.
    fn test(&self, station_id: u32) -> Result<DataFrame>;
}

/// Source of train/test tables pooled across all stations.
pub trait PooledSource {
    /// Training data pooled across the station band.
    fn train(&self) -> Result<DataFrame>;

    /// Test data for all stations.
    fn test(&self) -> Result<DataFrame>;
}

/// CSV-backed data loader.
///
/// Expects `train/station_<id>_deploy.csv` per station and a shared
/// `test.csv` under the data directory. Missing values are encoded as `NA`.
pub struct CsvDataLoader {
    data_dir: PathBuf,
    stations: RangeInclusive<u32>,
}

impl CsvDataLoader {
    /// Create a loader rooted at the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            stations: STATION_MIN..=STATION_MAX,
        }
    }

    /// Override the station band used for pooled training data.
    pub fn with_stations(mut self, stations: RangeInclusive<u32>) -> Self {
        self.stations = stations;
        self
    }

    fn read_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            CyclecastError::DataError(format!("{}: {}", path.display(), e))
        })?;

        let parse_opts = CsvParseOptions::default()
            .with_null_values(Some(NullValues::AllColumnsSingle("NA".into())));

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?;

        Ok(df)
    }

    fn read_test(&self) -> Result<DataFrame> {
        self.read_csv(&self.data_dir.join("test.csv"))
    }

    fn station_train_path(&self, station_id: u32) -> PathBuf {
        self.data_dir
            .join("train")
            .join(format!("station_{station_id}_deploy.csv"))
    }
}

impl StationSource for CsvDataLoader {
    fn train(&self, station_id: u32) -> Result<DataFrame> {
        self.read_csv(&self.station_train_path(station_id))
    }

    fn test(&self, station_id: u32) -> Result<DataFrame> {
        let df = self.read_test()?;
        let stations = df.column(STATION)?.cast(&DataType::Int64)?;
        let mask = stations.i64()?.equal(station_id as i64);
        Ok(df.filter(&mask)?)
    }
}

impl PooledSource for CsvDataLoader {
    fn train(&self) -> Result<DataFrame> {
        let mut combined: Option<DataFrame> = None;
        for station_id in self.stations.clone() {
            let df = StationSource::train(self, station_id)?;
            combined = Some(match combined {
                None => df,
                Some(acc) => acc.vstack(&df)?,
            });
        }
        combined.ok_or_else(|| {
            CyclecastError::ConfigError("empty station band for pooled training data".to_string())
        })
    }

    fn test(&self) -> Result<DataFrame> {
        self.read_test()
    }
}
