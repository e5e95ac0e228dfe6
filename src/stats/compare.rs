//! Experiment comparison engine
//!
//! Loads the per-fold score tables saved by completed experiments and runs
//! the pairwise and omnibus tests over them, writing the verdict tables as
//! CSV next to the other results. Experiments are addressed by
//! `(task, experiment)` pairs so comparisons can mix tasks freely.

use crate::error::{CyclecastError, Result};
use crate::stats::hypothesis::{friedman_test, nemenyi_posthoc, paired_ttest};
use polars::prelude::*;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

/// Threshold below which a p-value is reported as significant.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// A saved experiment addressed by `(task, experiment)` labels.
pub type ExperimentRef<'a> = (&'a str, &'a str);

/// Pairwise and omnibus comparison over saved experiment scores.
pub struct ComparisonEngine {
    experiments_root: PathBuf,
    results_path: PathBuf,
}

impl ComparisonEngine {
    /// Create an engine reading experiment outputs under `experiments_root`
    /// and writing verdict tables under `results_path`.
    pub fn new(experiments_root: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            experiments_root: experiments_root.into(),
            results_path: results_path.into(),
        }
    }

    /// Mean and sample variance of an experiment's fold scores.
    pub fn mean_score(&self, task: &str, experiment: &str) -> Result<(f64, f64)> {
        let scores = self.score_vector((task, experiment))?;
        let n = scores.len();
        if n < 2 {
            return Err(CyclecastError::ValidationError(format!(
                "{experiment}: need at least 2 fold scores, got {n}"
            )));
        }
        let mean = scores.iter().sum::<f64>() / n as f64;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Ok((mean, var))
    }

    /// Paired t-test between two experiments over all matched folds.
    ///
    /// The experiments may come from different tasks as long as their fold
    /// structures match.
    pub fn paired_test(&self, a: ExperimentRef, b: ExperimentRef) -> Result<(f64, f64)> {
        let sa = self.score_vector(a)?;
        let sb = self.score_vector(b)?;
        paired_ttest(&sa, &sb)
    }

    /// Per-station paired t-tests between two experiments.
    ///
    /// Returns `(station, statistic, p_value)` per station, pairing the
    /// stations' fold scores split by split.
    pub fn paired_test_stations(
        &self,
        a: ExperimentRef,
        b: ExperimentRef,
    ) -> Result<Vec<(i64, f64, f64)>> {
        let da = self.load_scores(a)?;
        let db = self.load_scores(b)?;

        let mut results = Vec::new();
        for station in station_ids(&da)? {
            let sa = station_scores(&da, station)?;
            let sb = station_scores(&db, station)?;
            let (t, p) = paired_ttest(&sa, &sb)?;
            results.push((station, t, p));
        }
        Ok(results)
    }

    /// Pairwise comparison of experiments over pooled fold scores.
    ///
    /// Writes `test_results_<tag>.csv` and returns the verdict table. The
    /// `model` column names the experiment with the lower error where the
    /// statistic distinguishes them.
    pub fn compare(&self, tag: &str, entries: &[ExperimentRef]) -> Result<DataFrame> {
        let mut model1 = Vec::new();
        let mut model2 = Vec::new();
        let mut statistic = Vec::new();
        let mut pvalue = Vec::new();
        let mut winner = Vec::new();
        let mut significant = Vec::new();

        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (t, p) = self.paired_test(entries[i], entries[j])?;
                model1.push(entries[i].1);
                model2.push(entries[j].1);
                statistic.push(t);
                pvalue.push(p);
                winner.push(if t < 0.0 { entries[i].1 } else { entries[j].1 });
                significant.push(p < SIGNIFICANCE_LEVEL);
            }
        }

        let table = df!(
            "model1" => model1,
            "model2" => model2,
            "statistic" => statistic,
            "pvalue" => pvalue,
            "model" => winner,
            "significant" => significant,
        )?;
        self.write_results(&format!("test_results_{tag}.csv"), &table)?;
        Ok(table)
    }

    /// Per-station pairwise comparison, one verdict row per station and pair.
    ///
    /// Statistics and p-values are rounded to three decimals in the written
    /// table.
    pub fn compare_stations(&self, tag: &str, entries: &[ExperimentRef]) -> Result<DataFrame> {
        let mut model1 = Vec::new();
        let mut model2 = Vec::new();
        let mut station_col = Vec::new();
        let mut statistic = Vec::new();
        let mut pvalue = Vec::new();
        let mut winner: Vec<&str> = Vec::new();
        let mut significant = Vec::new();

        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                for (station, t, p) in self.paired_test_stations(entries[i], entries[j])? {
                    model1.push(entries[i].1);
                    model2.push(entries[j].1);
                    station_col.push(station);
                    statistic.push(round3(t));
                    pvalue.push(round3(p));
                    winner.push(if t < 0.0 { entries[i].1 } else { entries[j].1 });
                    significant.push(p < SIGNIFICANCE_LEVEL);
                }
            }
        }

        let table = df!(
            "model1" => model1,
            "model2" => model2,
            "station" => station_col,
            "statistic" => statistic,
            "pvalue" => pvalue,
            "model" => winner,
            "significant" => significant,
        )?;
        self.write_results(&format!("test_results_{tag}.csv"), &table)?;
        Ok(table)
    }

    /// Friedman omnibus test, with a Nemenyi post-hoc written only when the
    /// omnibus rejects at [`SIGNIFICANCE_LEVEL`].
    ///
    /// The post-hoc table carries the Nemenyi p-value per pair together
    /// with the pair's paired-t statistic. Returns the Friedman
    /// `(statistic, p_value)`.
    pub fn friedman_with_posthoc(
        &self,
        name: &str,
        entries: &[ExperimentRef],
    ) -> Result<(f64, f64)> {
        let blocks = self.score_blocks(entries)?;
        let (statistic, p) = friedman_test(&blocks)?;
        info!(name, statistic, p_value = p, "Friedman omnibus");

        if p >= SIGNIFICANCE_LEVEL {
            return Ok((statistic, p));
        }

        let p_matrix = nemenyi_posthoc(&blocks)?;
        let column = |idx: usize| -> Vec<f64> { blocks.iter().map(|row| row[idx]).collect() };

        let mut model1 = Vec::new();
        let mut model2 = Vec::new();
        let mut stat_col = Vec::new();
        let mut pvalue = Vec::new();
        let mut significant = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (t, _) = paired_ttest(&column(i), &column(j))?;
                model1.push(entries[i].1);
                model2.push(entries[j].1);
                stat_col.push(t);
                pvalue.push(p_matrix[[i, j]]);
                significant.push(p_matrix[[i, j]] < SIGNIFICANCE_LEVEL);
            }
        }

        let table = df!(
            "model1" => model1,
            "model2" => model2,
            "statistic" => stat_col,
            "pvalue" => pvalue,
            "significant" => significant,
        )?;
        self.write_results(&format!("test_results_posthoc_{name}.csv"), &table)?;
        Ok((statistic, p))
    }

    /// Matched score blocks: one row per fold (and station, where present),
    /// one column per experiment.
    fn score_blocks(&self, entries: &[ExperimentRef]) -> Result<Vec<Vec<f64>>> {
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(entries.len());
        for entry in entries {
            columns.push(self.score_vector(*entry)?);
        }

        let n = columns[0].len();
        if columns.iter().any(|c| c.len() != n) {
            return Err(CyclecastError::ValidationError(
                "experiments have differing fold counts; scores cannot be matched".to_string(),
            ));
        }

        Ok((0..n)
            .map(|b| columns.iter().map(|c| c[b]).collect())
            .collect())
    }

    /// An experiment's fold scores in canonical (station, split) order.
    fn score_vector(&self, entry: ExperimentRef) -> Result<Vec<f64>> {
        let df = self.load_scores(entry)?;
        let sort_by: Vec<&str> = if df.get_column_names_str().contains(&"station") {
            vec!["station", "split"]
        } else {
            vec!["split"]
        };
        let sorted = df.sort(sort_by, SortMultipleOptions::default())?;
        let scores = sorted.column("score")?.cast(&DataType::Float64)?;
        Ok(scores.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    fn load_scores(&self, (task, experiment): ExperimentRef) -> Result<DataFrame> {
        let path = self
            .experiments_root
            .join(task)
            .join(experiment)
            .join(format!("{experiment}_cv.csv"));
        let file = File::open(&path)
            .map_err(|e| CyclecastError::DataError(format!("{}: {}", path.display(), e)))?;

        Ok(CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(file)
            .finish()?)
    }

    fn write_results(&self, name: &str, table: &DataFrame) -> Result<()> {
        std::fs::create_dir_all(&self.results_path)?;
        let path = self.results_path.join(name);
        let file = File::create(&path)?;
        CsvWriter::new(file)
            .include_header(true)
            .finish(&mut table.clone())?;
        info!(file = %path.display(), "verdicts written");
        Ok(())
    }
}

fn station_ids(df: &DataFrame) -> Result<Vec<i64>> {
    let stations = df.column("station")?.cast(&DataType::Int64)?;
    let mut ids: Vec<i64> = stations.i64()?.into_no_null_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn station_scores(df: &DataFrame, station: i64) -> Result<Vec<f64>> {
    let col = df.column("station")?.cast(&DataType::Int64)?;
    let mask = col.i64()?.equal(station);
    let filtered = df
        .filter(&mask)?
        .sort(["split"], SortMultipleOptions::default())?;
    let scores = filtered.column("score")?.cast(&DataType::Float64)?;
    Ok(scores.f64()?.into_no_null_iter().collect())
}

fn round3(v: f64) -> f64 {
    if v.is_finite() {
        (v * 1000.0).round() / 1000.0
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::path::Path;

    fn write_cv(root: &Path, task: &str, experiment: &str, rows: &[(i64, f64)]) {
        let dir = root.join(task).join(experiment);
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = File::create(dir.join(format!("{experiment}_cv.csv"))).unwrap();
        writeln!(file, "split,score").unwrap();
        for (split, score) in rows {
            writeln!(file, "{split},{score}").unwrap();
        }
    }

    fn read_results(path: &Path) -> DataFrame {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .unwrap()
            .finish()
            .unwrap()
    }

    #[test]
    fn test_identical_scores_are_not_significant() {
        let root = tempfile::tempdir().unwrap();
        let rows = [(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0), (4, 5.0)];
        write_cv(root.path(), "task", "a", &rows);
        write_cv(root.path(), "task", "b", &rows);

        let engine = ComparisonEngine::new(root.path(), root.path().join("results"));
        let table = engine.compare("ab", &[("task", "a"), ("task", "b")]).unwrap();

        let p = table.column("pvalue").unwrap().f64().unwrap().get(0).unwrap();
        assert_eq!(p, 1.0);
        let sig = table.column("significant").unwrap().bool().unwrap().get(0).unwrap();
        assert!(!sig);

        // A zero statistic is not a model1 win.
        let winner = table.column("model").unwrap().str().unwrap().get(0).unwrap();
        assert_eq!(winner, "b");
    }

    #[test]
    fn test_winner_is_lower_error_model() {
        let root = tempfile::tempdir().unwrap();
        write_cv(
            root.path(),
            "task",
            "good",
            &[(0, 1.0), (1, 1.1), (2, 0.9), (3, 1.0), (4, 1.05)],
        );
        write_cv(
            root.path(),
            "task",
            "bad",
            &[(0, 3.0), (1, 3.2), (2, 2.9), (3, 3.1), (4, 3.0)],
        );

        let engine = ComparisonEngine::new(root.path(), root.path().join("results"));
        let table = engine
            .compare("gb", &[("task", "bad"), ("task", "good")])
            .unwrap();

        let winner = table.column("model").unwrap().str().unwrap().get(0).unwrap();
        assert_eq!(winner, "good");
        let sig = table.column("significant").unwrap().bool().unwrap().get(0).unwrap();
        assert!(sig);
        assert!(root
            .path()
            .join("results")
            .join("test_results_gb.csv")
            .exists());
    }

    #[test]
    fn test_cross_task_pairing() {
        let root = tempfile::tempdir().unwrap();
        write_cv(
            root.path(),
            "task_1b",
            "pooled",
            &[(0, 1.0), (1, 1.2), (2, 0.8), (3, 1.1), (4, 0.9)],
        );
        write_cv(
            root.path(),
            "task_2",
            "stacking",
            &[(0, 2.0), (1, 2.3), (2, 1.9), (3, 2.1), (4, 2.2)],
        );

        let engine = ComparisonEngine::new(root.path(), root.path().join("results"));
        let (t, p) = engine
            .paired_test(("task_1b", "pooled"), ("task_2", "stacking"))
            .unwrap();
        assert!(t < 0.0);
        assert!(p < SIGNIFICANCE_LEVEL);

        let table = engine
            .compare("mixed", &[("task_1b", "pooled"), ("task_2", "stacking")])
            .unwrap();
        let winner = table.column("model").unwrap().str().unwrap().get(0).unwrap();
        assert_eq!(winner, "pooled");
    }

    #[test]
    fn test_mean_score() {
        let root = tempfile::tempdir().unwrap();
        write_cv(root.path(), "task", "a", &[(0, 1.0), (1, 2.0), (2, 3.0)]);

        let engine = ComparisonEngine::new(root.path(), root.path().join("results"));
        let (mean, var) = engine.mean_score("task", "a").unwrap();
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_posthoc_written_only_on_rejection() {
        let root = tempfile::tempdir().unwrap();
        // Three experiments with a strict, consistent ordering across folds.
        let folds: Vec<i64> = (0..8).collect();
        let a: Vec<(i64, f64)> = folds.iter().map(|&s| (s, 1.0 + s as f64 * 0.01)).collect();
        let b: Vec<(i64, f64)> = folds.iter().map(|&s| (s, 2.0 + s as f64 * 0.01)).collect();
        let c: Vec<(i64, f64)> = folds.iter().map(|&s| (s, 3.0 + s as f64 * 0.01)).collect();
        write_cv(root.path(), "task", "a", &a);
        write_cv(root.path(), "task", "b", &b);
        write_cv(root.path(), "task", "c", &c);

        let results = root.path().join("results");
        let engine = ComparisonEngine::new(root.path(), &results);
        let entries = [("task", "a"), ("task", "b"), ("task", "c")];
        let (_, p) = engine.friedman_with_posthoc("abc", &entries).unwrap();
        assert!(p < SIGNIFICANCE_LEVEL);
        assert!(results.join("test_results_posthoc_abc.csv").exists());

        // Fully tied scores: omnibus cannot reject, no post-hoc file.
        write_cv(root.path(), "tied", "a", &a);
        write_cv(root.path(), "tied", "b", &a);
        write_cv(root.path(), "tied", "c", &a);
        let tied = [("tied", "a"), ("tied", "b"), ("tied", "c")];
        let (_, p) = engine.friedman_with_posthoc("tied", &tied).unwrap();
        assert!(p >= SIGNIFICANCE_LEVEL);
        assert!(!results.join("test_results_posthoc_tied.csv").exists());
    }

    #[test]
    fn test_posthoc_statistic_is_the_paired_t() {
        let root = tempfile::tempdir().unwrap();
        // Differences vary fold to fold, so the paired t stays finite.
        let a = [(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0), (4, 5.0), (5, 6.0), (6, 7.0), (7, 8.0)];
        let b = [(0, 2.0), (1, 2.5), (2, 4.0), (3, 4.5), (4, 6.0), (5, 6.5), (6, 8.0), (7, 8.5)];
        let c = [(0, 11.0), (1, 12.0), (2, 13.0), (3, 14.5), (4, 15.0), (5, 16.5), (6, 17.0), (7, 18.0)];
        write_cv(root.path(), "task", "a", &a);
        write_cv(root.path(), "task", "b", &b);
        write_cv(root.path(), "task", "c", &c);

        let results = root.path().join("results");
        let engine = ComparisonEngine::new(root.path(), &results);
        let entries = [("task", "a"), ("task", "b"), ("task", "c")];
        let (_, p) = engine.friedman_with_posthoc("abt", &entries).unwrap();
        assert!(p < SIGNIFICANCE_LEVEL);

        let table = read_results(&results.join("test_results_posthoc_abt.csv"));
        let stat = table
            .column("statistic")
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        let (expected, _) = engine.paired_test(("task", "a"), ("task", "b")).unwrap();
        assert!(expected.is_finite());
        assert!((stat - expected).abs() < 1e-9);
    }
}
