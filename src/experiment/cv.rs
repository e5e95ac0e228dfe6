//! Cross-validation splitting
//!
//! The experiments evaluate under a chronological time-series split; a
//! shuffled K-fold strategy is kept for non-temporal score estimation.

use crate::error::{CyclecastError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Cross-validation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CvStrategy {
    /// Chronological split: each fold trains on a growing prefix and
    /// validates on the next contiguous block. Never shuffles.
    TimeSeriesSplit { n_splits: usize },
    /// K-fold split, optionally shuffled.
    KFold { n_splits: usize, shuffle: bool },
}

impl Default for CvStrategy {
    fn default() -> Self {
        CvStrategy::TimeSeriesSplit { n_splits: 5 }
    }
}

/// A single train/validation split.
#[derive(Debug, Clone)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CvStrategy,
    random_state: Option<u64>,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::time_series(5)
    }
}

impl CrossValidator {
    /// Create a splitter with the given strategy.
    pub fn new(strategy: CvStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Chronological splitter with the given number of folds.
    pub fn time_series(n_splits: usize) -> Self {
        Self::new(CvStrategy::TimeSeriesSplit { n_splits })
    }

    /// Set the random state for reproducible shuffles.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// The smallest sample count that yields at least one fold.
    pub fn min_samples(&self) -> usize {
        match self.strategy {
            CvStrategy::TimeSeriesSplit { n_splits } => n_splits + 1,
            CvStrategy::KFold { n_splits, .. } => n_splits,
        }
    }

    /// Generate train/validation splits.
    ///
    /// Folds whose validation block would be empty are silently absent, so
    /// the returned length may be less than the configured fold count —
    /// callers must tolerate this.
    pub fn split(&self, n_samples: usize) -> Result<Vec<CvSplit>> {
        match self.strategy {
            CvStrategy::TimeSeriesSplit { n_splits } => {
                self.time_series_split(n_samples, n_splits)
            }
            CvStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, n_splits, shuffle)
            }
        }
    }

    fn time_series_split(&self, n_samples: usize, n_splits: usize) -> Result<Vec<CvSplit>> {
        if n_splits < 2 {
            return Err(CyclecastError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }

        let test_size = n_samples / (n_splits + 1);
        let mut splits = Vec::with_capacity(n_splits);

        for fold_idx in 0..n_splits {
            let test_start = (fold_idx + 1) * test_size;
            let test_end = std::cmp::min(test_start + test_size, n_samples);
            if test_size == 0 || test_start >= test_end {
                continue;
            }

            splits.push(CvSplit {
                train_indices: (0..test_start).collect(),
                test_indices: (test_start..test_end).collect(),
                fold_idx,
            });
        }

        Ok(splits)
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CvSplit>> {
        if n_splits < 2 {
            return Err(CyclecastError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(CyclecastError::ValidationError(format!(
                "n_samples ({n_samples}) must be >= n_splits ({n_splits})"
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices: Vec<usize> = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CvSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_series_split_is_chronological() {
        let cv = CrossValidator::time_series(5);
        let splits = cv.split(60).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            let max_train = *split.train_indices.iter().max().unwrap();
            let min_test = *split.test_indices.iter().min().unwrap();
            assert!(max_train < min_test, "training data must precede validation");
        }

        // Each subsequent fold trains on more data.
        for pair in splits.windows(2) {
            assert!(pair[1].train_indices.len() > pair[0].train_indices.len());
        }
    }

    #[test]
    fn test_time_series_split_too_few_samples() {
        let cv = CrossValidator::time_series(5);
        // 5 samples cannot fill 5 validation blocks; folds are absent, not an error.
        let splits = cv.split(5).unwrap();
        assert!(splits.is_empty());
    }

    #[test]
    fn test_k_fold_covers_all_indices() {
        let cv = CrossValidator::new(CvStrategy::KFold {
            n_splits: 5,
            shuffle: false,
        });
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 5);
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_shuffle_is_reproducible() {
        let cv = CrossValidator::new(CvStrategy::KFold {
            n_splits: 4,
            shuffle: true,
        })
        .with_random_state(42);

        let a = cv.split(40).unwrap();
        let b = cv.split(40).unwrap();
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.test_indices, sb.test_indices);
        }
    }

    #[test]
    fn test_min_samples() {
        assert_eq!(CrossValidator::time_series(5).min_samples(), 6);
        assert_eq!(
            CrossValidator::new(CvStrategy::KFold {
                n_splits: 3,
                shuffle: false
            })
            .min_samples(),
            3
        );
    }
}
