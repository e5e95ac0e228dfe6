//! Statistical comparison of experiment results

pub mod compare;
pub mod hypothesis;

pub use compare::{ComparisonEngine, ExperimentRef, SIGNIFICANCE_LEVEL};
pub use hypothesis::{friedman_test, nemenyi_posthoc, paired_ttest, studentized_range_cdf};
