//! Hypothesis tests for per-fold score comparison
//!
//! Implements the paired t-test, the Friedman rank test with tie
//! correction, and the Nemenyi post-hoc over average ranks. The studentized
//! range distribution needed by Nemenyi (infinite degrees of freedom) is
//! integrated numerically.

use crate::error::{CyclecastError, Result};
use ndarray::Array2;
use statrs::distribution::{ChiSquared, Continuous, ContinuousCDF, Normal, StudentsT};

/// Two-sided paired t-test on matched score vectors.
///
/// Returns `(statistic, p_value)`. Identical vectors are a degenerate case
/// with zero variance of differences; they resolve to `(0.0, 1.0)` rather
/// than a 0/0 statistic. A constant non-zero difference resolves to
/// `(±inf, 0.0)`.
pub fn paired_ttest(a: &[f64], b: &[f64]) -> Result<(f64, f64)> {
    if a.len() != b.len() {
        return Err(CyclecastError::ValidationError(format!(
            "paired samples differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let n = a.len();
    if n < 2 {
        return Err(CyclecastError::ValidationError(
            "paired t-test needs at least 2 observations".to_string(),
        ));
    }

    let diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
    let mean = diffs.iter().sum::<f64>() / n as f64;
    let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1) as f64;

    if var == 0.0 {
        return Ok(if mean == 0.0 {
            (0.0, 1.0)
        } else {
            (mean.signum() * f64::INFINITY, 0.0)
        });
    }

    let t = mean / (var / n as f64).sqrt();
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map_err(|e| CyclecastError::ComputationError(e.to_string()))?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    Ok((t, p))
}

/// Friedman rank test over `n` blocks of `k` matched treatments.
///
/// `data[i][j]` is the score of treatment `j` in block `i`. Returns
/// `(statistic, p_value)` with the tie-corrected chi-squared statistic.
/// Fully tied data has an undefined statistic; it resolves to `(0.0, 1.0)`.
pub fn friedman_test(data: &[Vec<f64>]) -> Result<(f64, f64)> {
    let n = data.len();
    if n < 2 {
        return Err(CyclecastError::ValidationError(
            "Friedman test needs at least 2 blocks".to_string(),
        ));
    }
    let k = data[0].len();
    if k < 3 {
        return Err(CyclecastError::ValidationError(
            "Friedman test needs at least 3 treatments".to_string(),
        ));
    }
    if data.iter().any(|row| row.len() != k) {
        return Err(CyclecastError::ValidationError(
            "Friedman blocks differ in length".to_string(),
        ));
    }

    let mut rank_sums = vec![0.0; k];
    let mut tie_term = 0.0;
    for row in data {
        let (ranks, ties) = average_ranks(row);
        for (j, r) in ranks.iter().enumerate() {
            rank_sums[j] += r;
        }
        tie_term += ties;
    }

    let nf = n as f64;
    let kf = k as f64;
    let correction = 1.0 - tie_term / (nf * kf * (kf * kf - 1.0));
    if correction == 0.0 {
        // Every block fully tied.
        return Ok((0.0, 1.0));
    }

    let ssbn: f64 = rank_sums.iter().map(|s| s * s).sum();
    let statistic =
        (12.0 / (nf * kf * (kf + 1.0)) * ssbn - 3.0 * nf * (kf + 1.0)) / correction;

    let dist = ChiSquared::new(kf - 1.0)
        .map_err(|e| CyclecastError::ComputationError(e.to_string()))?;
    let p = 1.0 - dist.cdf(statistic.max(0.0));
    Ok((statistic, p))
}

/// Nemenyi post-hoc following a Friedman test.
///
/// Returns the symmetric `k x k` matrix of pairwise p-values over the
/// treatments' average ranks; the diagonal is `1.0`.
pub fn nemenyi_posthoc(data: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n = data.len();
    if n == 0 {
        return Err(CyclecastError::ValidationError(
            "Nemenyi post-hoc needs at least 1 block".to_string(),
        ));
    }
    let k = data[0].len();
    if k < 2 {
        return Err(CyclecastError::ValidationError(
            "Nemenyi post-hoc needs at least 2 treatments".to_string(),
        ));
    }

    let mut mean_ranks = vec![0.0; k];
    for row in data {
        let (ranks, _) = average_ranks(row);
        for (j, r) in ranks.iter().enumerate() {
            mean_ranks[j] += r / n as f64;
        }
    }

    let scale = (k as f64 * (k as f64 + 1.0) / (6.0 * n as f64)).sqrt();
    let mut p_values = Array2::from_elem((k, k), 1.0);
    for i in 0..k {
        for j in (i + 1)..k {
            let q = (mean_ranks[i] - mean_ranks[j]).abs() / scale;
            let p = 1.0 - studentized_range_cdf(q * std::f64::consts::SQRT_2, k)?;
            p_values[[i, j]] = p;
            p_values[[j, i]] = p;
        }
    }
    Ok(p_values)
}

/// CDF of the studentized range distribution with `k` samples and infinite
/// degrees of freedom, by Simpson quadrature of
/// `k * integral phi(u) * (Phi(u) - Phi(u - q))^(k-1) du`.
pub fn studentized_range_cdf(q: f64, k: usize) -> Result<f64> {
    if q <= 0.0 {
        return Ok(0.0);
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| CyclecastError::ComputationError(e.to_string()))?;

    // The integrand decays like the normal pdf; [-8, 8] captures it to well
    // below the quadrature error.
    let (lo, hi) = (-8.0_f64, 8.0_f64);
    let steps = 2000;
    let h = (hi - lo) / steps as f64;

    let f = |u: f64| normal.pdf(u) * (normal.cdf(u) - normal.cdf(u - q)).powi(k as i32 - 1);

    let mut acc = f(lo) + f(hi);
    for s in 1..steps {
        let u = lo + s as f64 * h;
        acc += if s % 2 == 1 { 4.0 * f(u) } else { 2.0 * f(u) };
    }
    let integral = acc * h / 3.0;
    Ok((k as f64 * integral).clamp(0.0, 1.0))
}

/// Within-row average ranks (1-based, ties averaged) and the row's
/// `sum(t^3 - t)` tie term.
fn average_ranks(row: &[f64]) -> (Vec<f64>, f64) {
    let k = row.len();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| row[a].total_cmp(&row[b]));

    let mut ranks = vec![0.0; k];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < k {
        let mut end = start + 1;
        while end < k && row[order[end]] == row[order[start]] {
            end += 1;
        }
        let tied = (end - start) as f64;
        let avg_rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        tie_term += tied * tied * tied - tied;
        start = end;
    }
    (ranks, tie_term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_ttest_known_value() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 2.0, 4.0, 4.0, 7.0];
        let (t, p) = paired_ttest(&a, &b).unwrap();
        assert!((t - (-2.1380899352993947)).abs() < 1e-9);
        assert!((p - 0.0993).abs() < 1e-3);
    }

    #[test]
    fn test_paired_ttest_identical_vectors() {
        let a = [1.5, 2.5, 3.5];
        let (t, p) = paired_ttest(&a, &a).unwrap();
        assert_eq!(t, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_paired_ttest_constant_shift() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 3.0, 4.0];
        let (t, p) = paired_ttest(&a, &b).unwrap();
        assert!(t.is_infinite() && t < 0.0);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn test_paired_ttest_length_mismatch() {
        assert!(paired_ttest(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_friedman_known_value() {
        let data = vec![
            vec![1.0, 2.0, 3.0],
            vec![2.0, 3.0, 4.0],
            vec![3.0, 4.0, 5.0],
        ];
        let (stat, p) = friedman_test(&data).unwrap();
        assert!((stat - 6.0).abs() < 1e-9);
        assert!((p - 0.049787).abs() < 1e-5);
        assert!(p < 0.05);
    }

    #[test]
    fn test_friedman_fully_tied() {
        let data = vec![vec![1.0, 1.0, 1.0], vec![2.0, 2.0, 2.0]];
        let (stat, p) = friedman_test(&data).unwrap();
        assert_eq!(stat, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_studentized_range_critical_value() {
        // The 5% critical value for k = 2, infinite df is 2.772.
        let f = studentized_range_cdf(2.772, 2).unwrap();
        assert!((f - 0.95).abs() < 1e-3);
    }

    #[test]
    fn test_nemenyi_separates_distinct_treatments() {
        // Treatment 2 always ranks worst; 0 and 1 alternate.
        let data = vec![
            vec![1.0, 2.0, 10.0],
            vec![2.0, 1.0, 10.0],
            vec![1.0, 2.0, 10.0],
            vec![2.0, 1.0, 10.0],
            vec![1.0, 2.0, 10.0],
            vec![2.0, 1.0, 10.0],
        ];
        let p = nemenyi_posthoc(&data).unwrap();
        assert_eq!(p[[0, 0]], 1.0);
        assert!((p[[0, 1]] - p[[1, 0]]).abs() < 1e-15);
        // The consistently-worst treatment is far from the alternating pair.
        assert!(p[[0, 2]] < p[[0, 1]]);
        assert!(p[[0, 2]] < 0.05);
    }

    #[test]
    fn test_average_ranks_with_ties() {
        let (ranks, tie_term) = average_ranks(&[1.0, 1.0, 3.0]);
        assert_eq!(ranks, vec![1.5, 1.5, 3.0]);
        assert_eq!(tie_term, 6.0); // 2^3 - 2
    }
}
