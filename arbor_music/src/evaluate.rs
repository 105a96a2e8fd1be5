// Goodness of fit between a training sequence and generated output.
//
// Both sequences are first restricted to their shared states: observed
// states that never occur in the expected sequence are dropped, then
// expected states that do not occur in what is left of the observed one.
// The per-state counts of the two sequences form a 2 x k contingency table
// (k shared states, sorted), and a Pearson chi-square test of homogeneity
// is run on it, with Yates' continuity correction when there is a single
// degree of freedom.
//
// The critical value is the 95% quantile of the chi-square distribution:
// tabulated for up to 30 degrees of freedom, Wilson-Hilferty beyond that.
// `reject` means the generated distribution differs significantly from the
// training distribution.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Chi-square 95% quantiles for 1..=30 degrees of freedom.
const CRITICAL_95: [f64; 30] = [
    3.8415, 5.9915, 7.8147, 9.4877, 11.0705, 12.5916, 14.0671, 15.5073, 16.9190, 18.3070,
    19.6751, 21.0261, 22.3620, 23.6848, 24.9958, 26.2962, 27.5871, 28.8693, 30.1435, 31.4104,
    32.6706, 33.9244, 35.1725, 36.4150, 37.6525, 38.8851, 40.1133, 41.3371, 42.5570, 43.7730,
];

/// Standard normal 95% quantile.
const Z_95: f64 = 1.644_853_6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiSquareReport {
    /// Number of shared states compared.
    pub categories: usize,
    pub statistic: f64,
    pub dof: usize,
    pub critical: f64,
    /// True when `statistic >= critical`.
    pub reject: bool,
}

/// Compare the state frequencies of `observed` against `expected`.
/// `None` if fewer than two states are shared.
pub fn chi_square<S: Ord>(expected: &[S], observed: &[S]) -> Option<ChiSquareReport> {
    let expected_set: BTreeSet<&S> = expected.iter().collect();
    let mut observed_counts: BTreeMap<&S, u64> = BTreeMap::new();
    for s in observed.iter().filter(|s| expected_set.contains(s)) {
        *observed_counts.entry(s).or_insert(0) += 1;
    }
    let mut expected_counts: BTreeMap<&S, u64> = BTreeMap::new();
    for s in expected.iter().filter(|s| observed_counts.contains_key(s)) {
        *expected_counts.entry(s).or_insert(0) += 1;
    }

    let categories = observed_counts.len();
    if categories < 2 {
        return None;
    }
    let rows = [
        expected_counts.values().copied().collect::<Vec<u64>>(),
        observed_counts.values().copied().collect::<Vec<u64>>(),
    ];
    let dof = categories - 1;
    let statistic = contingency_statistic(&rows, dof == 1);
    let critical = critical_value(dof);
    Some(ChiSquareReport {
        categories,
        statistic,
        dof,
        critical,
        reject: statistic >= critical,
    })
}

fn contingency_statistic(rows: &[Vec<u64>; 2], yates: bool) -> f64 {
    let row_totals: Vec<f64> = rows.iter().map(|r| r.iter().sum::<u64>() as f64).collect();
    let total: f64 = row_totals.iter().sum();
    let mut statistic = 0.0;
    for j in 0..rows[0].len() {
        let column = (rows[0][j] + rows[1][j]) as f64;
        for (row, row_total) in rows.iter().zip(&row_totals) {
            let expected = row_total * column / total;
            let mut diff = (row[j] as f64 - expected).abs();
            if yates {
                diff -= diff.min(0.5);
            }
            statistic += diff * diff / expected;
        }
    }
    statistic
}

/// 95% quantile of chi-square with `dof` degrees of freedom.
pub fn critical_value(dof: usize) -> f64 {
    match dof {
        0 => 0.0,
        1..=30 => CRITICAL_95[dof - 1],
        _ => {
            let k = dof as f64;
            let h = 2.0 / (9.0 * k);
            k * (1.0 - h + Z_95 * h.sqrt()).powi(3)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat(counts: &[(&'static str, usize)]) -> Vec<&'static str> {
        counts
            .iter()
            .flat_map(|&(s, n)| std::iter::repeat_n(s, n))
            .collect()
    }

    #[test]
    fn test_three_categories() {
        let expected = repeat(&[("a", 3), ("b", 2), ("c", 1)]);
        // "z" never occurs in the expected sequence and is dropped.
        let observed = repeat(&[("c", 3), ("z", 4), ("b", 2), ("a", 1)]);
        let report = chi_square(&expected, &observed).unwrap();
        assert_eq!(report.categories, 3);
        assert_eq!(report.dof, 2);
        assert!((report.statistic - 2.0).abs() < 1e-9);
        assert!((report.critical - 5.9915).abs() < 1e-9);
        assert!(!report.reject);
    }

    #[test]
    fn test_yates_correction_for_one_dof() {
        let expected = repeat(&[("a", 5), ("b", 3)]);
        let observed = repeat(&[("a", 2), ("b", 6)]);
        let report = chi_square(&expected, &observed).unwrap();
        assert_eq!(report.dof, 1);
        assert!((report.statistic - 64.0 / 63.0).abs() < 1e-9);
        assert!(!report.reject);
    }

    #[test]
    fn test_expected_restricted_to_observed() {
        // "c" occurs only in the expected sequence, so it is not compared.
        let expected = repeat(&[("a", 10), ("b", 10), ("c", 50)]);
        let observed = repeat(&[("a", 10), ("b", 10)]);
        let report = chi_square(&expected, &observed).unwrap();
        assert_eq!(report.categories, 2);
        assert!(report.statistic.abs() < 1e-12);
    }

    #[test]
    fn test_identical_distributions_not_rejected() {
        let seq = repeat(&[("a", 10), ("b", 10), ("c", 10)]);
        let report = chi_square(&seq, &seq).unwrap();
        assert_eq!(report.statistic, 0.0);
        assert!(!report.reject);
    }

    #[test]
    fn test_different_distributions_rejected() {
        let expected = repeat(&[("a", 20), ("b", 1), ("c", 1)]);
        let observed = repeat(&[("a", 1), ("b", 20), ("c", 1)]);
        let report = chi_square(&expected, &observed).unwrap();
        assert!((report.statistic - 34.380_952_380_952).abs() < 1e-6);
        assert!(report.reject);
    }

    #[test]
    fn test_too_few_shared_states() {
        assert!(chi_square(&["a", "a", "b"], &["a", "z"]).is_none());
        assert!(chi_square::<&str>(&[], &[]).is_none());
    }

    #[test]
    fn test_critical_value() {
        assert!((critical_value(1) - 3.8415).abs() < 1e-9);
        // Wilson-Hilferty at 40 dof vs the exact 55.7585.
        assert!((critical_value(40) - 55.7585).abs() < 0.01);
        assert!(critical_value(31) > critical_value(30));
    }
}
