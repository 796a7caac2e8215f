//! Correlation-based feature reduction

use faer::Mat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::matrix::Feature;

/// Represents a correlated pair of features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub feature1: String,
    pub feature2: String,
    pub correlation: f64,
}

/// Correlation matrix of the given features.
///
/// Algorithm:
/// 1. Standardize each column: Z = (X - mean) / (std * sqrt(n))
/// 2. R = Z^T * Z
///
/// Constant columns get a zero column in Z, so their correlation with every
/// other column reads as 0.
pub fn correlation_matrix(features: &[Feature]) -> Mat<f64> {
    let n_cols = features.len();
    let n_rows = features.first().map_or(0, |f| f.values.len());
    if n_rows == 0 {
        return Mat::zeros(n_cols, n_cols);
    }

    let standardized: Vec<Vec<f64>> = features
        .par_iter()
        .map(|f| {
            let n = f.values.len() as f64;
            let mean = f.values.iter().sum::<f64>() / n;
            let ss: f64 = f.values.iter().map(|v| (v - mean) * (v - mean)).sum();
            if ss <= 0.0 {
                return vec![0.0; f.values.len()];
            }
            let scale = ss.sqrt();
            f.values.iter().map(|v| (v - mean) / scale).collect()
        })
        .collect();

    let mut z = Mat::<f64>::zeros(n_rows, n_cols);
    for (j, col) in standardized.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            z[(i, j)] = v;
        }
    }

    z.transpose() * &z
}

/// Greedy selection in feature order: a feature is dropped when it correlates
/// above the threshold with any feature already kept.
///
/// # Returns
/// Indices of kept features, and for each dropped feature the pair that
/// caused the drop (`feature1` dropped, `feature2` the kept partner with the
/// strongest correlation).
pub fn select_uncorrelated(features: &[Feature], threshold: f64) -> (Vec<usize>, Vec<CorrelatedPair>) {
    let corr = correlation_matrix(features);
    let mut kept: Vec<usize> = Vec::new();
    let mut dropped = Vec::new();

    for j in 0..features.len() {
        let partner = kept
            .iter()
            .map(|&k| (k, corr[(j, k)]))
            .filter(|(_, r)| r.abs() > threshold && !r.is_nan())
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));

        match partner {
            Some((k, r)) => dropped.push(CorrelatedPair {
                feature1: features[j].name.clone(),
                feature2: features[k].name.clone(),
                correlation: r,
            }),
            None => kept.push(j),
        }
    }

    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> Vec<Feature> {
        vec![
            Feature::new("a", "a", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            Feature::new("b", "b", vec![2.1, 3.9, 6.2, 8.0, 9.9]),
            Feature::new("c", "c", vec![5.0, 1.0, 4.0, 2.0, 3.0]),
            Feature::new("d", "d", vec![-1.0, -2.0, -3.0, -4.0, -5.0]),
        ]
    }

    #[test]
    fn test_matrix_known_values() {
        let f = features();
        let corr = correlation_matrix(&f);
        for i in 0..f.len() {
            assert!((corr[(i, i)] - 1.0).abs() < 1e-12);
            for j in 0..f.len() {
                assert!((corr[(i, j)] - corr[(j, i)]).abs() < 1e-12);
            }
        }
        // a and d are exact mirrors
        assert!((corr[(0, 3)] + 1.0).abs() < 1e-12);
        // deviations (-2,-1,0,1,2) and (2,-2,1,-1,0): -3 / 10
        assert!((corr[(0, 2)] + 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_has_no_correlation() {
        let f = vec![
            Feature::new("k", "k", vec![1.0, 1.0, 1.0]),
            Feature::new("x", "x", vec![1.0, 2.0, 3.0]),
        ];
        let corr = correlation_matrix(&f);
        assert_eq!(corr[(0, 1)], 0.0);
        assert_eq!(corr[(0, 0)], 0.0);
    }

    #[test]
    fn test_greedy_keeps_first_of_each_group() {
        let (kept, dropped) = select_uncorrelated(&features(), 0.9);
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped[0].feature1, "b");
        assert_eq!(dropped[0].feature2, "a");
        assert_eq!(dropped[1].feature1, "d");
        assert!(dropped[1].correlation < 0.0);
    }
}
