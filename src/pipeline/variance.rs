//! Near-zero variance detection

use std::collections::HashMap;

/// Why a column counts as near-zero variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Degenerate {
    Constant,
    Dominated {
        /// Count of the most common value over the second most common
        freq_ratio: f64,
        /// Distinct values as a percentage of rows
        unique_percent: f64,
    },
}

/// Frequency ratio and distinct-value percentage of a column.
pub fn frequency_profile(values: &[f64]) -> (f64, f64, usize) {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        // fold -0.0 into 0.0
        let key = if *v == 0.0 { 0f64.to_bits() } else { v.to_bits() };
        *counts.entry(key).or_insert(0) += 1;
    }
    let distinct = counts.len();

    let mut freqs: Vec<usize> = counts.into_values().collect();
    freqs.sort_unstable_by(|a, b| b.cmp(a));
    let ratio = match (freqs.first(), freqs.get(1)) {
        (Some(&top), Some(&second)) => top as f64 / second as f64,
        _ => f64::INFINITY,
    };
    let unique_percent = if values.is_empty() {
        0.0
    } else {
        100.0 * distinct as f64 / values.len() as f64
    };
    (ratio, unique_percent, distinct)
}

/// Classify a fit-set column.
///
/// A column is degenerate when it is constant, or when its frequency ratio
/// exceeds `freq_cut` and its distinct percentage is below `unique_cut`.
pub fn near_zero_variance(values: &[f64], freq_cut: f64, unique_cut: f64) -> Option<Degenerate> {
    let (freq_ratio, unique_percent, distinct) = frequency_profile(values);
    if distinct <= 1 {
        return Some(Degenerate::Constant);
    }
    if freq_ratio > freq_cut && unique_percent < unique_cut {
        return Some(Degenerate::Dominated {
            freq_ratio,
            unique_percent,
        });
    }
    None
}
