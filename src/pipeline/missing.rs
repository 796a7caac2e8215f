//! Missing value analysis and reduction

use super::dataset::Table;

/// Analyze missing values in the table.
///
/// Returns `(column, missing_ratio)` pairs sorted by ratio descending; ties
/// keep table order.
pub fn analyze_missing_values(table: &Table) -> Vec<(String, f64)> {
    // Handle empty table
    if table.height() == 0 {
        return Vec::new();
    }

    let rows = table.height() as f64;
    let mut missing_ratios: Vec<(String, f64)> = table
        .iter()
        .map(|(name, data)| (name.to_string(), data.null_count() as f64 / rows))
        .collect();

    // Sort by missing ratio descending
    missing_ratios.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    missing_ratios
}

/// Get features to drop based on missing value threshold.
///
/// A column is dropped only when its ratio is strictly above the threshold.
/// Protected columns (target, identifiers) are never dropped.
pub fn get_features_above_threshold(
    missing_ratios: &[(String, f64)],
    threshold: f64,
    protected: &[&str],
) -> Vec<String> {
    missing_ratios
        .iter()
        .filter(|(name, ratio)| *ratio > threshold && !protected.contains(&name.as_str()))
        .map(|(name, _)| name.clone())
        .collect()
}
