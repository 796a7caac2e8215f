//! Nearest-neighbour imputation for the deferred column
//!
//! The deferred column (lot frontage in the housing data) is filled after
//! encoding, from the mean of its nearest fit-set rows in standardized
//! predictor space.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::NeighborConfig;
use super::encoding::PendingColumn;
use super::error::{PipelineError, PipelineResult};
use super::matrix::Feature;
use super::stats::{mean, variance};

/// Frozen reference set for one deferred column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborState {
    pub column: String,
    pub k: usize,
    /// Encoded predictor features, in feature order
    pub predictors: Vec<String>,
    pub centers: Vec<f64>,
    pub scales: Vec<f64>,
    /// Standardized predictor rows of the fit-set rows where the column is present
    pub reference: Vec<Vec<f64>>,
    pub values: Vec<f64>,
}

fn column_values<'a>(
    column: &str,
    features: &'a [Feature],
    pending: Option<&'a PendingColumn>,
) -> PipelineResult<Vec<Option<f64>>> {
    if let Some(p) = pending.filter(|p| p.name == column) {
        return Ok(p.values.clone());
    }
    features
        .iter()
        .find(|f| f.name == column)
        .map(|f| f.values.iter().copied().map(Some).collect())
        .ok_or_else(|| {
            PipelineError::config(format!(
                "deferred column '{}' is not among the encoded features",
                column
            ))
        })
}

fn predictor_indices(features: &[Feature], state_predictors: &[String]) -> PipelineResult<Vec<usize>> {
    state_predictors
        .iter()
        .map(|name| {
            features.iter().position(|f| &f.name == name).ok_or_else(|| {
                PipelineError::config(format!("predictor feature '{}' is missing", name))
            })
        })
        .collect()
}

/// Build the reference set from the encoded fit set.
pub fn fit(
    features: &[Feature],
    pending: Option<&PendingColumn>,
    config: &NeighborConfig,
) -> PipelineResult<NeighborState> {
    let target = column_values(&config.column, features, pending)?;

    // predictors are schema columns; one-hot columns contribute every indicator
    let predictors: Vec<String> = features
        .iter()
        .filter(|f| f.name != config.column && config.predictors.contains(&f.source))
        .map(|f| f.name.clone())
        .collect();
    if predictors.is_empty() {
        return Err(PipelineError::config(format!(
            "none of the predictors {:?} for '{}' survived to encoding",
            config.predictors, config.column
        )));
    }
    let indices = predictor_indices(features, &predictors)?;

    let mut centers = Vec::with_capacity(indices.len());
    let mut scales = Vec::with_capacity(indices.len());
    for &j in &indices {
        let values = &features[j].values;
        centers.push(mean(values).unwrap_or(0.0));
        let std = variance(values).unwrap_or(0.0).sqrt();
        scales.push(if std > 0.0 { std } else { 1.0 });
    }

    let mut reference = Vec::new();
    let mut values = Vec::new();
    for (row, value) in target.iter().enumerate() {
        if let Some(v) = value {
            reference.push(standardized_row(features, &indices, &centers, &scales, row));
            values.push(*v);
        }
    }
    if values.is_empty() {
        return Err(PipelineError::config(format!(
            "deferred column '{}' has no observed values in the fit set",
            config.column
        )));
    }

    tracing::debug!(
        column = %config.column,
        k = config.k,
        predictors = predictors.len(),
        reference_rows = values.len(),
        "Fitted nearest-neighbour imputation"
    );

    Ok(NeighborState {
        column: config.column.clone(),
        k: config.k,
        predictors,
        centers,
        scales,
        reference,
        values,
    })
}

fn standardized_row(
    features: &[Feature],
    indices: &[usize],
    centers: &[f64],
    scales: &[f64],
    row: usize,
) -> Vec<f64> {
    indices
        .iter()
        .zip(centers.iter().zip(scales))
        .map(|(&j, (c, s))| (features[j].values[row] - c) / s)
        .collect()
}

impl NeighborState {
    /// Mean of the `k` nearest reference values; ties keep reference order.
    pub fn predict(&self, point: &[f64]) -> f64 {
        let mut distances: Vec<(f64, usize)> = self
            .reference
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let d: f64 = r.iter().zip(point).map(|(a, b)| (a - b) * (a - b)).sum();
                (d, i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let k = self.k.min(distances.len()).max(1);
        distances[..k].iter().map(|&(_, i)| self.values[i]).sum::<f64>() / k as f64
    }

    /// Fill the pending column and insert it at its place in the feature list.
    pub fn apply(&self, features: &mut Vec<Feature>, pending: PendingColumn) -> PipelineResult<()> {
        if pending.name != self.column {
            return Err(PipelineError::config(format!(
                "pending column '{}' does not match deferred column '{}'",
                pending.name, self.column
            )));
        }
        let indices = predictor_indices(features, &self.predictors)?;

        let filled: Vec<f64> = pending
            .values
            .par_iter()
            .enumerate()
            .map(|(row, value)| match value {
                Some(v) => *v,
                None => {
                    let point = standardized_row(features, &indices, &self.centers, &self.scales, row);
                    self.predict(&point)
                }
            })
            .collect();

        let missing = pending.values.iter().filter(|v| v.is_none()).count();
        tracing::debug!(column = %self.column, rows = missing, "Filled from nearest neighbours");

        let index = pending.index.min(features.len());
        features.insert(index, Feature::new(pending.name.clone(), pending.name, filled));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(k: usize) -> NeighborConfig {
        NeighborConfig {
            column: "frontage".to_string(),
            k,
            predictors: vec!["area".to_string()],
        }
    }

    fn features() -> Vec<Feature> {
        vec![
            Feature::new("area", "area", vec![1.0, 2.0, 3.0, 10.0, 11.0, 2.1]),
            Feature::new("other", "other", vec![0.0; 6]),
        ]
    }

    fn pending() -> PendingColumn {
        PendingColumn {
            index: 1,
            name: "frontage".to_string(),
            values: vec![Some(10.0), Some(20.0), Some(30.0), Some(100.0), Some(110.0), None],
        }
    }

    #[test]
    fn test_fills_from_nearest_rows() {
        let mut features = features();
        let state = fit(&features, Some(&pending()), &config(2)).unwrap();
        assert_eq!(state.values.len(), 5);

        state.apply(&mut features, pending()).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[1].name, "frontage");
        // area 2.1 sits closest to areas 2.0 and 3.0
        assert!((features[1].values[5] - 25.0).abs() < 1e-9);
        assert_eq!(features[1].values[0], 10.0);
    }

    #[test]
    fn test_ties_keep_reference_order() {
        let state = NeighborState {
            column: "x".to_string(),
            k: 1,
            predictors: vec!["p".to_string()],
            centers: vec![0.0],
            scales: vec![1.0],
            reference: vec![vec![-1.0], vec![1.0]],
            values: vec![5.0, 7.0],
        };
        assert_eq!(state.predict(&[0.0]), 5.0);
    }

    #[test]
    fn test_k_larger_than_reference() {
        let mut features = features();
        let state = fit(&features, Some(&pending()), &config(50)).unwrap();
        state.apply(&mut features, pending()).unwrap();
        assert!((features[1].values[5] - 54.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_predictors_is_config_error() {
        let mut config = config(3);
        config.predictors = vec!["nope".to_string()];
        assert!(fit(&features(), Some(&pending()), &config).is_err());
    }
}
