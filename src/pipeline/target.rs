//! Target column transform
//!
//! Sale prices are modelled on the log scale. The forward transform runs on
//! the fit set (and on any labelled transform input); the inverse maps model
//! predictions back to prices.

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTransform {
    #[default]
    Log,
}

impl TargetTransform {
    /// Transform raw target values.
    ///
    /// # Arguments
    /// * `column` - Target column name, used in error messages
    /// * `values` - Raw target values; missing entries are rejected
    ///
    /// # Returns
    /// Transformed values, or `InvalidTarget` for a missing or non-positive value
    pub fn forward(&self, column: &str, values: &[Option<f64>]) -> PipelineResult<Vec<f64>> {
        values
            .iter()
            .enumerate()
            .map(|(row, value)| match (self, value) {
                (_, None) => Err(PipelineError::target(format!(
                    "'{}' is missing at row {}",
                    column, row
                ))),
                (TargetTransform::Log, Some(y)) if *y <= 0.0 => Err(PipelineError::target(
                    format!("'{}' must be positive for a log transform, found {} at row {}", column, y, row),
                )),
                (TargetTransform::Log, Some(y)) => Ok(y.ln()),
            })
            .collect()
    }

    /// Exact inverse of [`TargetTransform::forward`].
    pub fn inverse(&self, values: &[f64]) -> Vec<f64> {
        match self {
            TargetTransform::Log => values.iter().map(|v| v.exp()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let prices = [Some(208500.0), Some(181500.0), Some(1.0)];
        let forward = TargetTransform::Log.forward("SalePrice", &prices).unwrap();
        assert_eq!(forward[2], 0.0);
        let back = TargetTransform::Log.inverse(&forward);
        for (b, p) in back.iter().zip(prices.iter().flatten()) {
            assert!((b - p).abs() / p < 1e-12);
        }
    }

    #[test]
    fn test_non_positive_rejected() {
        let err = TargetTransform::Log
            .forward("SalePrice", &[Some(100.0), Some(0.0)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTarget(_)));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_missing_rejected() {
        assert!(TargetTransform::Log.forward("y", &[None]).is_err());
    }
}
