//! IQR-based winsorization of continuous features

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::ClipConfig;
use super::error::{PipelineResult, SchemaError};
use super::matrix::Feature;
use super::stats::{quantile_sorted, sorted};

/// Clipping bounds learned for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipBounds {
    pub column: String,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ClipBounds {
    /// Bounds `[Q1 - f·IQR, Q3 + f·IQR]`; a zero IQR collapses them to `[Q1, Q3]`.
    pub fn from_values(column: &str, values: &[f64], factor: f64) -> Option<Self> {
        let s = sorted(values);
        let q1 = quantile_sorted(&s, 0.25)?;
        let q3 = quantile_sorted(&s, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            column: column.to_string(),
            q1,
            q3,
            lower: q1 - factor * iqr,
            upper: q3 + factor * iqr,
        })
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlierState {
    pub bounds: Vec<ClipBounds>,
}

impl OutlierState {
    pub fn get(&self, column: &str) -> Option<&ClipBounds> {
        self.bounds.iter().find(|b| b.column == column)
    }
}

/// Learn bounds for the continuous features of the fit set.
pub fn fit(features: &[Feature], continuous: &[String], config: &ClipConfig) -> OutlierState {
    if !config.enabled {
        return OutlierState::default();
    }

    let bounds: Vec<ClipBounds> = features
        .par_iter()
        .filter(|f| continuous.contains(&f.name))
        .filter_map(|f| ClipBounds::from_values(&f.name, &f.values, config.iqr_factor))
        .collect();

    for b in &bounds {
        tracing::debug!(
            column = %b.column,
            lower = b.lower,
            upper = b.upper,
            "Outlier bounds"
        );
    }

    OutlierState { bounds }
}

/// Winsorize in place. Returns the number of clipped values.
pub fn apply(features: &mut [Feature], state: &OutlierState) -> PipelineResult<usize> {
    let mut clipped = 0;
    for bounds in &state.bounds {
        let feature = features
            .iter_mut()
            .find(|f| f.name == bounds.column)
            .ok_or_else(|| SchemaError::MissingColumn(bounds.column.clone()))?;
        for value in feature.values.iter_mut() {
            let c = bounds.clip(*value);
            if c != *value {
                clipped += 1;
                *value = c;
            }
        }
    }
    Ok(clipped)
}
