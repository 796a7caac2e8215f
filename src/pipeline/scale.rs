//! Standardization of the retained features

use serde::{Deserialize, Serialize};

use super::error::{PipelineResult, SchemaError};
use super::matrix::Feature;
use super::stats::{mean, variance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub column: String,
    pub mean: f64,
    /// Population standard deviation; 1 for a zero-spread column
    pub scale: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleState {
    pub columns: Vec<ScaleParams>,
}

pub fn fit(features: &[Feature], standardize: bool) -> ScaleState {
    if !standardize {
        return ScaleState::default();
    }
    ScaleState {
        columns: features
            .iter()
            .map(|f| {
                let std = variance(&f.values).unwrap_or(0.0).sqrt();
                ScaleParams {
                    column: f.name.clone(),
                    mean: mean(&f.values).unwrap_or(0.0),
                    scale: if std > 0.0 { std } else { 1.0 },
                }
            })
            .collect(),
    }
}

pub fn apply(features: &mut [Feature], state: &ScaleState) -> PipelineResult<()> {
    for params in &state.columns {
        let feature = features
            .iter_mut()
            .find(|f| f.name == params.column)
            .ok_or_else(|| SchemaError::MissingColumn(params.column.clone()))?;
        for value in feature.values.iter_mut() {
            *value = (*value - params.mean) / params.scale;
        }
    }
    Ok(())
}
