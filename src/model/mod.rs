//! Regression models consuming the preprocessed feature matrix

pub mod cv;
pub mod elastic_net;

use thiserror::Error;

use crate::pipeline::{FeatureMatrix, PipelineError};

pub use cv::{cross_validate, grid_search, parameter_grid, CvReport, Fold, FoldScore, GridResult, KFold};
pub use elastic_net::{ElasticNet, ElasticNetParams};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid model parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// A regressor trained on the pipeline output.
pub trait Regressor: Send {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> ModelResult<()>;

    fn predict(&self, x: &FeatureMatrix) -> ModelResult<Vec<f64>>;
}

/// Root mean squared error. Empty input scores 0.
pub fn rmse(predicted: &[f64], actual: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let ss: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a) * (p - a))
        .sum();
    (ss / actual.len() as f64).sqrt()
}
