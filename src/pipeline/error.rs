//! Error and warning types for the preprocessing pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema violations detected while conforming rows to a fitted schema.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// Input carries a column the schema never declared.
    #[error("Unknown column '{0}' is not part of the fitted schema")]
    UnknownColumn(String),

    /// A declared column is absent from the input.
    #[error("Column '{0}' is declared in the schema but missing from the input")]
    MissingColumn(String),

    /// A numeric column holds a value that cannot be parsed as a number.
    #[error("Column '{column}' expects numeric values, found '{value}'")]
    TypeMismatch { column: String, value: String },

    /// A column does not have as many rows as the table it joins.
    #[error("Column '{column}' has {found} rows, expected {expected}")]
    HeightMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// A stage was asked to handle a column it holds no state for.
    #[error("No {stage} state recorded for column '{column}'")]
    NoStageState { stage: &'static str, column: String },
}

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Pipeline has not been fitted; call fit before transform")]
    NotFitted,

    #[error("Pipeline is already fitted; call reset before fitting again")]
    AlreadyFitted,

    #[error("Leakage guard: {0}")]
    LeakageGuard(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Data error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn leakage(msg: impl Into<String>) -> Self {
        Self::LeakageGuard(msg.into())
    }

    pub fn target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Non-fatal conditions recorded during a transform pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// A categorical value never seen while fitting was mapped to a fallback.
    UnseenCategory {
        column: String,
        value: String,
        /// Number of rows carrying the value in this pass.
        rows: usize,
        fallback: String,
    },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::UnseenCategory {
                column,
                value,
                rows,
                fallback,
            } => write!(
                f,
                "unseen category '{}' in column '{}' ({} row(s)) mapped to {}",
                value, column, rows, fallback
            ),
        }
    }
}
