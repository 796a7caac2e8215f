//! Pipeline module - fit-once, transform-many preprocessing stages

pub mod config;
pub mod correlation;
pub mod dataset;
pub mod encoding;
pub mod engineer;
pub mod error;
pub mod filter;
pub mod impute;
pub mod loader;
pub mod matrix;
pub mod missing;
pub mod neighbors;
pub mod normalize;
pub mod orchestrator;
pub mod outliers;
pub mod scale;
pub mod schema;
pub mod stats;
pub mod target;
pub mod variance;

pub use config::PipelineConfig;
pub use dataset::{ColumnData, Table};
pub use error::{PipelineError, PipelineResult, PipelineWarning, SchemaError};
pub use loader::*;
pub use matrix::{Feature, FeatureMatrix};
pub use orchestrator::{FittedPipeline, Pipeline, PipelineState, Transformed};
pub use schema::{ColumnKind, ColumnSpec, Schema};
pub use target::TargetTransform;
