//! Hearth: leakage-safe preprocessing for tabular housing data
//!
//! A fit-once, transform-many pipeline that turns raw housing records into a
//! dense numeric feature matrix, plus a regularized regression model and
//! cross-validation harness that consume it.

pub mod cli;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod utils;
