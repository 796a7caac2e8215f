//! Report module - summarizing fit results

pub mod fit_report;
pub mod summary;

pub use fit_report::*;
pub use summary::*;
