//! JSON fit report
//!
//! Documents every input column (kind, imputation rule, encoding, clip bounds,
//! transform family) and every encoded feature (kept or dropped, and why).

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::encoding::{ColumnEncoding, Pooling};
use crate::pipeline::{FittedPipeline, PipelineWarning};
use crate::report::PreprocessSummary;

/// Thresholds used in the fit
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdsConfig {
    pub missing_ratio: f64,
    pub rare_category: f64,
    pub iqr_factor: f64,
    pub nzv_freq_cut: f64,
    pub nzv_unique_cut: f64,
    pub correlation: f64,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub hearth_version: String,
    pub input_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub target_column: String,
    pub fit_rows: usize,
    pub thresholds: ThresholdsConfig,
}

/// Timing information in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingInfo {
    pub load_ms: u64,
    pub fit_ms: u64,
    pub transform_ms: u64,
    pub save_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub input_columns: usize,
    pub dropped_missing: usize,
    pub encoded_features: usize,
    pub dropped_variance: usize,
    pub dropped_correlation: usize,
    pub final_features: usize,
    pub timing: TimingInfo,
}

/// One raw or derived column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnReportEntry {
    pub name: String,
    pub kind: String,
    pub derived: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imputation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_bounds: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// One encoded feature
#[derive(Debug, Clone, Serialize)]
pub struct FeatureReportEntry {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Complete fit report
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub columns: Vec<ColumnReportEntry>,
    pub features: Vec<FeatureReportEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PipelineWarning>,
}

fn describe_encoding(encoding: &ColumnEncoding) -> String {
    match encoding {
        ColumnEncoding::Numeric => "numeric".to_string(),
        ColumnEncoding::Ordinal { levels, bucketed } if bucketed.is_empty() => {
            format!("ordinal ({} levels)", levels.len())
        }
        ColumnEncoding::Ordinal { levels, bucketed } => format!(
            "ordinal ({} levels, {} bucketed into '{}')",
            levels.len(),
            bucketed.join("/"),
            levels.first().map(String::as_str).unwrap_or("")
        ),
        ColumnEncoding::OneHot {
            categories,
            other,
            collapsed,
        } => match other {
            Some(label) => format!(
                "one-hot ({} indicators, {} rare collapsed into '{}')",
                categories.len() + 1,
                collapsed.len(),
                label
            ),
            None => format!("one-hot ({} indicators)", categories.len()),
        },
        ColumnEncoding::Target {
            counts, pooling, ..
        } => match pooling {
            Pooling::Complete => format!("target mean ({} categories, complete pooling)", counts.len()),
            Pooling::Partial { k } => {
                format!("target mean ({} categories, shrinkage k={:.3})", counts.len(), k)
            }
        },
    }
}

impl FitReport {
    pub fn build(
        fitted: &FittedPipeline,
        summary: &PreprocessSummary,
        input_file: &str,
        output_file: Option<&str>,
    ) -> Self {
        let config = fitted.config();
        let filter = fitted.filter();
        let imputation = fitted.imputation();

        let mut columns: Vec<ColumnReportEntry> = Vec::new();
        let raw = fitted.schema().columns().iter();
        let derived = fitted.feature_schema().columns().iter().filter(|c| c.derived);
        for spec in raw.chain(derived) {
            let dropped = imputation.dropped.iter().find(|d| d.name == spec.name);
            let consumed = dropped.is_none()
                && !spec.derived
                && spec.kind.is_feature()
                && !fitted.feature_schema().contains(&spec.name);

            let (status, reason) = if let Some(d) = dropped {
                (
                    "dropped",
                    Some(format!(
                        "Missing ratio {:.2} exceeded threshold {:.2}",
                        d.missing_ratio, imputation.threshold
                    )),
                )
            } else if consumed {
                ("consumed", Some("Replaced by derived features".to_string()))
            } else if !spec.kind.is_feature() {
                ("excluded", None)
            } else {
                ("kept", None)
            };

            columns.push(ColumnReportEntry {
                name: spec.name.clone(),
                kind: spec.kind.to_string(),
                derived: spec.derived,
                status: status.to_string(),
                reason,
                imputation: imputation.rule(&spec.name).map(|r| r.describe()),
                encoding: fitted.encoding().get(&spec.name).map(describe_encoding),
                clip_bounds: fitted
                    .outliers()
                    .get(&spec.name)
                    .map(|b| [b.lower, b.upper]),
                transform: fitted
                    .normalization()
                    .get(&spec.name)
                    .map(|t| t.label()),
            });
        }

        let mut features: Vec<FeatureReportEntry> = filter
            .kept
            .iter()
            .map(|name| FeatureReportEntry {
                name: name.clone(),
                status: "kept".to_string(),
                reason: None,
            })
            .collect();
        features.extend(filter.dropped.iter().map(|d| FeatureReportEntry {
            name: d.column.clone(),
            status: "dropped".to_string(),
            reason: Some(d.reason.to_string()),
        }));

        FitReport {
            metadata: ReportMetadata {
                timestamp: Utc::now().to_rfc3339(),
                hearth_version: env!("CARGO_PKG_VERSION").to_string(),
                input_file: input_file.to_string(),
                output_file: output_file.map(str::to_string),
                target_column: config.target.clone(),
                fit_rows: fitted.fit_rows(),
                thresholds: ThresholdsConfig {
                    missing_ratio: config.imputation.missing_threshold,
                    rare_category: config.encoding.rare_category_threshold,
                    iqr_factor: config.clipping.iqr_factor,
                    nzv_freq_cut: config.filter.nzv_freq_cut,
                    nzv_unique_cut: config.filter.nzv_unique_cut,
                    correlation: config.filter.correlation_threshold,
                },
            },
            summary: ReportSummary {
                input_columns: summary.initial_columns,
                dropped_missing: summary.dropped_missing.len(),
                encoded_features: summary.encoded_features,
                dropped_variance: summary.dropped_variance.len(),
                dropped_correlation: summary.dropped_correlation.len(),
                final_features: summary.final_features,
                timing: TimingInfo {
                    load_ms: summary.load_time.as_millis() as u64,
                    fit_ms: summary.fit_time.as_millis() as u64,
                    transform_ms: summary.transform_time.as_millis() as u64,
                    save_ms: summary.save_time.as_millis() as u64,
                    total_ms: summary.total_time().as_millis() as u64,
                },
            },
            columns,
            features,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<PipelineWarning>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Export the fit report to a JSON file
pub fn export_fit_report(report: &FitReport, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize fit report to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write fit report to {}", output_path.display()))?;

    Ok(())
}
