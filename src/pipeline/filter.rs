//! Feature filter: near-zero variance, then greedy correlation pruning

use serde::{Deserialize, Serialize};

use super::config::FilterConfig;
use super::correlation::select_uncorrelated;
use super::error::{PipelineError, PipelineResult, SchemaError};
use super::matrix::Feature;
use super::variance::{near_zero_variance, Degenerate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    Constant,
    NearZeroVariance { freq_ratio: f64, unique_percent: f64 },
    Correlated { with: String, correlation: f64 },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Constant => write!(f, "constant"),
            DropReason::NearZeroVariance {
                freq_ratio,
                unique_percent,
            } => write!(
                f,
                "near-zero variance (ratio {:.1}, {:.1}% distinct)",
                freq_ratio, unique_percent
            ),
            DropReason::Correlated { with, correlation } => {
                write!(f, "correlated with {} (r = {:.3})", with, correlation)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDrop {
    pub column: String,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// Frozen keep/drop decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub kept: Vec<String>,
    pub dropped: Vec<FilterDrop>,
}

impl FilterState {
    pub fn dropped_names(&self, pred: impl Fn(&DropReason) -> bool) -> Vec<String> {
        self.dropped
            .iter()
            .filter(|d| pred(&d.reason))
            .map(|d| d.column.clone())
            .collect()
    }
}

pub fn fit(features: &[Feature], config: &FilterConfig) -> FilterState {
    let mut dropped = Vec::new();
    let mut survivors: Vec<Feature> = Vec::with_capacity(features.len());

    for feature in features {
        match near_zero_variance(&feature.values, config.nzv_freq_cut, config.nzv_unique_cut) {
            Some(Degenerate::Constant) => dropped.push(FilterDrop {
                column: feature.name.clone(),
                reason: DropReason::Constant,
            }),
            Some(Degenerate::Dominated {
                freq_ratio,
                unique_percent,
            }) => dropped.push(FilterDrop {
                column: feature.name.clone(),
                reason: DropReason::NearZeroVariance {
                    freq_ratio,
                    unique_percent,
                },
            }),
            None => survivors.push(feature.clone()),
        }
    }

    let (kept_idx, correlated) = select_uncorrelated(&survivors, config.correlation_threshold);
    dropped.extend(correlated.into_iter().map(|pair| FilterDrop {
        column: pair.feature1,
        reason: DropReason::Correlated {
            with: pair.feature2,
            correlation: pair.correlation,
        },
    }));

    for drop in &dropped {
        tracing::info!(column = %drop.column, reason = %drop.reason, "Filtered feature");
    }

    FilterState {
        kept: kept_idx.into_iter().map(|i| survivors[i].name.clone()).collect(),
        dropped,
    }
}

/// Keep only the retained features, in their fitted order.
pub fn apply(features: Vec<Feature>, state: &FilterState) -> PipelineResult<Vec<Feature>> {
    let mut slots: Vec<Option<Feature>> = features.into_iter().map(Some).collect();
    state
        .kept
        .iter()
        .map(|name| {
            slots
                .iter_mut()
                .find(|s| matches!(s, Some(f) if &f.name == name))
                .and_then(Option::take)
                .ok_or_else(|| PipelineError::from(SchemaError::MissingColumn(name.clone())))
        })
        .collect()
}
