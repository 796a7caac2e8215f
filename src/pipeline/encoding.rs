//! Categorical encoding
//!
//! Turns the imputed table into numeric features:
//! - ordinal columns become their 0-based rank in the column's own level list,
//! - low-cardinality nominal columns become one indicator per retained
//!   category, rare categories collapsed into a single `other` indicator,
//! - high-cardinality columns become a partially pooled mean of the
//!   (transformed) target per category,
//! - numeric columns pass through unchanged.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::config::{EncodingConfig, Shrinkage};
use super::dataset::Table;
use super::error::{PipelineError, PipelineResult, PipelineWarning, SchemaError};
use super::matrix::Feature;
use super::schema::{ColumnKind, Schema};
use super::stats::{mean, variance};

/// Rank given to ordinal values never seen while fitting.
pub const UNSEEN_ORDINAL: f64 = -1.0;

/// How per-category means are blended with the global mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pooling", rename_all = "snake_case")]
pub enum Pooling {
    /// Every category maps to the global mean
    Complete,
    /// Weight `n / (n + k)` on the category mean
    Partial { k: f64 },
}

impl Pooling {
    pub fn weight(&self, n: usize) -> f64 {
        match *self {
            Pooling::Complete => 0.0,
            Pooling::Partial { k } => {
                let n = n as f64;
                if n + k <= 0.0 {
                    1.0
                } else {
                    n / (n + k)
                }
            }
        }
    }
}

/// Fit artifact for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum ColumnEncoding {
    Numeric,
    Ordinal {
        levels: Vec<String>,
        /// Training values outside the level list, bucketed into the first level
        bucketed: Vec<String>,
    },
    OneHot {
        categories: Vec<String>,
        other: Option<String>,
        collapsed: Vec<String>,
    },
    Target {
        /// Blended encoded value per category
        encoded: BTreeMap<String, f64>,
        counts: BTreeMap<String, usize>,
        global_mean: f64,
        pooling: Pooling,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEncodingState {
    pub column: String,
    #[serde(flatten)]
    pub encoding: ColumnEncoding,
}

/// Frozen encoder artifacts, one entry per feature column in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingState {
    pub columns: Vec<ColumnEncodingState>,
}

impl EncodingState {
    pub fn get(&self, column: &str) -> Option<&ColumnEncoding> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.encoding)
    }

    /// Output feature names in order.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for state in &self.columns {
            match &state.encoding {
                ColumnEncoding::OneHot {
                    categories, other, ..
                } => {
                    names.extend(categories.iter().map(|c| indicator_name(&state.column, c)));
                    if let Some(other) = other {
                        names.push(indicator_name(&state.column, other));
                    }
                }
                _ => names.push(state.column.clone()),
            }
        }
        names
    }
}

/// A numeric column that still has gaps, left for the nearest-neighbour stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingColumn {
    /// Position the column takes in the feature list once filled
    pub index: usize,
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Output of the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub features: Vec<Feature>,
    pub pending: Option<PendingColumn>,
    pub warnings: Vec<PipelineWarning>,
}

pub fn indicator_name(column: &str, category: &str) -> String {
    format!("{}_{}", column, category)
}

/// Learn encodings from the imputed fit set and its transformed target.
pub fn fit(
    table: &Table,
    target: &[f64],
    schema: &Schema,
    config: &EncodingConfig,
) -> PipelineResult<EncodingState> {
    if target.len() != table.height() {
        return Err(PipelineError::leakage(format!(
            "target has {} values but the fit set has {} rows",
            target.len(),
            table.height()
        )));
    }

    let mut columns = Vec::new();
    for spec in schema.features() {
        let encoding = match &spec.kind {
            ColumnKind::Continuous | ColumnKind::Discrete => ColumnEncoding::Numeric,
            ColumnKind::Ordinal { levels } => fit_ordinal(&spec.name, levels, &table.text(&spec.name)?),
            ColumnKind::Nominal => fit_one_hot(&spec.name, &table.text(&spec.name)?, config),
            ColumnKind::HighCardinality => {
                fit_target(&spec.name, &table.text(&spec.name)?, target, config.shrinkage)
            }
            ColumnKind::Target | ColumnKind::Identifier => continue,
        };
        columns.push(ColumnEncodingState {
            column: spec.name.clone(),
            encoding,
        });
    }

    let state = EncodingState { columns };
    check_unique_names(&state.output_names())?;
    Ok(state)
}

/// Later stages address features by name, so every output name must be unique.
fn check_unique_names(names: &[String]) -> PipelineResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::config(format!(
                "encoded feature name '{}' occurs more than once; rename the column or \
                 choose a different other_label",
                name
            )));
        }
    }
    Ok(())
}

/// Encode an imputed table with frozen state.
///
/// `deferred` names the one numeric column allowed to still have gaps.
pub fn apply(
    table: &Table,
    state: &EncodingState,
    deferred: Option<&str>,
) -> PipelineResult<Encoded> {
    // target and identifier columns are removed by the caller
    if let Some(name) = table.names().iter().find(|n| state.get(n).is_none()) {
        return Err(SchemaError::NoStageState {
            stage: "encoding",
            column: name.clone(),
        }
        .into());
    }

    let mut features = Vec::new();
    let mut pending = None;
    let mut warnings = Vec::new();

    for ColumnEncodingState { column, encoding } in &state.columns {
        match encoding {
            ColumnEncoding::Numeric => {
                let values = table.numeric(column)?;
                if values.iter().all(Option::is_some) {
                    features.push(Feature::new(
                        column.clone(),
                        column.clone(),
                        values.into_iter().flatten().collect(),
                    ));
                } else if Some(column.as_str()) == deferred {
                    pending = Some(PendingColumn {
                        index: features.len(),
                        name: column.clone(),
                        values,
                    });
                } else {
                    return Err(PipelineError::config(format!(
                        "column '{}' still has missing values after imputation",
                        column
                    )));
                }
            }
            ColumnEncoding::Ordinal { levels, bucketed } => {
                let values = table.text(column)?;
                let mut unseen: BTreeMap<String, usize> = BTreeMap::new();
                let ranks = values
                    .iter()
                    .map(|v| {
                        let v = v.as_deref().unwrap_or("");
                        if let Some(rank) = levels.iter().position(|l| l == v) {
                            rank as f64
                        } else if bucketed.iter().any(|b| b == v) {
                            0.0
                        } else {
                            *unseen.entry(v.to_string()).or_insert(0) += 1;
                            UNSEEN_ORDINAL
                        }
                    })
                    .collect();
                record_unseen(&mut warnings, column, unseen, &format!("rank {}", UNSEEN_ORDINAL));
                features.push(Feature::new(column.clone(), column.clone(), ranks));
            }
            ColumnEncoding::OneHot {
                categories,
                other,
                collapsed,
            } => {
                let values = table.text(column)?;
                let mut blocks: Vec<Vec<f64>> = vec![vec![0.0; values.len()]; categories.len()];
                let mut other_block = vec![0.0; values.len()];
                let mut unseen: BTreeMap<String, usize> = BTreeMap::new();

                for (i, value) in values.iter().enumerate() {
                    let value = value.as_deref().unwrap_or("");
                    if let Some(j) = categories.iter().position(|c| c == value) {
                        blocks[j][i] = 1.0;
                    } else {
                        if !collapsed.iter().any(|c| c == value) {
                            *unseen.entry(value.to_string()).or_insert(0) += 1;
                        }
                        if other.is_some() {
                            other_block[i] = 1.0;
                        }
                    }
                }

                let fallback = match other {
                    Some(label) => format!("indicator '{}'", indicator_name(column, label)),
                    None => "no indicator".to_string(),
                };
                record_unseen(&mut warnings, column, unseen, &fallback);

                for (category, block) in categories.iter().zip(blocks) {
                    features.push(Feature::new(indicator_name(column, category), column.clone(), block));
                }
                if let Some(label) = other {
                    features.push(Feature::new(indicator_name(column, label), column.clone(), other_block));
                }
            }
            ColumnEncoding::Target {
                encoded,
                global_mean,
                ..
            } => {
                let values = table.text(column)?;
                let mut unseen: BTreeMap<String, usize> = BTreeMap::new();
                let means = values
                    .iter()
                    .map(|v| {
                        let v = v.as_deref().unwrap_or("");
                        encoded.get(v).copied().unwrap_or_else(|| {
                            *unseen.entry(v.to_string()).or_insert(0) += 1;
                            *global_mean
                        })
                    })
                    .collect();
                record_unseen(&mut warnings, column, unseen, "global mean");
                features.push(Feature::new(column.clone(), column.clone(), means));
            }
        }
    }

    Ok(Encoded {
        features,
        pending,
        warnings,
    })
}

fn record_unseen(
    warnings: &mut Vec<PipelineWarning>,
    column: &str,
    unseen: BTreeMap<String, usize>,
    fallback: &str,
) {
    for (value, rows) in unseen {
        tracing::warn!(column = %column, value = %value, rows, fallback = %fallback, "Unseen category");
        warnings.push(PipelineWarning::UnseenCategory {
            column: column.to_string(),
            value,
            rows,
            fallback: fallback.to_string(),
        });
    }
}

fn fit_ordinal(column: &str, levels: &[String], values: &[Option<String>]) -> ColumnEncoding {
    let mut bucketed: Vec<String> = values
        .iter()
        .flatten()
        .filter(|v| !levels.contains(v))
        .cloned()
        .collect();
    bucketed.sort();
    bucketed.dedup();
    if !bucketed.is_empty() {
        tracing::warn!(
            column = %column,
            values = ?bucketed,
            bucket = %levels[0],
            "Training values outside the ordinal levels bucketed into the first level"
        );
    }
    ColumnEncoding::Ordinal {
        levels: levels.to_vec(),
        bucketed,
    }
}

fn fit_one_hot(column: &str, values: &[Option<String>], config: &EncodingConfig) -> ColumnEncoding {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }
    let total = values.len().max(1) as f64;

    let mut categories = Vec::new();
    let mut collapsed = Vec::new();
    for (category, count) in counts {
        // a category exactly at the threshold collapses
        if count as f64 / total <= config.rare_category_threshold {
            collapsed.push(category.to_string());
        } else {
            categories.push(category.to_string());
        }
    }

    let other = if collapsed.is_empty() {
        None
    } else {
        tracing::debug!(
            column = %column,
            collapsed = ?collapsed,
            label = %config.other_label,
            "Collapsed rare categories"
        );
        Some(config.other_label.clone())
    };

    ColumnEncoding::OneHot {
        categories,
        other,
        collapsed,
    }
}

/// Partial-pooling target encoding.
///
/// For category `c` with `n_c` rows and mean `ȳ_c`, the encoded value is
/// `w_c·ȳ_c + (1 − w_c)·ȳ` with `w_c = n_c / (n_c + k)`. Under
/// [`Shrinkage::MixedEffects`], `k = σ²_within / τ²_between` where σ²_within
/// is the pooled within-category variance and τ² the method-of-moments
/// between-category variance `Var(ȳ_c) − σ²_within · mean(1/n_c)`.
fn fit_target(column: &str, values: &[Option<String>], target: &[f64], shrinkage: Shrinkage) -> ColumnEncoding {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (value, &y) in values.iter().zip(target) {
        if let Some(v) = value {
            groups.entry(v.clone()).or_default().push(y);
        }
    }

    let global_mean = mean(target).unwrap_or(0.0);
    let pooling = match shrinkage {
        Shrinkage::Fixed { k } => Pooling::Partial { k },
        Shrinkage::MixedEffects => mixed_effects_pooling(&groups, target),
    };

    let mut encoded = BTreeMap::new();
    let mut counts = BTreeMap::new();
    for (category, ys) in &groups {
        let n = ys.len();
        let group_mean = mean(ys).unwrap_or(global_mean);
        let w = pooling.weight(n);
        encoded.insert(category.clone(), w * group_mean + (1.0 - w) * global_mean);
        counts.insert(category.clone(), n);
    }

    tracing::debug!(
        column = %column,
        categories = groups.len(),
        global_mean,
        pooling = ?pooling,
        "Fitted target encoding"
    );

    ColumnEncoding::Target {
        encoded,
        counts,
        global_mean,
        pooling,
    }
}

fn mixed_effects_pooling(groups: &BTreeMap<String, Vec<f64>>, target: &[f64]) -> Pooling {
    let n_total: usize = groups.values().map(Vec::len).sum();
    let n_groups = groups.len();
    if n_groups < 2 {
        return Pooling::Complete;
    }

    let within = if n_total > n_groups {
        let ss: f64 = groups
            .values()
            .map(|ys| {
                let m = mean(ys).unwrap_or(0.0);
                ys.iter().map(|y| (y - m) * (y - m)).sum::<f64>()
            })
            .sum();
        ss / (n_total - n_groups) as f64
    } else {
        variance(target).unwrap_or(0.0)
    };

    let group_means: Vec<f64> = groups.values().filter_map(|ys| mean(ys)).collect();
    let mean_inverse_n =
        groups.values().map(|ys| 1.0 / ys.len() as f64).sum::<f64>() / n_groups as f64;
    let between = variance(&group_means).unwrap_or(0.0) - within * mean_inverse_n;

    if within <= f64::EPSILON {
        // categories are internally constant: no shrinkage needed
        Pooling::Partial { k: 0.0 }
    } else if between <= 0.0 {
        Pooling::Complete
    } else {
        Pooling::Partial {
            k: within / between,
        }
    }
}
