//! Missing-value imputation
//!
//! Rules are learned once from the fit set, in dependency order:
//!
//! 1. columns whose missing rate exceeds the threshold are dropped,
//! 2. presence groups propagate the absent label (or 0) to their members,
//! 3. categorical gaps take the fit-set mode,
//! 4. numeric gaps take the fit-set median, optionally per group,
//! 5. at most one continuous column is left for nearest-neighbour imputation
//!    after encoding.
//!
//! Explicit constant fills override steps 3 and 4.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::{FillValue, ImputationConfig, PipelineConfig, PresenceGroup};
use super::dataset::{format_level, parse_number, ColumnData, Table};
use super::error::{PipelineError, PipelineResult};
use super::missing::{analyze_missing_values, get_features_above_threshold};
use super::schema::{ColumnKind, Schema};
use super::stats::median;

/// How the gaps of one column are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ImputationRule {
    Constant {
        value: FillValue,
    },
    /// Median of the column within each category of `by`
    GroupConditional {
        by: String,
        medians: BTreeMap<String, f64>,
        fallback: f64,
    },
    Mode {
        value: String,
    },
    Median {
        value: f64,
    },
    /// Filled by the nearest-neighbour stage after encoding
    Deferred,
}

impl ImputationRule {
    pub fn describe(&self) -> String {
        match self {
            ImputationRule::Constant { value } => match value {
                FillValue::Number(v) => format!("constant {}", v),
                FillValue::Text(s) => format!("constant '{}'", s),
            },
            ImputationRule::GroupConditional { by, fallback, .. } => {
                format!("median by {} (fallback {:.4})", by, fallback)
            }
            ImputationRule::Mode { value } => format!("mode '{}'", value),
            ImputationRule::Median { value } => format!("median {:.4}", value),
            ImputationRule::Deferred => "nearest neighbours".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedColumn {
    pub name: String,
    pub missing_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column: String,
    pub rule: ImputationRule,
}

/// Frozen imputation artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationState {
    pub threshold: f64,
    pub dropped: Vec<DroppedColumn>,
    pub absent_label: String,
    /// Groups whose presence column survived the missing-rate drop
    pub groups: Vec<PresenceGroup>,
    pub rules: Vec<ColumnRule>,
}

impl ImputationState {
    pub fn dropped_names(&self) -> Vec<String> {
        self.dropped.iter().map(|d| d.name.clone()).collect()
    }

    pub fn rule(&self, column: &str) -> Option<&ImputationRule> {
        self.rules
            .iter()
            .find(|r| r.column == column)
            .map(|r| &r.rule)
    }

    /// Column left for nearest-neighbour filling, if it survived the drop.
    pub fn deferred_column(&self) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| matches!(r.rule, ImputationRule::Deferred))
            .map(|r| r.column.as_str())
    }
}

/// Learn imputation rules from the conformed fit set.
pub fn fit(table: &Table, schema: &Schema, config: &PipelineConfig) -> PipelineResult<ImputationState> {
    let settings = &config.imputation;

    // Step 1: structural drops
    let ratios = analyze_missing_values(table);
    let mut protected: Vec<&str> = vec![schema.target()];
    protected.extend(config.id_columns.iter().map(String::as_str));
    let to_drop = get_features_above_threshold(&ratios, settings.missing_threshold, &protected);

    let dropped: Vec<DroppedColumn> = ratios
        .iter()
        .filter(|(name, _)| to_drop.contains(name))
        .map(|(name, ratio)| {
            tracing::info!(
                column = %name,
                missing_ratio = ratio,
                threshold = settings.missing_threshold,
                "Dropping column with excess missing values"
            );
            DroppedColumn {
                name: name.clone(),
                missing_ratio: *ratio,
            }
        })
        .collect();

    let schema = schema.without(&to_drop);
    let groups = surviving_groups(&schema, settings)?;

    // Step 2 runs before statistics so that modes and medians see the sentinels
    let mut working = table.clone();
    for name in &to_drop {
        working.remove(name);
    }
    propagate_absence(&mut working, &schema, &groups, &settings.absent_label)?;

    let mut deferred = settings.deferred.as_ref().map(|d| d.column.as_str());
    if let Some(column) = deferred.filter(|c| to_drop.iter().any(|d| d.as_str() == *c)) {
        tracing::warn!(
            column = %column,
            "Deferred column is too sparse and was dropped; skipping nearest-neighbour fill"
        );
        deferred = None;
    }
    let mut rules = Vec::new();

    for spec in schema.features() {
        let column = spec.name.as_str();

        let rule = if Some(column) == deferred {
            if spec.kind != ColumnKind::Continuous {
                return Err(PipelineError::config(format!(
                    "deferred column '{}' must be continuous, found {}",
                    column, spec.kind
                )));
            }
            ImputationRule::Deferred
        } else if let Some(value) = settings.constant_fills.get(column) {
            ImputationRule::Constant {
                value: coerce_fill(column, value, &spec.kind)?,
            }
        } else if let Some(by) = settings.group_medians.get(column) {
            fit_group_median(&working, &schema, column, by)?
        } else if spec.kind.is_categorical() {
            let value = mode(&working.text(column)?).unwrap_or_else(|| settings.absent_label.clone());
            ImputationRule::Mode { value }
        } else {
            let present: Vec<f64> = working.numeric(column)?.into_iter().flatten().collect();
            ImputationRule::Median {
                value: median(&present).unwrap_or(0.0),
            }
        };

        tracing::debug!(column = %column, rule = %rule.describe(), "Imputation rule");
        rules.push(ColumnRule {
            column: column.to_string(),
            rule,
        });
    }

    if let Some(column) = deferred {
        if !rules.iter().any(|r| r.column == column) {
            return Err(PipelineError::config(format!(
                "deferred column '{}' is not a feature of the fitted schema",
                column
            )));
        }
    }

    Ok(ImputationState {
        threshold: settings.missing_threshold,
        dropped,
        absent_label: settings.absent_label.clone(),
        groups,
        rules,
    })
}

/// Apply frozen rules. The result has no missing values apart from the target
/// and the deferred column.
pub fn apply(table: &Table, schema: &Schema, state: &ImputationState) -> PipelineResult<Table> {
    let mut out = table.clone();
    for dropped in &state.dropped {
        out.remove(&dropped.name);
    }

    propagate_absence(&mut out, schema, &state.groups, &state.absent_label)?;

    // Categorical columns first: grouped medians read their keys after filling
    for ColumnRule { column, rule } in &state.rules {
        if !schema.kind(column).is_some_and(ColumnKind::is_categorical) {
            continue;
        }
        let fill = match rule {
            ImputationRule::Mode { value } => value.clone(),
            ImputationRule::Constant {
                value: FillValue::Text(value),
            } => value.clone(),
            ImputationRule::Constant {
                value: FillValue::Number(value),
            } => format_level(*value),
            _ => continue,
        };
        let values: Vec<Option<String>> = out
            .text(column)?
            .into_iter()
            .map(|v| Some(v.unwrap_or_else(|| fill.clone())))
            .collect();
        out.push(column.clone(), ColumnData::Text(values))?;
    }

    for ColumnRule { column, rule } in &state.rules {
        if !schema.kind(column).is_some_and(ColumnKind::is_numeric) {
            continue;
        }
        let values = out.numeric(column)?;
        let filled: Vec<Option<f64>> = match rule {
            ImputationRule::Median { value } => {
                values.into_iter().map(|v| Some(v.unwrap_or(*value))).collect()
            }
            ImputationRule::Constant { value } => {
                let constant = match value {
                    FillValue::Number(v) => *v,
                    FillValue::Text(s) => parse_number(s).unwrap_or(0.0),
                };
                values.into_iter().map(|v| Some(v.unwrap_or(constant))).collect()
            }
            ImputationRule::GroupConditional {
                by,
                medians,
                fallback,
            } => {
                let keys = out.text(by)?;
                values
                    .into_iter()
                    .zip(keys)
                    .map(|(v, key)| {
                        Some(v.unwrap_or_else(|| {
                            key.and_then(|k| medians.get(&k).copied())
                                .unwrap_or(*fallback)
                        }))
                    })
                    .collect()
            }
            ImputationRule::Mode { .. } | ImputationRule::Deferred => continue,
        };
        out.push(column.clone(), ColumnData::Numeric(filled))?;
    }

    Ok(out)
}

/// Most frequent value; ties go to the smallest value in byte order.
pub fn mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.to_string())
}

fn surviving_groups(schema: &Schema, settings: &ImputationConfig) -> PipelineResult<Vec<PresenceGroup>> {
    let mut groups = Vec::new();
    for group in &settings.presence_groups {
        match schema.kind(&group.presence) {
            None => {
                tracing::warn!(
                    presence = %group.presence,
                    "Presence column not in schema; its group falls back to generic imputation"
                );
            }
            Some(kind) if !kind.is_categorical() => {
                return Err(PipelineError::config(format!(
                    "presence column '{}' must be categorical, found {}",
                    group.presence, kind
                )));
            }
            Some(_) => groups.push(PresenceGroup {
                presence: group.presence.clone(),
                members: group
                    .members
                    .iter()
                    .filter(|m| schema.contains(m))
                    .cloned()
                    .collect(),
            }),
        }
    }
    Ok(groups)
}

/// Write the absent label into missing presence values, then force every
/// member of an absent group to the label (categorical) or 0 (numeric).
fn propagate_absence(
    table: &mut Table,
    schema: &Schema,
    groups: &[PresenceGroup],
    absent_label: &str,
) -> PipelineResult<()> {
    for group in groups {
        let presence: Vec<Option<String>> = table
            .text(&group.presence)?
            .into_iter()
            .map(|v| Some(v.unwrap_or_else(|| absent_label.to_string())))
            .collect();
        let absent: Vec<bool> = presence
            .iter()
            .map(|v| v.as_deref() == Some(absent_label))
            .collect();
        table.push(group.presence.clone(), ColumnData::Text(presence))?;

        for member in &group.members {
            let Some(kind) = schema.kind(member) else {
                continue;
            };
            let data = if kind.is_numeric() {
                let values = table.numeric(member)?;
                ColumnData::Numeric(
                    values
                        .into_iter()
                        .zip(&absent)
                        .map(|(v, &a)| if a { Some(0.0) } else { v })
                        .collect(),
                )
            } else {
                let values = table.text(member)?;
                ColumnData::Text(
                    values
                        .into_iter()
                        .zip(&absent)
                        .map(|(v, &a)| if a { Some(absent_label.to_string()) } else { v })
                        .collect(),
                )
            };
            table.push(member.clone(), data)?;
        }
    }
    Ok(())
}

fn coerce_fill(column: &str, value: &FillValue, kind: &ColumnKind) -> PipelineResult<FillValue> {
    match (value, kind.is_numeric()) {
        (FillValue::Text(s), true) => parse_number(s).map(FillValue::Number).ok_or_else(|| {
            PipelineError::config(format!(
                "constant fill '{}' for numeric column '{}' is not a number",
                s, column
            ))
        }),
        (FillValue::Number(v), false) => Ok(FillValue::Text(format_level(*v))),
        _ => Ok(value.clone()),
    }
}

fn fit_group_median(table: &Table, schema: &Schema, column: &str, by: &str) -> PipelineResult<ImputationRule> {
    let kind = schema.kind(column).cloned().unwrap_or(ColumnKind::Nominal);
    if !kind.is_numeric() {
        return Err(PipelineError::config(format!(
            "grouped median needs a numeric column, '{}' is {}",
            column, kind
        )));
    }
    if !schema.kind(by).is_some_and(ColumnKind::is_categorical) {
        return Err(PipelineError::config(format!(
            "grouping key '{}' for column '{}' must be a categorical column",
            by, column
        )));
    }

    let values = table.numeric(column)?;
    let keys = table.text(by)?;
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (value, key) in values.iter().zip(&keys) {
        if let (Some(v), Some(k)) = (value, key) {
            groups.entry(k.clone()).or_default().push(*v);
        }
    }

    let present: Vec<f64> = values.into_iter().flatten().collect();
    let medians = groups
        .into_iter()
        .filter_map(|(k, v)| median(&v).map(|m| (k, m)))
        .collect();

    Ok(ImputationRule::GroupConditional {
        by: by.to_string(),
        medians,
        fallback: median(&present).unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::classify;
    use polars::prelude::*;
    use crate::pipeline::schema::Schema;

    fn prepare(df: DataFrame, config: &PipelineConfig) -> (Table, Schema) {
        let table = Table::from_frame(&df, &config.na_tokens).unwrap();
        let schema = classify(&table, config).unwrap();
        let table = schema.conform(&table).unwrap();
        (table, schema)
    }

    #[test]
    fn test_mode_tie_breaks_on_sort_order() {
        let values = vec![
            Some("b".to_string()),
            Some("a".to_string()),
            Some("b".to_string()),
            Some("a".to_string()),
            None,
        ];
        assert_eq!(mode(&values), Some("a".to_string()));
        assert_eq!(mode(&[None, None]), None);
    }

    #[test]
    fn test_grouped_median_with_fallback() {
        let mut config = PipelineConfig::default();
        config.target = "y".to_string();
        config
            .imputation
            .group_medians
            .insert("frontage".to_string(), "hood".to_string());
        let df = df! {
            "hood" => ["A", "A", "A", "B", "B", "B"],
            "frontage" => [Some(10.0f64), Some(20.0), None, Some(70.0), Some(90.0), None],
            "y" => [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0],
        }
        .unwrap();
        let (table, schema) = prepare(df, &config);
        let state = fit(&table, &schema, &config).unwrap();
        let out = apply(&table, &schema, &state).unwrap();
        let frontage = out.numeric("frontage").unwrap();
        assert_eq!(frontage[2], Some(15.0));
        assert_eq!(frontage[5], Some(80.0));

        let unseen = Table::from_frame(
            &df! {
                "hood" => ["C"],
                "frontage" => [None::<f64>],
                "y" => [1.0f64],
            }
            .unwrap(),
            &[],
        )
        .unwrap();
        let unseen = schema.conform(&unseen).unwrap();
        let out = apply(&unseen, &schema, &state).unwrap();
        // global median of 10, 20, 70, 90
        assert_eq!(out.numeric("frontage").unwrap()[0], Some(45.0));
    }

    #[test]
    fn test_missing_presence_treated_as_absent() {
        let mut config = PipelineConfig::default();
        config.target = "y".to_string();
        config.imputation.presence_groups = vec![PresenceGroup {
            presence: "pool".to_string(),
            members: vec!["pool_area".to_string()],
        }];
        let df = df! {
            "pool" => [Some("Gd"), None, Some("Ex"), Some("Gd")],
            "pool_area" => [Some(500.0f64), Some(120.0), None, Some(400.0)],
            "y" => [1.0f64, 2.0, 3.0, 4.0],
        }
        .unwrap();
        let (table, schema) = prepare(df, &config);
        let state = fit(&table, &schema, &config).unwrap();
        let out = apply(&table, &schema, &state).unwrap();

        assert_eq!(out.text("pool").unwrap()[1], Some("None".to_string()));
        // forced to zero even though a value was recorded
        assert_eq!(out.numeric("pool_area").unwrap()[1], Some(0.0));
        // present group member filled with the median of 0, 400, 500
        assert_eq!(out.numeric("pool_area").unwrap()[2], Some(400.0));
    }

    #[test]
    fn test_drops_columns_above_threshold() {
        let mut config = PipelineConfig::default();
        config.target = "y".to_string();
        let df = df! {
            "sparse" => [Some(1.0f64), None, None, None],
            "dense" => [Some(1.0f64), Some(2.0), None, Some(4.0)],
            "y" => [1.0f64, 2.0, 3.0, 4.0],
        }
        .unwrap();
        let (table, schema) = prepare(df, &config);
        let state = fit(&table, &schema, &config).unwrap();
        assert_eq!(state.dropped_names(), vec!["sparse".to_string()]);
        assert!(state.rule("sparse").is_none());

        let out = apply(&table, &schema.without(&state.dropped_names()), &state).unwrap();
        assert!(!out.contains("sparse"));
        assert_eq!(out.numeric("dense").unwrap()[2], Some(2.0));
    }

    #[test]
    fn test_constant_fill_overrides_mode() {
        let mut config = PipelineConfig::default();
        config.target = "y".to_string();
        config
            .imputation
            .constant_fills
            .insert("veneer".to_string(), FillValue::Text("None".to_string()));
        let df = df! {
            "veneer" => [Some("Brk"), Some("Brk"), None],
            "y" => [1.0f64, 2.0, 3.0],
        }
        .unwrap();
        let (table, schema) = prepare(df, &config);
        let state = fit(&table, &schema, &config).unwrap();
        let out = apply(&table, &schema, &state).unwrap();
        assert_eq!(out.text("veneer").unwrap()[2], Some("None".to_string()));
    }

    #[test]
    fn test_numeric_presence_column_rejected() {
        let mut config = PipelineConfig::default();
        config.target = "y".to_string();
        config.imputation.presence_groups = vec![PresenceGroup {
            presence: "count".to_string(),
            members: vec![],
        }];
        let df = df! {
            "count" => [1.0f64, 2.5, 3.5],
            "y" => [1.0f64, 2.0, 3.0],
        }
        .unwrap();
        let (table, schema) = prepare(df, &config);
        assert!(matches!(
            fit(&table, &schema, &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
