//! Column classification
//!
//! Assigns every raw column a semantic kind once, at fit time. The resulting
//! [`Schema`] is frozen and every later stage, and every later transform,
//! reads kinds from it instead of re-inferring them from data.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::config::{LevelRange, PipelineConfig};
use super::dataset::{ColumnData, Table};
use super::error::{PipelineResult, SchemaError};

/// Semantic kind of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnKind {
    Continuous,
    Discrete,
    Nominal,
    /// Ordered categories; levels are specific to this column
    Ordinal {
        levels: Vec<String>,
    },
    HighCardinality,
    Target,
    Identifier,
}

impl ColumnKind {
    /// Kinds whose raw values are numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnKind::Continuous | ColumnKind::Discrete | ColumnKind::Target
        )
    }

    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            ColumnKind::Nominal | ColumnKind::Ordinal { .. } | ColumnKind::HighCardinality
        )
    }

    pub fn is_feature(&self) -> bool {
        !matches!(self, ColumnKind::Target | ColumnKind::Identifier)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ColumnKind::Continuous => "continuous",
            ColumnKind::Discrete => "discrete",
            ColumnKind::Nominal => "nominal",
            ColumnKind::Ordinal { .. } => "ordinal",
            ColumnKind::HighCardinality => "high_cardinality",
            ColumnKind::Target => "target",
            ColumnKind::Identifier => "identifier",
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
    /// Produced by feature engineering rather than read from input
    #[serde(default)]
    pub derived: bool,
}

/// Frozen column layout shared by every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    target: String,
    /// Raw columns that are recognised but discarded (configured drops and
    /// columns removed for excess missing values)
    ignored: Vec<String>,
}

impl Schema {
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn kind(&self, name: &str) -> Option<&ColumnKind> {
        self.get(name).map(|c| &c.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Feature columns (neither target nor identifier), in schema order.
    pub fn features(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.kind.is_feature())
    }

    /// Copy of the schema with the given columns moved to the ignored list.
    pub fn without(&self, dropped: &[String]) -> Schema {
        let mut ignored = self.ignored.clone();
        ignored.extend(dropped.iter().cloned());
        Schema {
            columns: self
                .columns
                .iter()
                .filter(|c| !dropped.contains(&c.name))
                .cloned()
                .collect(),
            target: self.target.clone(),
            ignored,
        }
    }

    /// Copy of the schema with engineered columns appended.
    pub fn with_derived(&self, derived: Vec<ColumnSpec>) -> Schema {
        let mut schema = self.clone();
        schema.columns.extend(derived);
        schema
    }

    /// Check rows against the schema and coerce each raw column to its kind.
    ///
    /// Input columns the schema does not know are rejected; a declared raw
    /// column missing from the input is rejected unless it is the target.
    /// Ignored columns are accepted and discarded.
    pub fn conform(&self, table: &Table) -> PipelineResult<Table> {
        for name in table.names() {
            if !self.contains(name) && !self.ignored.contains(name) {
                return Err(SchemaError::UnknownColumn(name.clone()).into());
            }
        }

        let mut conformed = Table::new();
        for spec in self.columns.iter().filter(|c| !c.derived) {
            if !table.contains(&spec.name) {
                if spec.kind == ColumnKind::Target {
                    continue;
                }
                return Err(SchemaError::MissingColumn(spec.name.clone()).into());
            }
            let data = if spec.kind.is_numeric() {
                ColumnData::Numeric(table.numeric(&spec.name)?)
            } else {
                ColumnData::Text(table.text(&spec.name)?)
            };
            conformed.push(spec.name.clone(), data)?;
        }
        Ok(conformed)
    }
}

fn distinct_text(values: &[Option<String>]) -> usize {
    values.iter().flatten().collect::<BTreeSet<_>>().len()
}

/// Classify every column of `table` using the hints in `config`.
///
/// Columns in `config.drop_columns` must already be absent; they are recorded
/// as ignored so that later inputs carrying them still conform.
pub fn classify(table: &Table, config: &PipelineConfig) -> PipelineResult<Schema> {
    if !table.contains(&config.target) {
        return Err(SchemaError::MissingColumn(config.target.clone()).into());
    }

    let hints = &config.schema;
    let mut columns = Vec::with_capacity(table.width());

    for name in table.names() {
        let kind = if *name == config.target {
            ColumnKind::Target
        } else if config.id_columns.contains(name) {
            ColumnKind::Identifier
        } else if let Some(levels) = hints.ordinal_levels.get(name) {
            ColumnKind::Ordinal {
                levels: levels.clone(),
            }
        } else if table.is_numeric(name) && !hints.force_nominal.contains(name) {
            let values: Vec<f64> = table.numeric(name)?.into_iter().flatten().collect();
            let integral = values.iter().all(|v| v.fract() == 0.0);
            let distinct = values
                .iter()
                .map(|v| v.to_bits())
                .collect::<BTreeSet<_>>()
                .len();
            if integral && distinct <= hints.discrete_max_levels {
                ColumnKind::Discrete
            } else {
                ColumnKind::Continuous
            }
        } else if distinct_text(&table.text(name)?) > hints.high_cardinality_threshold {
            ColumnKind::HighCardinality
        } else {
            ColumnKind::Nominal
        };

        tracing::debug!(column = %name, kind = %kind, "Classified column");
        columns.push(ColumnSpec {
            name: name.clone(),
            kind,
            derived: false,
        });
    }

    reclassify_numeric_ordinals(&mut columns, &hints.numeric_ordinals);

    Ok(Schema {
        columns,
        target: config.target.clone(),
        ignored: config.drop_columns.clone(),
    })
}

/// Turn numeric rating columns (e.g. quality 1-10) into ordinals over their
/// declared range, whatever kind inference assigned them.
pub fn reclassify_numeric_ordinals(
    columns: &mut [ColumnSpec],
    numeric_ordinals: &std::collections::BTreeMap<String, LevelRange>,
) {
    for spec in columns.iter_mut() {
        if let Some(range) = numeric_ordinals.get(&spec.name) {
            if !spec.kind.is_feature() {
                continue;
            }
            tracing::debug!(
                column = %spec.name,
                from = %spec.kind,
                min = range.min,
                max = range.max,
                "Reclassified numeric column as ordinal"
            );
            spec.kind = ColumnKind::Ordinal {
                levels: range.levels(),
            };
        }
    }
}
