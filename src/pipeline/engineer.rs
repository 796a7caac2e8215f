//! Derived features (ages from year pairs, weighted area and bathroom sums)

use super::config::{DerivedKind, EngineeringConfig, Formula};
use super::dataset::{ColumnData, Table};
use super::error::{PipelineError, PipelineResult};
use super::schema::{ColumnKind, ColumnSpec, Schema};

/// Check every derived feature against the imputed schema and return the
/// specs of the new columns. Sources must be numeric features of the schema.
pub fn plan(schema: &Schema, config: &EngineeringConfig) -> PipelineResult<Vec<ColumnSpec>> {
    let mut specs = Vec::with_capacity(config.features.len());
    for feature in &config.features {
        if schema.contains(&feature.name) || specs.iter().any(|s: &ColumnSpec| s.name == feature.name) {
            return Err(PipelineError::config(format!(
                "derived feature '{}' collides with an existing column",
                feature.name
            )));
        }
        for source in feature.formula.sources() {
            match schema.kind(source) {
                Some(kind) if kind.is_numeric() && kind.is_feature() => {}
                Some(kind) => {
                    return Err(PipelineError::config(format!(
                        "derived feature '{}' reads '{}', which is {} rather than numeric",
                        feature.name, source, kind
                    )))
                }
                None => {
                    return Err(PipelineError::config(format!(
                        "derived feature '{}' reads unknown or dropped column '{}'",
                        feature.name, source
                    )))
                }
            }
        }
        specs.push(ColumnSpec {
            name: feature.name.clone(),
            kind: match feature.kind {
                DerivedKind::Continuous => ColumnKind::Continuous,
                DerivedKind::Discrete => ColumnKind::Discrete,
            },
            derived: true,
        });
    }
    Ok(specs)
}

/// Source columns removed when `drop_sources` is set.
pub fn consumed_sources(config: &EngineeringConfig) -> Vec<String> {
    if !config.drop_sources {
        return Vec::new();
    }
    let mut sources: Vec<String> = Vec::new();
    for feature in &config.features {
        for source in feature.formula.sources() {
            if !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }
    }
    sources
}

/// Append the derived columns to an imputed table.
pub fn apply(table: &Table, config: &EngineeringConfig) -> PipelineResult<Table> {
    let mut out = table.clone();
    for feature in &config.features {
        let values: Vec<Option<f64>> = match &feature.formula {
            Formula::Age { year, reference } => {
                let year = table.numeric(year)?;
                let reference = table.numeric(reference)?;
                year.into_iter()
                    .zip(reference)
                    .map(|(y, r)| Some(r? - y?))
                    .collect()
            }
            Formula::WeightedSum { terms } => {
                let mut acc: Vec<Option<f64>> = vec![Some(0.0); table.height()];
                for term in terms {
                    for (sum, value) in acc.iter_mut().zip(table.numeric(&term.column)?) {
                        *sum = match (*sum, value) {
                            (Some(s), Some(v)) => Some(s + term.weight * v),
                            _ => None,
                        };
                    }
                }
                acc
            }
        };
        out.push(feature.name.clone(), ColumnData::Numeric(values))?;
    }
    for source in consumed_sources(config) {
        out.remove(&source);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{DerivedFeature, PipelineConfig, Term};
    use crate::pipeline::schema::classify;
    use polars::prelude::*;

    fn engineering() -> EngineeringConfig {
        EngineeringConfig {
            features: vec![
                DerivedFeature {
                    name: "age".to_string(),
                    kind: DerivedKind::Continuous,
                    formula: Formula::Age {
                        year: "built".to_string(),
                        reference: "sold".to_string(),
                    },
                },
                DerivedFeature {
                    name: "baths".to_string(),
                    kind: DerivedKind::Discrete,
                    formula: Formula::WeightedSum {
                        terms: vec![
                            Term {
                                column: "full".to_string(),
                                weight: 1.0,
                            },
                            Term {
                                column: "half".to_string(),
                                weight: 0.5,
                            },
                        ],
                    },
                },
            ],
            drop_sources: false,
        }
    }

    fn table() -> Table {
        let df = df! {
            "built" => [1990i64, 2005, 1960],
            "sold" => [2008i64, 2010, 2006],
            "full" => [2i64, 1, 3],
            "half" => [1i64, 0, 2],
            "zone" => ["RL", "RM", "RL"],
            "y" => [1.0f64, 2.0, 3.0],
        }
        .unwrap();
        Table::from_frame(&df, &[]).unwrap()
    }

    #[test]
    fn test_age_and_weighted_sum() {
        let out = apply(&table(), &engineering()).unwrap();
        assert_eq!(
            out.numeric("age").unwrap(),
            vec![Some(18.0), Some(5.0), Some(46.0)]
        );
        assert_eq!(
            out.numeric("baths").unwrap(),
            vec![Some(2.5), Some(1.0), Some(4.0)]
        );
        assert!(out.contains("built"));
    }

    #[test]
    fn test_drop_sources() {
        let mut config = engineering();
        config.drop_sources = true;
        let out = apply(&table(), &config).unwrap();
        assert!(!out.contains("built"));
        assert!(!out.contains("half"));
        assert!(out.contains("zone"));
    }

    #[test]
    fn test_plan_rejects_categorical_source() {
        let mut config = PipelineConfig::default();
        config.target = "y".to_string();
        let schema = classify(&table(), &config).unwrap();

        let mut engineering = engineering();
        assert_eq!(plan(&schema, &engineering).unwrap().len(), 2);

        engineering.features[0].formula = Formula::Age {
            year: "zone".to_string(),
            reference: "sold".to_string(),
        };
        assert!(plan(&schema, &engineering).is_err());
    }
}
