//! Pipeline configuration
//!
//! Every threshold and every per-column rule the pipeline applies lives here,
//! so the stages themselves stay generic. A configuration can be loaded from
//! JSON or built from the [`PipelineConfig::ames`] preset for the housing data.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Default missing-rate above which a column is dropped
pub const DEFAULT_MISSING_THRESHOLD: f64 = 0.5;

/// Default distinct-value count above which a text column is high cardinality
pub const DEFAULT_HIGH_CARDINALITY_THRESHOLD: usize = 10;

/// Default fit-set frequency at or below which a nominal category collapses
pub const DEFAULT_RARE_CATEGORY_THRESHOLD: f64 = 0.05;

/// Default absolute correlation above which one column of a pair is dropped
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.9;

/// Top-level configuration for a preprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the prediction target column
    pub target: String,
    /// Row identifier columns, carried through conformance but never features
    pub id_columns: Vec<String>,
    /// Text tokens treated as missing in addition to nulls and empty strings
    pub na_tokens: Vec<String>,
    /// Columns removed before classification
    pub drop_columns: Vec<String>,
    pub schema: SchemaConfig,
    pub imputation: ImputationConfig,
    pub engineering: EngineeringConfig,
    pub encoding: EncodingConfig,
    pub clipping: ClipConfig,
    pub normalize: NormalizeConfig,
    pub filter: FilterConfig,
    /// Centre and scale the final matrix with fit-set statistics
    pub standardize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: "SalePrice".to_string(),
            id_columns: Vec::new(),
            na_tokens: vec!["NA".to_string()],
            drop_columns: Vec::new(),
            schema: SchemaConfig::default(),
            imputation: ImputationConfig::default(),
            engineering: EngineeringConfig::default(),
            encoding: EncodingConfig::default(),
            clipping: ClipConfig::default(),
            normalize: NormalizeConfig::default(),
            filter: FilterConfig::default(),
            standardize: true,
        }
    }
}

/// Inclusive integer range used as the level list of a numeric ordinal column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRange {
    pub min: i64,
    pub max: i64,
}

impl LevelRange {
    pub fn levels(&self) -> Vec<String> {
        (self.min..=self.max).map(|v| v.to_string()).collect()
    }
}

/// Column classification hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub high_cardinality_threshold: usize,
    /// Integer-valued numeric columns with at most this many distinct values are discrete
    pub discrete_max_levels: usize,
    /// Ordered level lists for text ordinal columns, one list per column
    pub ordinal_levels: BTreeMap<String, Vec<String>>,
    /// Numeric columns reclassified as ordinal over a fixed integer range
    pub numeric_ordinals: BTreeMap<String, LevelRange>,
    /// Numeric columns that are really category codes
    pub force_nominal: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            high_cardinality_threshold: DEFAULT_HIGH_CARDINALITY_THRESHOLD,
            discrete_max_levels: 15,
            ordinal_levels: BTreeMap::new(),
            numeric_ordinals: BTreeMap::new(),
            force_nominal: Vec::new(),
        }
    }
}

/// A presence column and the columns that only have a value when it is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceGroup {
    pub presence: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Constant used by an explicit fill rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Number(f64),
    Text(String),
}

/// Nearest-neighbour imputation for a single continuous column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborConfig {
    pub column: String,
    #[serde(default = "default_neighbors")]
    pub k: usize,
    /// Encoded feature names used as the distance space
    pub predictors: Vec<String>,
}

fn default_neighbors() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    pub missing_threshold: f64,
    /// Label written into categorical columns whose feature is structurally absent
    pub absent_label: String,
    pub presence_groups: Vec<PresenceGroup>,
    pub constant_fills: BTreeMap<String, FillValue>,
    /// Numeric column -> categorical grouping key for grouped medians
    pub group_medians: BTreeMap<String, String>,
    pub deferred: Option<NeighborConfig>,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            missing_threshold: DEFAULT_MISSING_THRESHOLD,
            absent_label: "None".to_string(),
            presence_groups: Vec::new(),
            constant_fills: BTreeMap::new(),
            group_medians: BTreeMap::new(),
            deferred: None,
        }
    }
}

/// Kind assigned to an engineered column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedKind {
    Continuous,
    Discrete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub column: String,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    /// `reference - year`, e.g. years between construction and sale
    Age { year: String, reference: String },
    WeightedSum { terms: Vec<Term> },
}

impl Formula {
    pub fn sources(&self) -> Vec<&str> {
        match self {
            Formula::Age { year, reference } => vec![year.as_str(), reference.as_str()],
            Formula::WeightedSum { terms } => terms.iter().map(|t| t.column.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeature {
    pub name: String,
    pub kind: DerivedKind,
    pub formula: Formula,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineeringConfig {
    pub features: Vec<DerivedFeature>,
    /// Remove the source columns of every derived feature
    pub drop_sources: bool,
}

/// How strongly high-cardinality category means are pulled toward the global mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Shrinkage {
    /// `k = within-category variance / between-category variance`
    MixedEffects,
    /// Fixed pseudo-count `k` in `n / (n + k)`
    Fixed { k: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub rare_category_threshold: f64,
    pub other_label: String,
    pub shrinkage: Shrinkage,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            rare_category_threshold: DEFAULT_RARE_CATEGORY_THRESHOLD,
            other_label: "other".to_string(),
            shrinkage: Shrinkage::MixedEffects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    pub enabled: bool,
    pub iqr_factor: f64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iqr_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub enabled: bool,
    /// Yeo-Johnson lambda search interval
    pub lambda_min: f64,
    pub lambda_max: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lambda_min: -2.0,
            lambda_max: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Ratio of most to second most common value above which a column is near-zero variance
    pub nzv_freq_cut: f64,
    /// Percentage of distinct values below which a column is near-zero variance
    pub nzv_unique_cut: f64,
    pub correlation_threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            nzv_freq_cut: 95.0 / 5.0,
            nzv_unique_cut: 10.0,
            correlation_threshold: DEFAULT_CORRELATION_THRESHOLD,
        }
    }
}

fn check_unit_interval(name: &str, value: f64) -> PipelineResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::config(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )));
    }
    Ok(())
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every threshold and cross-reference before any data is touched.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.target.trim().is_empty() {
            return Err(PipelineError::config("target column name is empty"));
        }
        check_unit_interval("missing_threshold", self.imputation.missing_threshold)?;
        check_unit_interval(
            "rare_category_threshold",
            self.encoding.rare_category_threshold,
        )?;
        check_unit_interval("correlation_threshold", self.filter.correlation_threshold)?;

        if self.schema.high_cardinality_threshold == 0 {
            return Err(PipelineError::config(
                "high_cardinality_threshold must be at least 1",
            ));
        }
        if !(self.clipping.iqr_factor.is_finite() && self.clipping.iqr_factor > 0.0) {
            return Err(PipelineError::config(format!(
                "iqr_factor must be positive, got {}",
                self.clipping.iqr_factor
            )));
        }
        if self.filter.nzv_freq_cut < 1.0 {
            return Err(PipelineError::config(format!(
                "nzv_freq_cut must be at least 1.0, got {}",
                self.filter.nzv_freq_cut
            )));
        }
        if !(0.0..=100.0).contains(&self.filter.nzv_unique_cut) {
            return Err(PipelineError::config(format!(
                "nzv_unique_cut must be between 0 and 100, got {}",
                self.filter.nzv_unique_cut
            )));
        }
        if self.normalize.lambda_min >= self.normalize.lambda_max {
            return Err(PipelineError::config(format!(
                "lambda_min ({}) must be below lambda_max ({})",
                self.normalize.lambda_min, self.normalize.lambda_max
            )));
        }
        if let Shrinkage::Fixed { k } = self.encoding.shrinkage {
            if !(k.is_finite() && k >= 0.0) {
                return Err(PipelineError::config(format!(
                    "fixed shrinkage k must be non-negative, got {}",
                    k
                )));
            }
        }
        if let Some(deferred) = &self.imputation.deferred {
            if deferred.k == 0 {
                return Err(PipelineError::config("nearest-neighbour k must be at least 1"));
            }
            if deferred.predictors.is_empty() {
                return Err(PipelineError::config(format!(
                    "deferred column '{}' declares no predictors",
                    deferred.column
                )));
            }
            if deferred.predictors.contains(&deferred.column) {
                return Err(PipelineError::config(format!(
                    "deferred column '{}' cannot predict itself",
                    deferred.column
                )));
            }
            let used_by_engineering = self
                .engineering
                .features
                .iter()
                .any(|f| f.formula.sources().contains(&deferred.column.as_str()));
            if used_by_engineering {
                return Err(PipelineError::config(format!(
                    "deferred column '{}' is imputed after feature engineering and cannot be a derived-feature source",
                    deferred.column
                )));
            }
            if self.imputation.group_medians.contains_key(&deferred.column)
                || self.imputation.constant_fills.contains_key(&deferred.column)
            {
                return Err(PipelineError::config(format!(
                    "column '{}' has more than one imputation rule",
                    deferred.column
                )));
            }
        }
        for (column, by) in &self.imputation.group_medians {
            if self.imputation.constant_fills.contains_key(column) {
                return Err(PipelineError::config(format!(
                    "column '{}' has more than one imputation rule",
                    column
                )));
            }
            if column == by {
                return Err(PipelineError::config(format!(
                    "column '{}' cannot be grouped by itself",
                    column
                )));
            }
        }
        for (column, levels) in &self.schema.ordinal_levels {
            if levels.is_empty() {
                return Err(PipelineError::config(format!(
                    "ordinal column '{}' declares no levels",
                    column
                )));
            }
        }
        for (column, range) in &self.schema.numeric_ordinals {
            if range.min > range.max {
                return Err(PipelineError::config(format!(
                    "numeric ordinal '{}' has an empty range {}..={}",
                    column, range.min, range.max
                )));
            }
        }
        Ok(())
    }

    /// Preset describing the Ames housing dataset.
    pub fn ames() -> Self {
        let quality: Vec<String> = ["None", "Po", "Fa", "TA", "Gd", "Ex"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let levels = |values: &[&str]| values.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut ordinal_levels = BTreeMap::new();
        for column in [
            "ExterQual",
            "ExterCond",
            "BsmtQual",
            "BsmtCond",
            "HeatingQC",
            "KitchenQual",
            "FireplaceQu",
            "GarageQual",
            "GarageCond",
            "PoolQC",
        ] {
            ordinal_levels.insert(column.to_string(), quality.clone());
        }
        ordinal_levels.insert(
            "BsmtExposure".to_string(),
            levels(&["None", "No", "Mn", "Av", "Gd"]),
        );
        for column in ["BsmtFinType1", "BsmtFinType2"] {
            ordinal_levels.insert(
                column.to_string(),
                levels(&["None", "Unf", "LwQ", "Rec", "BLQ", "ALQ", "GLQ"]),
            );
        }
        ordinal_levels.insert(
            "GarageFinish".to_string(),
            levels(&["None", "Unf", "RFn", "Fin"]),
        );
        ordinal_levels.insert(
            "Functional".to_string(),
            levels(&["Sal", "Sev", "Maj2", "Maj1", "Mod", "Min2", "Min1", "Typ"]),
        );
        ordinal_levels.insert("LotShape".to_string(), levels(&["IR3", "IR2", "IR1", "Reg"]));
        ordinal_levels.insert("LandSlope".to_string(), levels(&["Sev", "Mod", "Gtl"]));
        ordinal_levels.insert("PavedDrive".to_string(), levels(&["N", "P", "Y"]));
        ordinal_levels.insert("CentralAir".to_string(), levels(&["N", "Y"]));

        let mut numeric_ordinals = BTreeMap::new();
        for column in ["OverallQual", "OverallCond"] {
            numeric_ordinals.insert(column.to_string(), LevelRange { min: 1, max: 10 });
        }

        let group = |presence: &str, members: &[&str]| PresenceGroup {
            presence: presence.to_string(),
            members: levels(members),
        };
        let presence_groups = vec![
            group(
                "GarageType",
                &["GarageFinish", "GarageQual", "GarageCond", "GarageCars", "GarageArea"],
            ),
            group(
                "BsmtQual",
                &[
                    "BsmtCond",
                    "BsmtExposure",
                    "BsmtFinType1",
                    "BsmtFinType2",
                    "BsmtFinSF1",
                    "BsmtFinSF2",
                    "BsmtUnfSF",
                    "TotalBsmtSF",
                    "BsmtFullBath",
                    "BsmtHalfBath",
                ],
            ),
            group("MasVnrType", &["MasVnrArea"]),
            group("FireplaceQu", &[]),
        ];

        let term = |column: &str, weight: f64| Term {
            column: column.to_string(),
            weight,
        };
        let features = vec![
            DerivedFeature {
                name: "TotalSF".to_string(),
                kind: DerivedKind::Continuous,
                formula: Formula::WeightedSum {
                    terms: vec![
                        term("TotalBsmtSF", 1.0),
                        term("1stFlrSF", 1.0),
                        term("2ndFlrSF", 1.0),
                    ],
                },
            },
            DerivedFeature {
                name: "TotalBath".to_string(),
                kind: DerivedKind::Discrete,
                formula: Formula::WeightedSum {
                    terms: vec![
                        term("FullBath", 1.0),
                        term("HalfBath", 0.5),
                        term("BsmtFullBath", 1.0),
                        term("BsmtHalfBath", 0.5),
                    ],
                },
            },
            DerivedFeature {
                name: "TotalPorchSF".to_string(),
                kind: DerivedKind::Continuous,
                formula: Formula::WeightedSum {
                    terms: vec![
                        term("WoodDeckSF", 1.0),
                        term("OpenPorchSF", 1.0),
                        term("EnclosedPorch", 1.0),
                        term("3SsnPorch", 1.0),
                        term("ScreenPorch", 1.0),
                    ],
                },
            },
            DerivedFeature {
                name: "HouseAge".to_string(),
                kind: DerivedKind::Continuous,
                formula: Formula::Age {
                    year: "YearBuilt".to_string(),
                    reference: "YrSold".to_string(),
                },
            },
            DerivedFeature {
                name: "RemodAge".to_string(),
                kind: DerivedKind::Continuous,
                formula: Formula::Age {
                    year: "YearRemodAdd".to_string(),
                    reference: "YrSold".to_string(),
                },
            },
        ];

        Self {
            target: "SalePrice".to_string(),
            id_columns: vec!["Id".to_string()],
            drop_columns: vec!["GarageYrBlt".to_string()],
            schema: SchemaConfig {
                ordinal_levels,
                numeric_ordinals,
                force_nominal: vec!["MSSubClass".to_string()],
                ..SchemaConfig::default()
            },
            imputation: ImputationConfig {
                presence_groups,
                deferred: Some(NeighborConfig {
                    column: "LotFrontage".to_string(),
                    k: 5,
                    predictors: levels(&["LotArea", "GrLivArea", "Neighborhood", "OverallQual"]),
                }),
                ..ImputationConfig::default()
            },
            engineering: EngineeringConfig {
                features,
                drop_sources: false,
            },
            ..Self::default()
        }
    }
}
