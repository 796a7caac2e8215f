//! Pipeline orchestration
//!
//! [`FittedPipeline::fit`] learns every stage on one fit set, in order:
//! classify, impute, engineer, encode, nearest-neighbour fill, clip,
//! normalize, filter, scale. Each stage is fitted on the output of the
//! previous stages and immediately applied to the fit set with its frozen
//! state, so the fit set goes through exactly the same code path as any
//! later input. [`Pipeline`] wraps a fitted pipeline in a small state machine.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use super::config::PipelineConfig;
use super::dataset::Table;
use super::encoding::{self, EncodingState};
use super::engineer;
use super::error::{PipelineError, PipelineResult, PipelineWarning};
use super::filter::{self, FilterState};
use super::impute::{self, ImputationState};
use super::matrix::{Feature, FeatureMatrix};
use super::neighbors::{self, NeighborState};
use super::normalize::{self, NormalizeState};
use super::outliers::{self, OutlierState};
use super::scale::{self, ScaleState};
use super::schema::{classify, ColumnKind, Schema};
use super::target::TargetTransform;

/// Output of a transform pass.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub matrix: FeatureMatrix,
    /// Transformed target, when the input carried one
    pub target: Option<Vec<f64>>,
    pub warnings: Vec<PipelineWarning>,
}

/// Every artifact learned at fit time. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    version: String,
    config: PipelineConfig,
    /// Schema of the raw input, as classified on the fit set
    schema: Schema,
    /// Schema seen by the encoder: imputation drops removed, derived columns added
    feature_schema: Schema,
    imputation: ImputationState,
    encoding: EncodingState,
    neighbors: Option<NeighborState>,
    outliers: OutlierState,
    normalize: NormalizeState,
    filter: FilterState,
    scale: ScaleState,
    target_transform: TargetTransform,
    fit_rows: usize,
}

/// Intermediate result shared by fit and transform.
struct Encoded {
    features: Vec<Feature>,
    warnings: Vec<PipelineWarning>,
}

impl FittedPipeline {
    /// Fit on a polars frame holding the fit set (target included).
    pub fn fit(config: PipelineConfig, df: &DataFrame) -> PipelineResult<Self> {
        let table = Table::from_frame(df, &config.na_tokens)?;
        Self::fit_table(config, &table)
    }

    /// Fit on a table holding the fit set (target included).
    pub fn fit_table(config: PipelineConfig, table: &Table) -> PipelineResult<Self> {
        config.validate()?;

        let mut raw = table.clone();
        for name in &config.drop_columns {
            raw.remove(name);
        }

        let schema = classify(&raw, &config)?;
        let conformed = schema.conform(&raw)?;
        let target_transform = TargetTransform::default();
        let y = target_transform.forward(&config.target, &conformed.numeric(&config.target)?)?;

        let imputation = impute::fit(&conformed, &schema, &config)?;
        let base = schema.without(&imputation.dropped_names());
        let imputed = impute::apply(&conformed, &base, &imputation)?;

        let derived = engineer::plan(&base, &config.engineering)?;
        let feature_schema = base
            .with_derived(derived)
            .without(&engineer::consumed_sources(&config.engineering));
        let engineered = engineer::apply(&imputed, &config.engineering)?;

        let features_only = feature_table(&engineered, &feature_schema);
        let encoding = encoding::fit(&features_only, &y, &feature_schema, &config.encoding)?;
        let deferred = imputation.deferred_column();
        let out = encoding::apply(&features_only, &encoding, deferred)?;

        let mut features = out.features;
        let neighbors = match (&config.imputation.deferred, deferred) {
            (Some(neighbor_config), Some(_)) => {
                let state = neighbors::fit(&features, out.pending.as_ref(), neighbor_config)?;
                if let Some(pending) = out.pending {
                    state.apply(&mut features, pending)?;
                }
                Some(state)
            }
            _ => None,
        };

        let continuous = continuous_features(&features, &feature_schema);
        let outliers = outliers::fit(&features, &continuous, &config.clipping);
        let clipped = outliers::apply(&mut features, &outliers)?;
        tracing::debug!(values = clipped, "Clipped fit-set outliers");

        let normalize = normalize::fit(&features, &continuous, &config.normalize);
        normalize::apply(&mut features, &normalize)?;

        let filter = filter::fit(&features, &config.filter);
        let features = filter::apply(features, &filter)?;

        let scale = scale::fit(&features, config.standardize);

        tracing::info!(
            rows = table.height(),
            input_columns = table.width(),
            features = filter.kept.len(),
            dropped = filter.dropped.len() + imputation.dropped.len(),
            "Fitted preprocessing pipeline"
        );

        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            fit_rows: table.height(),
            config,
            schema,
            feature_schema,
            imputation,
            encoding,
            neighbors,
            outliers,
            normalize,
            filter,
            scale,
            target_transform,
        })
    }

    /// Fit, then transform the same rows.
    pub fn fit_transform(config: PipelineConfig, df: &DataFrame) -> PipelineResult<(Self, Transformed)> {
        let fitted = Self::fit(config, df)?;
        let transformed = fitted.transform(df)?;
        Ok((fitted, transformed))
    }

    /// Transform new rows with the frozen state.
    pub fn transform(&self, df: &DataFrame) -> PipelineResult<Transformed> {
        let table = Table::from_frame(df, &self.config.na_tokens)?;
        self.transform_table(&table)
    }

    pub fn transform_table(&self, table: &Table) -> PipelineResult<Transformed> {
        let conformed = self.schema.conform(table)?;

        // Only a fully labelled input yields a target; partial labels are ignored.
        let target = match conformed.numeric(&self.config.target) {
            Ok(values) if values.iter().all(Option::is_some) && !values.is_empty() => {
                Some(self.target_transform.forward(&self.config.target, &values)?)
            }
            Ok(values) => {
                let labelled = values.iter().filter(|v| v.is_some()).count();
                if labelled > 0 {
                    tracing::debug!(
                        column = %self.config.target,
                        labelled,
                        rows = values.len(),
                        "Target is partly missing; returning no transformed target"
                    );
                }
                None
            }
            Err(_) => None,
        };

        let Encoded {
            mut features,
            warnings,
        } = self.encode(&conformed)?;

        outliers::apply(&mut features, &self.outliers)?;
        normalize::apply(&mut features, &self.normalize)?;
        let mut features = filter::apply(features, &self.filter)?;
        scale::apply(&mut features, &self.scale)?;

        Ok(Transformed {
            matrix: FeatureMatrix::from_features(&features, conformed.height()),
            target,
            warnings,
        })
    }

    fn encode(&self, conformed: &Table) -> PipelineResult<Encoded> {
        let base = self.schema.without(&self.imputation.dropped_names());
        let imputed = impute::apply(conformed, &base, &self.imputation)?;
        let engineered = engineer::apply(&imputed, &self.config.engineering)?;

        let features_only = feature_table(&engineered, &self.feature_schema);
        let deferred = self.neighbors.as_ref().map(|n| n.column.as_str());
        let out = encoding::apply(&features_only, &self.encoding, deferred)?;

        let mut features = out.features;
        if let Some(pending) = out.pending {
            let state = self.neighbors.as_ref().ok_or_else(|| {
                PipelineError::config(format!("no nearest-neighbour state for '{}'", pending.name))
            })?;
            state.apply(&mut features, pending)?;
        }

        Ok(Encoded {
            features,
            warnings: out.warnings,
        })
    }

    /// Map transformed-scale target values (e.g. model predictions) back to prices.
    pub fn inverse_transform_target(&self, values: &[f64]) -> Vec<f64> {
        self.target_transform.inverse(values)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn feature_schema(&self) -> &Schema {
        &self.feature_schema
    }

    pub fn imputation(&self) -> &ImputationState {
        &self.imputation
    }

    pub fn encoding(&self) -> &EncodingState {
        &self.encoding
    }

    pub fn neighbors(&self) -> Option<&NeighborState> {
        self.neighbors.as_ref()
    }

    pub fn outliers(&self) -> &OutlierState {
        &self.outliers
    }

    pub fn normalization(&self) -> &NormalizeState {
        &self.normalize
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn scaling(&self) -> &ScaleState {
        &self.scale
    }

    /// Output column names in matrix order.
    pub fn output_names(&self) -> &[String] {
        &self.filter.kept
    }

    pub fn fit_rows(&self) -> usize {
        self.fit_rows
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Engineered table restricted to feature columns (no target, no identifiers).
fn feature_table(table: &Table, schema: &Schema) -> Table {
    let mut out = table.clone();
    for spec in schema.columns().iter().filter(|c| !c.kind.is_feature()) {
        out.remove(&spec.name);
    }
    out
}

/// Encoded features that carry a continuous column through unchanged.
fn continuous_features(features: &[Feature], schema: &Schema) -> Vec<String> {
    features
        .iter()
        .filter(|f| f.name == f.source && schema.kind(&f.name) == Some(&ColumnKind::Continuous))
        .map(|f| f.name.clone())
        .collect()
}

/// Lifecycle of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unfit,
    /// Held for the duration of [`Pipeline::fit`]. The fit borrows the
    /// pipeline mutably, so [`Pipeline::state`] never reports it.
    Fitting,
    Fit,
    Transforming,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineState::Unfit => "unfit",
            PipelineState::Fitting => "fitting",
            PipelineState::Fit => "fit",
            PipelineState::Transforming => "transforming",
        };
        write!(f, "{}", label)
    }
}

/// Stateful wrapper enforcing fit-before-transform and fit-once.
///
/// `transform` takes `&self`, so a fitted pipeline can serve concurrent
/// transforms; the fitted state is never mutated after `fit` returns.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    fitted: Option<FittedPipeline>,
    active_transforms: AtomicUsize,
}

struct ActiveTransform<'a>(&'a AtomicUsize);

impl Drop for ActiveTransform<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fitted: None,
            active_transforms: AtomicUsize::new(0),
        }
    }

    pub fn from_fitted(fitted: FittedPipeline) -> Self {
        Self {
            config: fitted.config().clone(),
            fitted: Some(fitted),
            active_transforms: AtomicUsize::new(0),
        }
    }

    /// Current state: unfit, fit, or transforming while any transform is running.
    pub fn state(&self) -> PipelineState {
        if self.fitted.is_none() {
            PipelineState::Unfit
        } else if self.active_transforms.load(Ordering::SeqCst) > 0 {
            PipelineState::Transforming
        } else {
            PipelineState::Fit
        }
    }

    /// Fit on the given rows. A failed fit leaves the pipeline unfit.
    pub fn fit(&mut self, df: &DataFrame) -> PipelineResult<&FittedPipeline> {
        if self.fitted.is_some() {
            return Err(PipelineError::AlreadyFitted);
        }
        tracing::debug!(state = %PipelineState::Fitting, rows = df.height(), "Fitting pipeline");
        match FittedPipeline::fit(self.config.clone(), df) {
            Ok(fitted) => {
                tracing::debug!(state = %PipelineState::Fit, "Pipeline fitted");
                Ok(self.fitted.insert(fitted))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Fit failed; pipeline remains unfit");
                Err(e)
            }
        }
    }

    pub fn transform(&self, df: &DataFrame) -> PipelineResult<Transformed> {
        let fitted = self.fitted.as_ref().ok_or(PipelineError::NotFitted)?;
        self.active_transforms.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveTransform(&self.active_transforms);
        fitted.transform(df)
    }

    pub fn inverse_transform_target(&self, values: &[f64]) -> PipelineResult<Vec<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PipelineError::NotFitted)?;
        Ok(fitted.inverse_transform_target(values))
    }

    /// Discard fitted state so the pipeline can be fitted again.
    pub fn reset(&mut self) {
        self.fitted = None;
    }

    pub fn fitted(&self) -> Option<&FittedPipeline> {
        self.fitted.as_ref()
    }
}
