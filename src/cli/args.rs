//! Command-line argument definitions using clap

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::pipeline::PipelineConfig;

/// hearth - Fit-once, transform-many preprocessing for housing price data
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Skip interactive confirmation prompts (e.g. before overwriting files)
    #[arg(long, global = true, default_value = "false")]
    pub no_confirm: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit the pipeline on a training file and write the feature matrix
    Fit(FitArgs),

    /// Transform new rows with a previously fitted pipeline
    Transform(TransformArgs),

    /// Cross-validate an elastic-net model over the preprocessing pipeline
    Cv(CvArgs),
}

/// Built-in configuration presets
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Ames housing schema: ordinal ratings, presence groups, derived areas
    Ames,
    /// No schema hints; every column is classified from the data
    Generic,
}

/// Settings shared by every subcommand that fits a pipeline
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// JSON configuration file. Replaces the preset when given.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Built-in configuration preset
    #[arg(long, value_enum, default_value = "ames")]
    pub preset: Preset,

    /// Target column name (overrides the configuration)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Drop columns whose missing ratio on the fit set is above this value
    #[arg(long, value_parser = validate_unit_interval)]
    pub missing_threshold: Option<f64>,

    /// Collapse nominal categories whose fit-set frequency is at or below this value
    #[arg(long, value_parser = validate_unit_interval)]
    pub rare_threshold: Option<f64>,

    /// Drop a feature correlated above this value with an already kept feature
    #[arg(long, value_parser = validate_unit_interval)]
    pub correlation_threshold: Option<f64>,

    /// IQR multiplier for outlier clipping bounds
    #[arg(long, value_parser = validate_positive)]
    pub iqr_factor: Option<f64>,

    /// Columns to drop before processing (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub drop_columns: Vec<String>,

    /// Keep features on their natural scale instead of standardizing them
    #[arg(long, default_value = "false")]
    pub no_standardize: bool,
}

impl PipelineArgs {
    /// Resolve preset or file, apply command-line overrides, and validate.
    pub fn build_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => match self.preset {
                Preset::Ames => PipelineConfig::ames(),
                Preset::Generic => PipelineConfig::default(),
            },
        };

        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(v) = self.missing_threshold {
            config.imputation.missing_threshold = v;
        }
        if let Some(v) = self.rare_threshold {
            config.encoding.rare_category_threshold = v;
        }
        if let Some(v) = self.correlation_threshold {
            config.filter.correlation_threshold = v;
        }
        if let Some(v) = self.iqr_factor {
            config.clipping.iqr_factor = v;
        }
        for column in &self.drop_columns {
            if !config.drop_columns.contains(column) {
                config.drop_columns.push(column.clone());
            }
        }
        if self.no_standardize {
            config.standardize = false;
        }

        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct FitArgs {
    /// Training file (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Feature matrix output (CSV or Parquet, by extension).
    /// Defaults to the input directory with a '_matrix' suffix.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Where to save the fitted pipeline (JSON).
    /// Defaults to the input directory with a '_pipeline.json' suffix.
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Also write a JSON fit report next to the output
    #[arg(long, default_value = "false")]
    pub report: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl FitArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derived_path(&self.input, "matrix", None))
    }

    pub fn state_path(&self) -> PathBuf {
        self.state
            .clone()
            .unwrap_or_else(|| derived_path(&self.input, "pipeline", Some("json")))
    }

    pub fn report_path(&self) -> PathBuf {
        derived_path(&self.input, "fit_report", Some("json"))
    }
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Fitted pipeline saved by `hearth fit`
    #[arg(short, long)]
    pub state: PathBuf,

    /// Rows to transform (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Feature matrix output. Defaults to the input directory with a '_matrix' suffix.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl TransformArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derived_path(&self.input, "matrix", None))
    }
}

#[derive(Args, Debug)]
pub struct CvArgs {
    /// Training file (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of folds
    #[arg(long, default_value = "5", value_parser = validate_folds)]
    pub folds: usize,

    /// Seed for the fold assignment
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Elastic-net penalty strengths to search (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "0.0005,0.001,0.005")]
    pub alpha: Vec<f64>,

    /// Elastic-net L1 ratios to search (comma-separated, each in [0, 1])
    #[arg(long, value_delimiter = ',', default_value = "0.5", value_parser = validate_unit_interval)]
    pub l1_ratio: Vec<f64>,

    /// Write the ranked results as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Sibling of `input` named `<stem>_<suffix>.<ext>`; the extension defaults to the input's.
fn derived_path(input: &Path, suffix: &str, extension: Option<&str>) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = extension
        .or_else(|| input.extension().and_then(|e| e.to_str()))
        .unwrap_or("csv");
    parent.join(format!("{}_{}.{}", stem, suffix, extension))
}

/// Validator for ratio and threshold parameters
fn validate_unit_interval(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if !(0.0..=1.0).contains(&value) {
        Err(format!("value must be between 0.0 and 1.0, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for the IQR factor
fn validate_positive(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("value must be positive, got {}", value))
    }
}

/// Validator for the fold count
fn validate_folds(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid fold count", s))?;

    if value < 2 {
        Err(format!("at least 2 folds are required, got {}", value))
    } else {
        Ok(value)
    }
}
