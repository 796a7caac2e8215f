//! Skewness-reducing transforms for continuous features
//!
//! For each continuous column the fit set picks the family with the smallest
//! absolute skewness. Log and square root are only candidates when the fit
//! minimum is non-negative; Yeo-Johnson accepts any sign.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::NormalizeConfig;
use super::error::{PipelineResult, SchemaError};
use super::matrix::Feature;
use super::stats::skewness;

/// Step of the coarse Yeo-Johnson lambda grid
const LAMBDA_STEP: f64 = 0.1;
/// Iterations of golden-section refinement around the best grid point
const GOLDEN_ITERATIONS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Transform {
    Identity,
    Log1p,
    Sqrt,
    YeoJohnson { lambda: f64 },
}

impl Transform {
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Transform::Identity => x,
            Transform::Log1p => x.max(0.0).ln_1p(),
            Transform::Sqrt => x.max(0.0).sqrt(),
            Transform::YeoJohnson { lambda } => yeo_johnson(x, lambda),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Transform::Identity => "identity".to_string(),
            Transform::Log1p => "log1p".to_string(),
            Transform::Sqrt => "sqrt".to_string(),
            Transform::YeoJohnson { lambda } => format!("yeo-johnson(λ={:.3})", lambda),
        }
    }
}

pub fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    const EPS: f64 = 1e-12;
    if x >= 0.0 {
        if lambda.abs() < EPS {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < EPS {
        -(-x).ln_1p()
    } else {
        -((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    }
}

/// |skewness| after applying a transform; non-finite output scores infinity.
fn score(values: &[f64], transform: Transform) -> f64 {
    let out: Vec<f64> = values.iter().map(|&v| transform.apply(v)).collect();
    if out.iter().any(|v| !v.is_finite()) {
        return f64::INFINITY;
    }
    skewness(&out).abs()
}

/// Best Yeo-Johnson lambda on `[lo, hi]`: grid search, then golden-section
/// refinement in the bracket around the best grid point.
pub fn fit_yeo_johnson(values: &[f64], lo: f64, hi: f64) -> f64 {
    let objective = |lambda: f64| score(values, Transform::YeoJohnson { lambda });

    let steps = ((hi - lo) / LAMBDA_STEP).round().max(1.0) as usize;
    let mut best = lo;
    let mut best_score = f64::INFINITY;
    for i in 0..=steps {
        let lambda = lo + (hi - lo) * i as f64 / steps as f64;
        let s = objective(lambda);
        if s < best_score {
            best = lambda;
            best_score = s;
        }
    }

    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut a = (best - LAMBDA_STEP).max(lo);
    let mut b = (best + LAMBDA_STEP).min(hi);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let (mut fc, mut fd) = (objective(c), objective(d));
    for _ in 0..GOLDEN_ITERATIONS {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = objective(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = objective(d);
        }
    }
    let refined = (a + b) / 2.0;
    if objective(refined) < best_score {
        refined
    } else {
        best
    }
}

/// Chosen transform for one column with its fit-set skewness before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransform {
    pub column: String,
    pub transform: Transform,
    pub skew_before: f64,
    pub skew_after: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeState {
    pub columns: Vec<ColumnTransform>,
}

impl NormalizeState {
    pub fn get(&self, column: &str) -> Option<&Transform> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.transform)
    }
}

/// Pick the least-skewed family for one column. Earlier candidates win ties.
pub fn choose_transform(values: &[f64], config: &NormalizeConfig) -> Transform {
    let non_negative = values.iter().all(|&v| v >= 0.0);
    let mut candidates = vec![Transform::Identity];
    if non_negative {
        candidates.push(Transform::Log1p);
        candidates.push(Transform::Sqrt);
    }
    candidates.push(Transform::YeoJohnson {
        lambda: fit_yeo_johnson(values, config.lambda_min, config.lambda_max),
    });

    let mut best = Transform::Identity;
    let mut best_score = f64::INFINITY;
    for candidate in candidates {
        let s = score(values, candidate);
        if s < best_score {
            best = candidate;
            best_score = s;
        }
    }
    best
}

pub fn fit(features: &[Feature], continuous: &[String], config: &NormalizeConfig) -> NormalizeState {
    if !config.enabled {
        return NormalizeState::default();
    }

    let columns: Vec<ColumnTransform> = features
        .par_iter()
        .filter(|f| continuous.contains(&f.name))
        .map(|f| {
            let transform = choose_transform(&f.values, config);
            ColumnTransform {
                column: f.name.clone(),
                transform,
                skew_before: skewness(&f.values),
                skew_after: score(&f.values, transform),
            }
        })
        .collect();

    for c in &columns {
        tracing::info!(
            column = %c.column,
            transform = %c.transform.label(),
            skew_before = c.skew_before,
            skew_after = c.skew_after,
            "Selected normalizing transform"
        );
    }

    NormalizeState { columns }
}

pub fn apply(features: &mut [Feature], state: &NormalizeState) -> PipelineResult<()> {
    for c in &state.columns {
        let feature = features
            .iter_mut()
            .find(|f| f.name == c.column)
            .ok_or_else(|| SchemaError::MissingColumn(c.column.clone()))?;
        for value in feature.values.iter_mut() {
            *value = c.transform.apply(*value);
        }
    }
    Ok(())
}
