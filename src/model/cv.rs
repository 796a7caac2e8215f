//! K-fold cross-validation and elastic-net grid search
//!
//! Every fold fits its own pipeline on the fold's training rows only, so no
//! holdout statistic reaches imputation, encoding, clipping or scaling.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{rmse, ElasticNet, ElasticNetParams, ModelError, ModelResult, Regressor};
use crate::pipeline::{FittedPipeline, PipelineConfig, PipelineError, Table};

/// Seeded k-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
    pub shuffle: bool,
}

impl Default for KFold {
    fn default() -> Self {
        Self {
            n_splits: 5,
            seed: 42,
            shuffle: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub holdout: Vec<usize>,
}

impl Fold {
    /// Reject a fold whose training and holdout rows overlap.
    pub fn check_disjoint(&self) -> Result<(), PipelineError> {
        let train: HashSet<usize> = self.train.iter().copied().collect();
        if let Some(row) = self.holdout.iter().find(|r| train.contains(r)) {
            return Err(PipelineError::leakage(format!(
                "row {} appears in both the training and holdout rows of a fold",
                row
            )));
        }
        Ok(())
    }
}

impl KFold {
    /// Assign `n` rows to folds. Fold sizes differ by at most one row.
    pub fn split(&self, n: usize) -> ModelResult<Vec<Fold>> {
        if self.n_splits < 2 || self.n_splits > n {
            return Err(ModelError::InvalidParams(format!(
                "cannot make {} folds from {} rows",
                self.n_splits, n
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }

        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for k in 0..self.n_splits {
            let size = base + usize::from(k < extra);
            let mut holdout = order[start..start + size].to_vec();
            holdout.sort_unstable();
            let mut train: Vec<usize> = order[..start]
                .iter()
                .chain(&order[start + size..])
                .copied()
                .collect();
            train.sort_unstable();
            folds.push(Fold { train, holdout });
            start += size;
        }
        Ok(folds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub fold: usize,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub features: usize,
    /// RMSE on the transformed (log) target scale
    pub rmse_log: f64,
    /// RMSE after mapping predictions back to prices
    pub rmse_price: f64,
    pub unseen_warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    pub folds: Vec<FoldScore>,
    pub mean_rmse_log: f64,
    pub std_rmse_log: f64,
    pub mean_rmse_price: f64,
}

impl CvReport {
    fn from_scores(folds: Vec<FoldScore>) -> Self {
        let n = folds.len().max(1) as f64;
        let mean_rmse_log = folds.iter().map(|f| f.rmse_log).sum::<f64>() / n;
        let std_rmse_log = (folds
            .iter()
            .map(|f| (f.rmse_log - mean_rmse_log).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();
        let mean_rmse_price = folds.iter().map(|f| f.rmse_price).sum::<f64>() / n;
        Self {
            folds,
            mean_rmse_log,
            std_rmse_log,
            mean_rmse_price,
        }
    }
}

fn evaluate_fold<R, F>(
    index: usize,
    fold: &Fold,
    config: &PipelineConfig,
    table: &Table,
    make_model: &F,
) -> ModelResult<FoldScore>
where
    R: Regressor,
    F: Fn() -> R + Sync,
{
    fold.check_disjoint()?;

    let train = table.select_rows(&fold.train);
    let holdout = table.select_rows(&fold.holdout);

    let pipeline = FittedPipeline::fit_table(config.clone(), &train)?;
    let train_out = pipeline.transform_table(&train)?;
    let holdout_out = pipeline.transform_table(&holdout)?;

    let missing_target = || {
        ModelError::Pipeline(PipelineError::target(format!(
            "fold {} has rows without '{}'",
            index, config.target
        )))
    };
    let y_train = train_out.target.ok_or_else(missing_target)?;
    let y_holdout = holdout_out.target.ok_or_else(missing_target)?;

    let mut model = make_model();
    model.fit(&train_out.matrix, &y_train)?;
    let predicted = model.predict(&holdout_out.matrix)?;

    let score = FoldScore {
        fold: index,
        train_rows: fold.train.len(),
        holdout_rows: fold.holdout.len(),
        features: train_out.matrix.ncols(),
        rmse_log: rmse(&predicted, &y_holdout),
        rmse_price: rmse(
            &pipeline.inverse_transform_target(&predicted),
            &pipeline.inverse_transform_target(&y_holdout),
        ),
        unseen_warnings: holdout_out.warnings.len(),
    };
    tracing::debug!(
        fold = index,
        rmse_log = score.rmse_log,
        rmse_price = score.rmse_price,
        "Evaluated fold"
    );
    Ok(score)
}

/// Fit an independent pipeline and model per fold and score the holdout rows.
pub fn cross_validate<R, F>(
    config: &PipelineConfig,
    table: &Table,
    folds: &[Fold],
    make_model: F,
) -> ModelResult<CvReport>
where
    R: Regressor,
    F: Fn() -> R + Sync,
{
    let scores = folds
        .par_iter()
        .enumerate()
        .map(|(i, fold)| evaluate_fold(i, fold, config, table, &make_model))
        .collect::<ModelResult<Vec<_>>>()?;
    Ok(CvReport::from_scores(scores))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResult {
    pub params: ElasticNetParams,
    pub report: CvReport,
}

/// Score every elastic-net candidate on the same folds; best (lowest mean
/// log RMSE) first.
pub fn grid_search(
    config: &PipelineConfig,
    table: &Table,
    folds: &[Fold],
    candidates: &[ElasticNetParams],
) -> ModelResult<Vec<GridResult>> {
    for params in candidates {
        params.validate()?;
    }

    let mut results = candidates
        .par_iter()
        .map(|&params| {
            let report = cross_validate(config, table, folds, || ElasticNet::new(params))?;
            Ok(GridResult { params, report })
        })
        .collect::<ModelResult<Vec<_>>>()?;

    results.sort_by(|a, b| a.report.mean_rmse_log.total_cmp(&b.report.mean_rmse_log));
    Ok(results)
}

/// Cartesian product of alphas and l1 ratios over a base parameter set.
pub fn parameter_grid(base: ElasticNetParams, alphas: &[f64], l1_ratios: &[f64]) -> Vec<ElasticNetParams> {
    alphas
        .iter()
        .flat_map(|&alpha| {
            l1_ratios.iter().map(move |&l1_ratio| ElasticNetParams {
                alpha,
                l1_ratio,
                ..base
            })
        })
        .collect()
}
