//! Elastic-net linear regression fitted by cyclic coordinate descent
//!
//! Minimizes
//! `1/(2n)·‖y − Xw − b‖² + α·ρ·‖w‖₁ + α·(1 − ρ)/2·‖w‖²`
//! where ρ is `l1_ratio`.

use serde::{Deserialize, Serialize};

use super::{ModelError, ModelResult, Regressor};
use crate::pipeline::FeatureMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticNetParams {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub fit_intercept: bool,
}

impl Default for ElasticNetParams {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            l1_ratio: 0.5,
            max_iter: 1000,
            tol: 1e-6,
            fit_intercept: true,
        }
    }
}

impl ElasticNetParams {
    pub fn validate(&self) -> ModelResult<()> {
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(ModelError::InvalidParams(format!(
                "alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(ModelError::InvalidParams(format!(
                "l1_ratio must be in [0, 1], got {}",
                self.l1_ratio
            )));
        }
        if self.max_iter == 0 {
            return Err(ModelError::InvalidParams("max_iter must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNet {
    pub params: ElasticNetParams,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
    /// Sweeps used by the last fit
    iterations: usize,
}

impl ElasticNet {
    pub fn new(params: ElasticNetParams) -> Self {
        Self {
            params,
            coefficients: None,
            intercept: 0.0,
            iterations: 0,
        }
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

impl Regressor for ElasticNet {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> ModelResult<()> {
        self.params.validate()?;
        let (n, p) = (x.nrows(), x.ncols());
        if y.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                found: y.len(),
            });
        }
        if n == 0 {
            return Err(ModelError::InvalidParams("cannot fit on zero rows".into()));
        }
        let nf = n as f64;

        let mut columns: Vec<Vec<f64>> = (0..p).map(|j| x.column(j)).collect();
        let mut x_means = vec![0.0; p];
        let mut y_mean = 0.0;
        if self.params.fit_intercept {
            for (col, m) in columns.iter_mut().zip(x_means.iter_mut()) {
                *m = col.iter().sum::<f64>() / nf;
                col.iter_mut().for_each(|v| *v -= *m);
            }
            y_mean = y.iter().sum::<f64>() / nf;
        }

        let col_sq: Vec<f64> = columns
            .iter()
            .map(|c| c.iter().map(|v| v * v).sum::<f64>() / nf)
            .collect();
        let l1 = self.params.alpha * self.params.l1_ratio;
        let l2 = self.params.alpha * (1.0 - self.params.l1_ratio);

        let mut w = vec![0.0; p];
        let mut residual: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
        let mut iterations = 0;
        let mut converged = false;

        for _ in 0..self.params.max_iter {
            iterations += 1;
            let mut max_delta: f64 = 0.0;
            for j in 0..p {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let col = &columns[j];
                let rho = col
                    .iter()
                    .zip(&residual)
                    .map(|(xv, r)| xv * r)
                    .sum::<f64>()
                    / nf
                    + col_sq[j] * w[j];
                let updated = soft_threshold(rho, l1) / (col_sq[j] + l2);
                let delta = updated - w[j];
                if delta != 0.0 {
                    for (r, xv) in residual.iter_mut().zip(col) {
                        *r -= delta * xv;
                    }
                    w[j] = updated;
                }
                max_delta = max_delta.max(delta.abs());
            }
            if max_delta < self.params.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                max_iter = self.params.max_iter,
                alpha = self.params.alpha,
                "Coordinate descent reached max_iter without converging"
            );
        }

        self.intercept = if self.params.fit_intercept {
            y_mean - w.iter().zip(&x_means).map(|(a, b)| a * b).sum::<f64>()
        } else {
            0.0
        };
        self.coefficients = Some(w);
        self.iterations = iterations;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> ModelResult<Vec<f64>> {
        let w = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        if x.ncols() != w.len() {
            return Err(ModelError::DimensionMismatch {
                expected: w.len(),
                found: x.ncols(),
            });
        }
        Ok((0..x.nrows())
            .map(|i| {
                self.intercept
                    + w.iter()
                        .enumerate()
                        .map(|(j, wj)| wj * x.get(i, j))
                        .sum::<f64>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Feature;

    fn data() -> (FeatureMatrix, Vec<f64>) {
        let x1: Vec<f64> = (0..50).map(|i| i as f64 / 10.0).collect();
        let x2: Vec<f64> = (0..50).map(|i| ((i * 13) % 7) as f64).collect();
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| 3.0 + 2.0 * a - 0.5 * b)
            .collect();
        let features = vec![Feature::new("x1", "x1", x1), Feature::new("x2", "x2", x2)];
        (FeatureMatrix::from_features(&features, 50), y)
    }

    #[test]
    fn test_recovers_linear_relationship_without_penalty() {
        let (x, y) = data();
        let mut model = ElasticNet::new(ElasticNetParams {
            alpha: 0.0,
            tol: 1e-12,
            max_iter: 10_000,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let w = model.coefficients().unwrap();
        assert!((w[0] - 2.0).abs() < 1e-6);
        assert!((w[1] + 0.5).abs() < 1e-6);
        assert!((model.intercept() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_large_l1_penalty_zeroes_coefficients() {
        let (x, y) = data();
        let mut model = ElasticNet::new(ElasticNetParams {
            alpha: 1e6,
            l1_ratio: 1.0,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        assert!(model.coefficients().unwrap().iter().all(|w| *w == 0.0));
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((model.predict(&x).unwrap()[0] - mean).abs() < 1e-9);
    }

    #[test]
    fn test_predict_before_fit() {
        let (x, _) = data();
        let model = ElasticNet::new(ElasticNetParams::default());
        assert!(matches!(model.predict(&x), Err(ModelError::NotFitted)));
    }

    #[test]
    fn test_invalid_l1_ratio() {
        let params = ElasticNetParams {
            l1_ratio: 1.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
