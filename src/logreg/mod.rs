//! # Generalized linear models
//!
//! Logistic regression and the exponential proportional hazards model, both fitted by
//! Newton-Raphson on the penalized log-likelihood. Every Newton step solves its linear
//! system through [`crate::solver::solve`].

mod prop_hazards;

pub use prop_hazards::{PropHazards, PropHazardsParams};

use anyhow::bail;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureStore, FeatureVector};
use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, LinalgError};
use crate::solver::solve;
use crate::sparse::{SparseMatrix, SparseVector};
use crate::utils::validated_serde;

/// Solves for one Newton direction of a model whose Hessian is
/// `sum_i curvature[i] x_i x_i^T + lambda I` and whose gradient is
/// `sum_i residual[i] x_i - lambda w`. Only the first `penalized` weights are regularized.
pub(crate) fn newton_direction(
    x: FeatureMatrix<'_>,
    curvature: &[f64],
    residual: &[f64],
    w: &Vector,
    lambda: f64,
    penalized: usize,
) -> anyhow::Result<Vector> {
    let mut hessian = x.weighted_gram(Some(curvature));
    let mut gradient = x.combine_columns(residual).into_vec();
    for i in 0..penalized {
        hessian.as_array_mut()[[i, i]] += lambda;
        gradient[i] -= lambda * w[i];
    }
    solve(&hessian, &Vector::from_vec(gradient))
}

/// Copy of `x` with a constant `1.0` feature appended as the last row.
fn with_bias_row(x: FeatureMatrix<'_>) -> anyhow::Result<FeatureStore> {
    let dim = x.dim();
    match x {
        FeatureMatrix::Dense(m) => {
            let mut rows = m.as_array().clone();
            rows.push_row(ndarray::Array1::ones(m.cols()).view())?;
            Ok(FeatureStore::Dense(Matrix::from_array(rows)))
        }
        FeatureMatrix::Sparse(m) => {
            let mut out = SparseMatrix::with_rows(dim + 1);
            for col in m.col_iter() {
                let mut pairs: Vec<(usize, f64)> = col.iter().collect();
                pairs.push((dim, 1.0));
                out.push(SparseVector::new(pairs, Some(dim + 1))?)?;
            }
            Ok(FeatureStore::Sparse(out))
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct LogRegParams {
    /// Ridge penalty on the feature weights (the intercept is not penalized).
    #[serde(with = "crate::utils::float")]
    pub lambda: f64,
    pub intercept: bool,
    pub max_iterations: usize,
    /// Newton iteration stops once the step norm falls below this.
    #[serde(with = "crate::utils::float")]
    pub tol: f64,
}

validated_serde!(LogRegParams);

impl Default for LogRegParams {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            intercept: false,
            max_iterations: 100,
            tol: 1e-6,
        }
    }
}

impl LogRegParams {
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_intercept(mut self, intercept: bool) -> Self {
        self.intercept = intercept;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.lambda >= 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "lambda must be non-negative, got {}",
                self.lambda
            )));
        }
        if self.max_iterations == 0 {
            bail!(LinalgError::InvalidConfiguration(
                "max_iterations must be positive".to_string()
            ));
        }
        if !(self.tol >= 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "tol must be non-negative, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Regularized logistic regression. Targets are `0` or `1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogReg {
    params: LogRegParams,
    weights: Option<Vector>,
    #[serde(with = "crate::utils::float")]
    bias: f64,
}

impl LogReg {
    pub fn new(params: LogRegParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            weights: None,
            bias: 0.0,
        })
    }

    pub fn params(&self) -> &LogRegParams {
        &self.params
    }

    pub fn set_params(&mut self, params: LogRegParams) -> anyhow::Result<&mut Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        check_dim("logistic regression targets", x.n_examples(), y.len())?;
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            bail!(LinalgError::InvalidArgument(
                "logistic regression targets must be 0 or 1".to_string()
            ));
        }
        let dim = x.dim();
        let augmented = if self.params.intercept {
            Some(with_bias_row(x)?)
        } else {
            None
        };
        let design = augmented.as_ref().map_or(x, |store| store.view());

        let mut w = Vector::zeros(design.dim());
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.params.max_iterations {
            let probabilities: Vec<f64> = design
                .columns()
                .map(|col| sigmoid(col.dot(w.as_slice())))
                .collect();
            let curvature: Vec<f64> = probabilities.iter().map(|p| p * (1.0 - p)).collect();
            let residual: Vec<f64> = y
                .iter()
                .zip(&probabilities)
                .map(|(target, p)| target - p)
                .collect();
            let step = newton_direction(design, &curvature, &residual, &w, self.params.lambda, dim)?;
            w.axpy(1.0, &step);
            iterations += 1;
            let change = step.norm();
            trace!("logistic regression: iteration {iterations}, step {change}");
            if change < self.params.tol {
                converged = true;
                break;
            }
        }
        if converged {
            debug!("logistic regression: converged after {iterations} iterations");
        } else {
            warn!("logistic regression: stopped at max_iterations ({iterations})");
        }

        let mut w = w.into_vec();
        self.bias = if self.params.intercept {
            w.pop().unwrap_or(0.0)
        } else {
            0.0
        };
        self.weights = Some(Vector::from_vec(w));
        Ok(self)
    }

    pub fn weights(&self) -> anyhow::Result<&Vector> {
        self.weights
            .as_ref()
            .ok_or_else(|| LinalgError::NotFitted("LogReg").into())
    }

    /// Intercept term, zero unless the model was fitted with `intercept = true`.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Probability that `x` belongs to class `1`.
    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        let w = self.weights()?;
        x.check_dim("logistic regression predict", w.len())?;
        Ok(sigmoid(x.dot(w.as_slice()) + self.bias))
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        x.map_columns(|col| self.predict(col))
    }
}
