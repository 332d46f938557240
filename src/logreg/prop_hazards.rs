use anyhow::bail;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::Vector;
use crate::error::{check_dim, LinalgError};
use crate::utils::validated_serde;

use super::newton_direction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct PropHazardsParams {
    #[serde(with = "crate::utils::float")]
    pub lambda: f64,
    pub max_iterations: usize,
    #[serde(with = "crate::utils::float")]
    pub tol: f64,
}

validated_serde!(PropHazardsParams);

impl Default for PropHazardsParams {
    fn default() -> Self {
        Self {
            lambda: 0.0,
            max_iterations: 100,
            tol: 1e-6,
        }
    }
}

impl PropHazardsParams {
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
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
        if !(self.lambda >= 0.0) || self.max_iterations == 0 || !(self.tol >= 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "invalid proportional hazards parameters: {self:?}"
            )));
        }
        Ok(())
    }
}

/// Proportional hazards model with a constant baseline hazard.
///
/// The time to event for an example `x` is exponential with rate `exp(w . x)`; `fit`
/// maximizes the penalized likelihood of the observed times `y`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropHazards {
    params: PropHazardsParams,
    weights: Option<Vector>,
}

impl PropHazards {
    pub fn new(params: PropHazardsParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            weights: None,
        })
    }

    pub fn params(&self) -> &PropHazardsParams {
        &self.params
    }

    pub fn set_params(&mut self, params: PropHazardsParams) -> anyhow::Result<&mut Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        check_dim("proportional hazards targets", x.n_examples(), y.len())?;
        if y.iter().any(|&t| !(t >= 0.0) || !t.is_finite()) {
            bail!(LinalgError::InvalidArgument(
                "event times must be finite and non-negative".to_string()
            ));
        }

        let dim = x.dim();
        let mut w = Vector::zeros(dim);
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.params.max_iterations {
            // d/dw log L = sum x (1 - t e^eta), -d2/dw2 log L = sum t e^eta x x^T
            let curvature: Vec<f64> = x
                .columns()
                .zip(y.iter())
                .map(|(col, t)| t * col.dot(w.as_slice()).exp())
                .collect();
            let residual: Vec<f64> = curvature.iter().map(|c| 1.0 - c).collect();
            let step = newton_direction(x, &curvature, &residual, &w, self.params.lambda, dim)?;
            w.axpy(1.0, &step);
            iterations += 1;
            let change = step.norm();
            trace!("proportional hazards: iteration {iterations}, step {change}");
            if change < self.params.tol {
                converged = true;
                break;
            }
        }
        if converged {
            debug!("proportional hazards: converged after {iterations} iterations");
        } else {
            warn!("proportional hazards: stopped at max_iterations ({iterations})");
        }
        self.weights = Some(w);
        Ok(self)
    }

    pub fn weights(&self) -> anyhow::Result<&Vector> {
        self.weights
            .as_ref()
            .ok_or_else(|| LinalgError::NotFitted("PropHazards").into())
    }

    /// Hazard rate `exp(w . x)`.
    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        let w = self.weights()?;
        x.check_dim("proportional hazards predict", w.len())?;
        Ok(x.dot(w.as_slice()).exp())
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        x.map_columns(|col| self.predict(col))
    }
}
