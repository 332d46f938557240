//! # Linear regression
//!
//! [`RidgeReg`] solves the regularized normal equations in one shot; [`RecLinReg`]
//! maintains the least-squares solution online with recursive updates.

mod recursive;

pub use recursive::{RecLinReg, RecLinRegParams};

use anyhow::bail;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::Vector;
use crate::error::{check_dim, LinalgError};
use crate::solver::solve;
use crate::utils::validated_serde;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct RidgeRegParams {
    /// Weight of the `|w|^2` penalty.
    #[serde(with = "crate::utils::float")]
    pub gamma: f64,
}

validated_serde!(RidgeRegParams);

impl RidgeRegParams {
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.gamma >= 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "gamma must be non-negative, got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

/// Ridge regression minimizing `|X^T w - y|^2 + gamma |w|^2`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RidgeReg {
    params: RidgeRegParams,
    weights: Option<Vector>,
}

impl RidgeReg {
    pub fn new(params: RidgeRegParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            weights: None,
        })
    }

    pub fn params(&self) -> &RidgeRegParams {
        &self.params
    }

    pub fn set_params(&mut self, params: RidgeRegParams) -> anyhow::Result<&mut Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    /// Solves `(X X^T + gamma I) w = X y`.
    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        check_dim("ridge regression targets", x.n_examples(), y.len())?;
        let mut lhs = x.weighted_gram(None);
        for i in 0..lhs.rows() {
            lhs.as_array_mut()[[i, i]] += self.params.gamma;
        }
        let rhs = x.combine_columns(y.as_slice());
        let weights = solve(&lhs, &rhs)?;
        debug!(
            "ridge regression: fitted {} weights on {} examples",
            weights.len(),
            y.len()
        );
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn weights(&self) -> anyhow::Result<&Vector> {
        self.weights
            .as_ref()
            .ok_or_else(|| LinalgError::NotFitted("RidgeReg").into())
    }

    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        let w = self.weights()?;
        x.check_dim("ridge regression predict", w.len())?;
        Ok(x.dot(w.as_slice()))
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        let w = self.weights()?;
        x.map_columns(|col| {
            col.check_dim("ridge regression predict", w.len())?;
            Ok(col.dot(w.as_slice()))
        })
    }
}
