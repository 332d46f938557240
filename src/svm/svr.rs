use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::Vector;
use crate::error::LinalgError;
use crate::utils::validated_serde;

use super::{pegasos, Loss, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct SvrParams {
    #[serde(with = "crate::utils::float")]
    pub c: f64,
    /// Half-width of the insensitive tube around the targets.
    #[serde(with = "crate::utils::float")]
    pub eps: f64,
    pub batch_size: usize,
    pub max_iterations: usize,
    #[serde(with = "crate::utils::float")]
    pub max_time: f64,
    #[serde(with = "crate::utils::float")]
    pub min_diff: f64,
    pub seed: u64,
}

validated_serde!(SvrParams);

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            eps: 0.1,
            batch_size: 1000,
            max_iterations: 10000,
            max_time: 1.0,
            min_diff: 1e-6,
            seed: 0,
        }
    }
}

impl SvrParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_time(mut self, max_time: f64) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_min_diff(mut self, min_diff: f64) -> Self {
        self.min_diff = min_diff;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            c: self.c,
            batch_size: self.batch_size,
            max_iterations: self.max_iterations,
            max_time: self.max_time,
            min_diff: self.min_diff,
            seed: self.seed,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.schedule().validate()?;
        if !(self.eps >= 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "eps must be non-negative, got {}",
                self.eps
            )));
        }
        Ok(())
    }
}

/// Linear epsilon-insensitive support vector regression trained with PEGASOS.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Svr {
    params: SvrParams,
    weights: Option<Vector>,
    iterations: usize,
}

impl Svr {
    pub fn new(params: SvrParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            weights: None,
            iterations: 0,
        })
    }

    pub fn params(&self) -> &SvrParams {
        &self.params
    }

    pub fn set_params(&mut self, params: SvrParams) -> anyhow::Result<&mut Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        self.params.validate()?;
        let trained = pegasos(
            x,
            y,
            Loss::EpsilonInsensitive {
                eps: self.params.eps,
            },
            &self.params.schedule(),
        )?;
        self.weights = Some(trained.weights);
        self.iterations = trained.iterations;
        Ok(self)
    }

    pub fn weights(&self) -> anyhow::Result<&Vector> {
        self.weights
            .as_ref()
            .ok_or_else(|| LinalgError::NotFitted("Svr").into())
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        let w = self.weights()?;
        x.check_dim("svr predict", w.len())?;
        Ok(x.dot(w.as_slice()))
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        let w = self.weights()?;
        x.map_columns(|col| {
            col.check_dim("svr predict", w.len())?;
            Ok(col.dot(w.as_slice()))
        })
    }
}
