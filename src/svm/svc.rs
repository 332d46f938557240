use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::Vector;
use crate::error::LinalgError;
use crate::utils::validated_serde;

use super::{pegasos, Loss, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct SvcParams {
    /// Cost of margin violations; larger values mean weaker regularization.
    #[serde(with = "crate::utils::float")]
    pub c: f64,
    /// Extra weight of positive examples.
    #[serde(with = "crate::utils::float")]
    pub j: f64,
    pub batch_size: usize,
    pub max_iterations: usize,
    /// Wall-clock budget in seconds.
    #[serde(with = "crate::utils::float")]
    pub max_time: f64,
    /// Training stops once an update moves the weights by less than this.
    #[serde(with = "crate::utils::float")]
    pub min_diff: f64,
    pub seed: u64,
}

validated_serde!(SvcParams);

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            j: 1.0,
            batch_size: 1000,
            max_iterations: 10000,
            max_time: 1.0,
            min_diff: 1e-6,
            seed: 0,
        }
    }
}

impl SvcParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_j(mut self, j: f64) -> Self {
        self.j = j;
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
        if !(self.j > 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "j must be positive, got {}",
                self.j
            )));
        }
        Ok(())
    }
}

/// Linear support vector classifier trained with PEGASOS.
///
/// Targets are class labels; any positive value is the positive class, any negative
/// value the negative class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Svc {
    params: SvcParams,
    weights: Option<Vector>,
    iterations: usize,
}

impl Default for Svc {
    fn default() -> Self {
        Self {
            params: SvcParams::default(),
            weights: None,
            iterations: 0,
        }
    }
}

impl Svc {
    pub fn new(params: SvcParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            ..Self::default()
        })
    }

    pub fn params(&self) -> &SvcParams {
        &self.params
    }

    /// Replaces the hyperparameters; learned weights are kept until the next fit.
    pub fn set_params(&mut self, params: SvcParams) -> anyhow::Result<&mut Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        self.params.validate()?;
        if y.iter().any(|&v| v == 0.0) {
            bail!(LinalgError::InvalidArgument(
                "classification targets must be non-zero".to_string()
            ));
        }
        let labels: Vector = y.iter().map(|v| v.signum()).collect();
        let trained = pegasos(
            x,
            &labels,
            Loss::Hinge { j: self.params.j },
            &self.params.schedule(),
        )?;
        self.weights = Some(trained.weights);
        self.iterations = trained.iterations;
        Ok(self)
    }

    /// Normal of the separating hyperplane.
    pub fn weights(&self) -> anyhow::Result<&Vector> {
        self.weights
            .as_ref()
            .ok_or_else(|| LinalgError::NotFitted("Svc").into())
    }

    /// Iterations used by the last fit.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Signed distance-like score `w . x`.
    pub fn decision_function(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        let w = self.weights()?;
        x.check_dim("svc decision function", w.len())?;
        Ok(x.dot(w.as_slice()))
    }

    /// Signed margin of `x`; its sign is the predicted class.
    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        self.decision_function(x)
    }

    /// Margins of every column of `x`.
    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        let w = self.weights()?;
        x.map_columns(|col| {
            col.check_dim("svc predict", w.len())?;
            Ok(col.dot(w.as_slice()))
        })
    }
}
