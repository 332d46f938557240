use anyhow::bail;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::{Matrix, Vector};
use crate::error::LinalgError;
use crate::utils::validated_serde;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct LloydParams {
    pub dim: usize,
    pub k: usize,
}

validated_serde!(LloydParams);

impl LloydParams {
    pub fn new(dim: usize, k: usize) -> Self {
        Self { dim, k }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.k == 0 || self.dim == 0 {
            bail!(LinalgError::InvalidConfiguration(format!(
                "dim and k must be positive, got dim = {} and k = {}",
                self.dim, self.k
            )));
        }
        Ok(())
    }
}

/// Online k-means.
///
/// The first `k` examples become the centroids. Every later example moves its nearest
/// centroid so that the centroid stays the mean of the examples assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lloyd {
    params: LloydParams,
    centroids: Matrix,
    counts: Vec<usize>,
}

impl Lloyd {
    pub fn new(params: LloydParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            centroids: Matrix::new(),
            counts: Vec::new(),
        })
    }

    pub fn params(&self) -> &LloydParams {
        &self.params
    }

    /// Centroids seen so far, one per column (fewer than `k` until `k` examples arrived).
    pub fn centroids(&self) -> &Matrix {
        &self.centroids
    }

    pub fn get_centroid(&self, idx: usize) -> anyhow::Result<Vector> {
        self.centroids.get_col(idx)
    }

    /// Number of examples assigned to each centroid.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Index of the centroid closest to `x`; ties go to the lower index.
    pub fn get_centroid_idx(&self, x: FeatureVector<'_>) -> anyhow::Result<usize> {
        x.check_dim("lloyd assignment", self.params.dim)?;
        if self.counts.is_empty() {
            bail!(LinalgError::NotFitted("Lloyd"));
        }
        let centroids = FeatureMatrix::Dense(&self.centroids);
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (idx, centroid) in centroids.columns().enumerate() {
            let distance = centroid.squared_distance(&x);
            if distance < best_distance {
                best = idx;
                best_distance = distance;
            }
        }
        Ok(best)
    }

    pub fn partial_fit(&mut self, x: FeatureVector<'_>) -> anyhow::Result<&mut Self> {
        x.check_dim("lloyd update", self.params.dim)?;
        let x = x.to_dense(self.params.dim);
        if self.counts.len() < self.params.k {
            self.centroids.push_col(&x)?;
            self.counts.push(1);
            return Ok(self);
        }
        let idx = self.get_centroid_idx((&x).into())?;
        self.counts[idx] += 1;
        let rate = 1.0 / self.counts[idx] as f64;
        let mut centroid = self.centroids.get_col(idx)?;
        let delta = x.minus(&centroid)?;
        centroid.axpy(rate, &delta);
        self.centroids.set_col(idx, &centroid)?;
        trace!("lloyd: centroid {idx} now holds {} examples", self.counts[idx]);
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>) -> anyhow::Result<&mut Self> {
        for col in x.columns() {
            col.check_dim("lloyd fit", self.params.dim)?;
        }
        for col in x.columns() {
            self.partial_fit(col)?;
        }
        Ok(self)
    }

    /// Centroid index of every column of `x`.
    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vec<usize>> {
        x.columns().map(|col| self.get_centroid_idx(col)).collect()
    }
}
