use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureStore, FeatureVector};
use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, LinalgError};
use crate::sparse::SparseMatrix;
use crate::utils::{sort_permutation, validated_serde};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct KnnRegressorParams {
    pub k: usize,
}

validated_serde!(KnnRegressorParams);

impl Default for KnnRegressorParams {
    fn default() -> Self {
        Self { k: 1 }
    }
}

impl KnnRegressorParams {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.k == 0 {
            bail!(LinalgError::InvalidConfiguration(
                "k must be positive".to_string()
            ));
        }
        Ok(())
    }
}

/// k-nearest-neighbour regression over every example seen so far.
///
/// Examples are stored in the layout of the first one received. Prediction averages the
/// targets of the `k` closest stored examples; equally distant examples are taken in
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnRegressor {
    params: KnnRegressorParams,
    examples: Option<FeatureStore>,
    #[serde(with = "crate::utils::float::seq")]
    targets: Vec<f64>,
}

impl KnnRegressor {
    pub fn new(params: KnnRegressorParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            examples: None,
            targets: Vec::new(),
        })
    }

    pub fn params(&self) -> &KnnRegressorParams {
        &self.params
    }

    pub fn n_examples(&self) -> usize {
        self.targets.len()
    }

    /// Stores one example.
    pub fn partial_fit(&mut self, x: FeatureVector<'_>, y: f64) -> anyhow::Result<&mut Self> {
        if !y.is_finite() {
            bail!(LinalgError::InvalidArgument(format!(
                "target must be finite, got {y}"
            )));
        }
        let store = self.examples.get_or_insert_with(|| match x {
            FeatureVector::Dense(_) => FeatureStore::Dense(Matrix::new()),
            FeatureVector::Sparse(_) => FeatureStore::Sparse(SparseMatrix::new()),
        });
        store.push(x)?;
        self.targets.push(y);
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        check_dim("knn targets", x.n_examples(), y.len())?;
        let mut next = self.clone();
        for (col, &target) in x.columns().zip(y.iter()) {
            next.partial_fit(col, target)?;
        }
        *self = next;
        Ok(self)
    }

    /// Indices of the stored examples nearest to `x`, closest first.
    pub fn neighbours(&self, x: FeatureVector<'_>) -> anyhow::Result<Vec<usize>> {
        let examples = self
            .examples
            .as_ref()
            .ok_or(LinalgError::NotFitted("KnnRegressor"))?;
        if let FeatureStore::Dense(_) = examples {
            x.check_dim("knn predict", examples.dim())?;
        }
        let distances: Vec<f64> = examples
            .view()
            .columns()
            .map(|col| col.squared_distance(&x))
            .collect();
        let mut order = sort_permutation(&distances, true);
        order.truncate(self.params.k);
        Ok(order)
    }

    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        let neighbours = self.neighbours(x)?;
        let total: f64 = neighbours.iter().map(|&i| self.targets[i]).sum();
        Ok(total / neighbours.len() as f64)
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        x.map_columns(|col| self.predict(col))
    }
}
