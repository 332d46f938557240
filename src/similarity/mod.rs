// Based on https://medium.com/@gshriya195/top-5-distance-similarity-measures-implementation-in-machine-learning-1f68b9ecb0a3
use rayon::prelude::*;

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::utils::sort_permutation;

pub trait SimilarityMeasure: Sync {
    fn calculate(&self, a: &FeatureVector<'_>, b: &FeatureVector<'_>) -> f64;
}

pub struct CosineSimilarity;

impl SimilarityMeasure for CosineSimilarity {
    fn calculate(&self, a: &FeatureVector<'_>, b: &FeatureVector<'_>) -> f64 {
        let norm_product = a.norm() * b.norm();
        if norm_product > f64::EPSILON {
            a.inner(b) / norm_product
        } else {
            0.0
        }
    }
}

pub struct EuclideanSimilarity {
    gamma: f64, // Parameter for distance to similarity conversion
}

impl EuclideanSimilarity {
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }
}

impl Default for EuclideanSimilarity {
    fn default() -> Self {
        Self { gamma: 1.0 }
    }
}

impl SimilarityMeasure for EuclideanSimilarity {
    fn calculate(&self, a: &FeatureVector<'_>, b: &FeatureVector<'_>) -> f64 {
        (-self.gamma * a.squared_distance(b).sqrt()).exp()
    }
}

/// Similarity of `query` to every column of `x`, in column order.
pub fn similarities<S: SimilarityMeasure>(
    measure: &S,
    query: &FeatureVector<'_>,
    x: FeatureMatrix<'_>,
) -> Vec<f64> {
    (0..x.n_examples())
        .into_par_iter()
        .map(|c| measure.calculate(query, &x.column_unchecked(c)))
        .collect()
}

/// Column indices of `x` ordered from most to least similar to `query`.
/// Equal similarities keep column order.
pub fn rank_by_similarity<S: SimilarityMeasure>(
    measure: &S,
    query: &FeatureVector<'_>,
    x: FeatureMatrix<'_>,
) -> Vec<usize> {
    sort_permutation(&similarities(measure, query, x), false)
}

/// Squared Euclidean distance between every pair of columns of `x`.
///
/// Rows are filled in parallel; each entry is computed by one task, so the result does
/// not depend on the number of threads.
pub fn pairwise_squared_distances(x: FeatureMatrix<'_>) -> Vec<Vec<f64>> {
    let n = x.n_examples();
    (0..n)
        .into_par_iter()
        .map(|i| {
            let a = x.column_unchecked(i);
            (0..n)
                .map(|j| a.squared_distance(&x.column_unchecked(j)))
                .collect()
        })
        .collect()
}
