//! # Feature inputs
//!
//! Learners accept examples either as a dense [`Matrix`] or a [`SparseMatrix`], one column
//! per example. [`FeatureMatrix`] and [`FeatureVector`] wrap both layouts behind a single
//! statically dispatched type, and [`FeatureStore`] is the owned, growable counterpart used
//! by learners that keep their training examples around.

use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, check_index};
use crate::sparse::{SparseMatrix, SparseVector};

#[derive(Debug, Clone, Copy)]
pub enum FeatureMatrix<'a> {
    Dense(&'a Matrix),
    Sparse(&'a SparseMatrix),
}

#[derive(Debug, Clone, Copy)]
pub enum FeatureVector<'a> {
    Dense(ArrayView1<'a, f64>),
    Sparse(&'a SparseVector),
}

impl<'a> From<&'a Matrix> for FeatureMatrix<'a> {
    fn from(m: &'a Matrix) -> Self {
        FeatureMatrix::Dense(m)
    }
}

impl<'a> From<&'a SparseMatrix> for FeatureMatrix<'a> {
    fn from(m: &'a SparseMatrix) -> Self {
        FeatureMatrix::Sparse(m)
    }
}

impl<'a> From<&'a Vector> for FeatureVector<'a> {
    fn from(v: &'a Vector) -> Self {
        FeatureVector::Dense(v.view())
    }
}

impl<'a> From<&'a SparseVector> for FeatureVector<'a> {
    fn from(v: &'a SparseVector) -> Self {
        FeatureVector::Sparse(v)
    }
}

impl<'a> FeatureMatrix<'a> {
    /// Feature dimension (number of rows).
    pub fn dim(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.rows(),
            FeatureMatrix::Sparse(m) => m.rows(),
        }
    }

    /// Number of examples (number of columns).
    pub fn n_examples(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.cols(),
            FeatureMatrix::Sparse(m) => m.cols(),
        }
    }

    pub fn column(&self, col: usize) -> anyhow::Result<FeatureVector<'a>> {
        check_index(col, self.n_examples())?;
        Ok(self.column_unchecked(col))
    }

    pub(crate) fn column_unchecked(&self, col: usize) -> FeatureVector<'a> {
        match *self {
            FeatureMatrix::Dense(m) => FeatureVector::Dense(m.column_view(col)),
            FeatureMatrix::Sparse(m) => FeatureVector::Sparse(&m.col_iter().as_slice()[col]),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = FeatureVector<'a>> + '_ {
        (0..self.n_examples()).map(|c| self.column_unchecked(c))
    }

    /// Scores `f(column)` for every column in parallel; output order follows column order.
    pub(crate) fn map_columns<F>(&self, f: F) -> anyhow::Result<Vector>
    where
        F: Fn(FeatureVector<'_>) -> anyhow::Result<f64> + Sync,
    {
        let scores = (0..self.n_examples())
            .into_par_iter()
            .map(|c| f(self.column_unchecked(c)))
            .collect::<anyhow::Result<Vec<f64>>>()?;
        Ok(Vector::from_vec(scores))
    }

    /// `sum_i weights[i] * x_i * x_i^T`, or the plain Gram matrix `X X^T` when `weights`
    /// is `None`. Sparse columns only touch their nonzero pairs.
    pub(crate) fn weighted_gram(&self, weights: Option<&[f64]>) -> Matrix {
        let dim = self.dim();
        let mut gram = Matrix::zeros(dim, dim);
        let data = gram.as_array_mut();
        for (i, col) in self.columns().enumerate() {
            let w = weights.map_or(1.0, |w| w[i]);
            if w == 0.0 {
                continue;
            }
            match col {
                FeatureVector::Dense(v) => {
                    for (r, &a) in v.iter().enumerate() {
                        if a != 0.0 {
                            for (c, &b) in v.iter().enumerate() {
                                data[[r, c]] += w * a * b;
                            }
                        }
                    }
                }
                FeatureVector::Sparse(v) => {
                    for (r, a) in v.iter() {
                        for (c, b) in v.iter() {
                            data[[r, c]] += w * a * b;
                        }
                    }
                }
            }
        }
        gram
    }

    /// `X * coefs`, the coefficient-weighted sum of the columns.
    pub(crate) fn combine_columns(&self, coefs: &[f64]) -> Vector {
        let mut out = vec![0.0; self.dim()];
        for (col, &a) in self.columns().zip(coefs) {
            col.add_scaled_to(&mut out, a);
        }
        Vector::from_vec(out)
    }
}

impl<'a> FeatureVector<'a> {
    /// Fails unless the vector can be used with a model of dimension `dim`.
    pub fn check_dim(&self, op: &'static str, dim: usize) -> anyhow::Result<()> {
        match self {
            FeatureVector::Dense(v) => check_dim(op, dim, v.len()),
            FeatureVector::Sparse(v) => v.check_fits(op, dim),
        }
    }

    /// `self . weights`; the dimensions must already be checked.
    pub fn dot(&self, weights: &[f64]) -> f64 {
        match self {
            FeatureVector::Dense(v) => v.iter().zip(weights).map(|(a, b)| a * b).sum(),
            FeatureVector::Sparse(v) => v.dot_slice(weights),
        }
    }

    /// `target += alpha * self`; the dimensions must already be checked.
    pub fn add_scaled_to(&self, target: &mut [f64], alpha: f64) {
        match self {
            FeatureVector::Dense(v) => {
                for (t, x) in target.iter_mut().zip(v.iter()) {
                    *t += alpha * x;
                }
            }
            FeatureVector::Sparse(v) => v.add_scaled_to(target, alpha),
        }
    }

    pub fn squared_norm(&self) -> f64 {
        match self {
            FeatureVector::Dense(v) => v.dot(v),
            FeatureVector::Sparse(v) => v.iter().map(|(_, x)| x * x).sum(),
        }
    }

    pub fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    /// Inner product of two feature vectors of any layout.
    pub fn inner(&self, other: &FeatureVector<'_>) -> f64 {
        match (self, other) {
            (FeatureVector::Dense(a), FeatureVector::Dense(b)) => {
                a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
            }
            (FeatureVector::Sparse(a), FeatureVector::Dense(b)) => sparse_dense_inner(a, b),
            (FeatureVector::Dense(b), FeatureVector::Sparse(a)) => sparse_dense_inner(a, b),
            (FeatureVector::Sparse(a), FeatureVector::Sparse(b)) => a.merge_dot(b),
        }
    }

    /// Squared Euclidean distance, expanded as `|a|^2 + |b|^2 - 2 a.b` for sparse operands.
    pub fn squared_distance(&self, other: &FeatureVector<'_>) -> f64 {
        match (self, other) {
            (FeatureVector::Dense(a), FeatureVector::Dense(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            _ => (self.squared_norm() + other.squared_norm() - 2.0 * self.inner(other)).max(0.0),
        }
    }

    /// Dense copy padded to `dim`.
    pub fn to_dense(&self, dim: usize) -> Vector {
        let mut out = vec![0.0; dim];
        self.add_scaled_to(&mut out, 1.0);
        Vector::from_vec(out)
    }
}

fn sparse_dense_inner(a: &SparseVector, b: &ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .filter(|(i, _)| *i < b.len())
        .map(|(i, x)| x * b[i])
        .sum()
}

/// Owned, column-growable example store in either layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureStore {
    Dense(Matrix),
    Sparse(SparseMatrix),
}

impl FeatureStore {
    /// Copies `x` into a store of the same layout.
    pub fn from_features(x: FeatureMatrix<'_>) -> Self {
        match x {
            FeatureMatrix::Dense(m) => FeatureStore::Dense(m.clone()),
            FeatureMatrix::Sparse(m) => FeatureStore::Sparse(m.clone()),
        }
    }

    pub fn view(&self) -> FeatureMatrix<'_> {
        match self {
            FeatureStore::Dense(m) => FeatureMatrix::Dense(m),
            FeatureStore::Sparse(m) => FeatureMatrix::Sparse(m),
        }
    }

    pub fn n_examples(&self) -> usize {
        self.view().n_examples()
    }

    pub fn dim(&self) -> usize {
        self.view().dim()
    }

    /// Appends one example. Dense stores densify sparse input, sparse stores sparsify
    /// dense input.
    pub fn push(&mut self, x: FeatureVector<'_>) -> anyhow::Result<()> {
        match self {
            FeatureStore::Dense(m) => {
                let dim = if m.rows() == 0 && m.cols() == 0 {
                    match x {
                        FeatureVector::Dense(v) => v.len(),
                        FeatureVector::Sparse(v) => v.len(),
                    }
                } else {
                    m.rows()
                };
                x.check_dim("feature store push", dim)?;
                m.push_col(&x.to_dense(dim))?;
            }
            FeatureStore::Sparse(m) => {
                let col = match x {
                    FeatureVector::Dense(v) => Vector::from_vec(v.to_vec()).sparse(),
                    FeatureVector::Sparse(v) => v.clone(),
                };
                m.push(col)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dense_and_sparse_columns_agree() {
        let dense = Matrix::from_rows(&[vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 4.0]]).unwrap();
        let sparse = dense.sparse();
        let d = FeatureMatrix::from(&dense);
        let s = FeatureMatrix::from(&sparse);
        assert_eq!((d.dim(), d.n_examples()), (2, 3));
        assert_eq!((s.dim(), s.n_examples()), (2, 3));

        let w = [0.5, -1.0];
        for c in 0..3 {
            let dc = d.column(c).unwrap();
            let sc = s.column(c).unwrap();
            assert_relative_eq!(dc.dot(&w), sc.dot(&w));
            assert_relative_eq!(dc.squared_norm(), sc.squared_norm());
            assert_eq!(dc.to_dense(2), sc.to_dense(2));
        }
        assert!(d.column(3).is_err());
    }

    #[test]
    fn test_distances_across_layouts() {
        let a = Vector::from_vec(vec![1.0, 2.0, 0.0]);
        let b = Vector::from_vec(vec![0.0, 2.0, 2.0]);
        let sa = a.sparse();
        let sb = b.sparse();
        let expected = 5.0;
        let pairs = [
            (FeatureVector::from(&a), FeatureVector::from(&b)),
            (FeatureVector::from(&sa), FeatureVector::from(&b)),
            (FeatureVector::from(&a), FeatureVector::from(&sb)),
            (FeatureVector::from(&sa), FeatureVector::from(&sb)),
        ];
        for (x, y) in pairs.iter() {
            assert_relative_eq!(x.squared_distance(y), expected, epsilon = 1e-12);
            assert_relative_eq!(x.inner(y), 4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_weighted_gram_and_combination() {
        let dense = Matrix::from_rows(&[vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 4.0]]).unwrap();
        let sparse = dense.sparse();
        let weights = [1.0, 2.0, 0.5];
        for x in [FeatureMatrix::from(&dense), FeatureMatrix::from(&sparse)] {
            let gram = x.weighted_gram(Some(&weights));
            assert_relative_eq!(gram[(0, 0)], 3.0);
            assert_relative_eq!(gram[(0, 1)], 4.0);
            assert_relative_eq!(gram[(1, 0)], 4.0);
            assert_relative_eq!(gram[(1, 1)], 26.0);

            let plain = x.weighted_gram(None);
            assert_relative_eq!(plain[(1, 1)], 25.0);

            let combined = x.combine_columns(&[1.0, -1.0, 0.5]);
            assert_eq!(combined.as_slice(), &[2.0, -1.0]);
        }
    }

    #[test]
    fn test_store_push() {
        let mut store = FeatureStore::Dense(Matrix::new());
        let v = Vector::from_vec(vec![1.0, 2.0]);
        store.push(FeatureVector::from(&v)).unwrap();
        let s = SparseVector::new(vec![(1, 5.0)], None).unwrap();
        store.push(FeatureVector::from(&s)).unwrap();
        assert_eq!(store.n_examples(), 2);
        assert!(store.push(FeatureVector::from(&Vector::ones(3))).is_err());
        assert_eq!(store.n_examples(), 2);

        let mut sparse_store = FeatureStore::Sparse(SparseMatrix::new());
        sparse_store.push(FeatureVector::from(&v)).unwrap();
        assert_eq!(sparse_store.dim(), 2);
    }

    #[test]
    fn test_check_dim() {
        let v = Vector::ones(3);
        assert!(FeatureVector::from(&v).check_dim("test", 3).is_ok());
        assert!(FeatureVector::from(&v).check_dim("test", 4).is_err());
        let s = SparseVector::new(vec![(5, 1.0)], None).unwrap();
        assert!(FeatureVector::from(&s).check_dim("test", 6).is_ok());
        assert!(FeatureVector::from(&s).check_dim("test", 5).is_err());
        let short = SparseVector::empty(Some(2));
        assert!(FeatureVector::from(&short).check_dim("test", 3).is_ok());
        assert!(FeatureVector::from(&short).check_dim("test", 1).is_err());
    }
}
