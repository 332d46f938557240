use std::ops::Index;

use anyhow::bail;
use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{check_dim, check_index, LinalgError};
use crate::sparse::SparseVector;
use crate::utils::{sort_permutation, Multiply, Normalize};

mod matrix;

pub use matrix::Matrix;

/// Growable dense vector of `f64`.
///
/// Mutating operations return `&mut Self` so calls can be chained,
/// the rest allocate a new vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    #[serde(with = "crate::utils::float::seq")]
    data: Vec<f64>,
}

impl Vector {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn ones(len: usize) -> Self {
        Self {
            data: vec![1.0; len],
        }
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Integers `start, start + 1, ..., end - 1` as floats.
    pub fn range(start: i64, end: i64) -> Self {
        Self {
            data: (start..end).map(|i| i as f64).collect(),
        }
    }

    /// Vector of independent standard normal draws.
    pub fn randn<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        Self {
            data: (0..len).map(|_| rng.sample(StandardNormal)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(self.data.as_slice())
    }

    pub fn view_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        ArrayViewMut1::from(self.data.as_mut_slice())
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.data.clone())
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.data.iter()
    }

    pub fn at(&self, index: usize) -> anyhow::Result<f64> {
        check_index(index, self.len())?;
        Ok(self.data[index])
    }

    pub fn put(&mut self, index: usize, value: f64) -> anyhow::Result<&mut Self> {
        check_index(index, self.len())?;
        self.data[index] = value;
        Ok(self)
    }

    pub fn push(&mut self, value: f64) -> &mut Self {
        self.data.push(value);
        self
    }

    /// Appends all elements of `other`.
    pub fn push_vec(&mut self, other: &Vector) -> &mut Self {
        self.data.extend_from_slice(&other.data);
        self
    }

    /// Inserts `value` before position `index`; `index == len` appends.
    pub fn insert(&mut self, index: usize, value: f64) -> anyhow::Result<&mut Self> {
        check_index(index, self.len() + 1)?;
        self.data.insert(index, value);
        Ok(self)
    }

    /// Shortens the vector to `len` elements; longer lengths are a no-op.
    pub fn truncate(&mut self, len: usize) -> &mut Self {
        self.data.truncate(len);
        self
    }

    /// Removes `count` elements starting at `start`.
    pub fn splice(&mut self, start: usize, count: usize) -> anyhow::Result<&mut Self> {
        let end = start.saturating_add(count);
        if end > self.len() {
            bail!(LinalgError::IndexOutOfRange {
                index: end,
                bound: self.len()
            });
        }
        self.data.drain(start..end);
        Ok(self)
    }

    pub fn plus(&self, other: &Vector) -> anyhow::Result<Vector> {
        check_dim("vector plus", self.len(), other.len())?;
        Ok(Self::from_vec(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect(),
        ))
    }

    pub fn minus(&self, other: &Vector) -> anyhow::Result<Vector> {
        check_dim("vector minus", self.len(), other.len())?;
        Ok(Self::from_vec(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a - b)
                .collect(),
        ))
    }

    pub fn inner(&self, other: &Vector) -> anyhow::Result<f64> {
        check_dim("inner product", self.len(), other.len())?;
        Ok(self.view().dot(&other.view()))
    }

    /// Rank-one product `self * other^T`.
    pub fn outer(&self, other: &Vector) -> Matrix {
        let col = self.view().insert_axis(ndarray::Axis(1));
        let row = other.view().insert_axis(ndarray::Axis(0));
        Matrix::from_array(col.dot(&row))
    }

    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Index of the largest element, first one on ties.
    pub fn max_idx(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, v) in self.data.iter().enumerate() {
            match best {
                Some(b) if self.data[b] >= *v => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Cosine of the angle between `self` and `other`; zero when either is zero.
    pub fn cosine(&self, other: &Vector) -> anyhow::Result<f64> {
        let dot = self.inner(other)?;
        let norms = self.norm() * other.norm();
        Ok(if norms > 0.0 { dot / norms } else { 0.0 })
    }

    pub fn sort(&self, ascending: bool) -> Vector {
        self.sort_perm(ascending).0
    }

    pub fn sort_in_place(&mut self, ascending: bool) -> &mut Self {
        if ascending {
            self.data.sort_by(f64::total_cmp);
        } else {
            self.data.sort_by(|a, b| b.total_cmp(a));
        }
        self
    }

    /// Sorted copy together with the permutation that produced it:
    /// `sorted[i] == self[perm[i]]`.
    pub fn sort_perm(&self, ascending: bool) -> (Vector, Vec<usize>) {
        let perm = sort_permutation(&self.data, ascending);
        let sorted = perm.iter().map(|&i| self.data[i]).collect();
        (Self::from_vec(sorted), perm)
    }

    pub fn sub_vector(&self, indices: &[usize]) -> anyhow::Result<Vector> {
        let mut out = Vec::with_capacity(indices.len());
        for &i in indices {
            check_index(i, self.len())?;
            out.push(self.data[i]);
        }
        Ok(Self::from_vec(out))
    }

    /// Sparse copy holding the nonzero elements; the dimension is the dense length.
    pub fn sparse(&self) -> SparseVector {
        let (idx, val): (Vec<usize>, Vec<f64>) = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i, *v))
            .unzip();
        SparseVector::from_sorted_parts(idx, val, Some(self.len()))
    }

    /// Single-column matrix.
    pub fn to_mat(&self) -> Matrix {
        Matrix::from_array(self.to_array().insert_axis(ndarray::Axis(1)))
    }

    /// Square matrix with `self` on the diagonal.
    pub fn diag(&self) -> Matrix {
        Matrix::from_array(ndarray::Array2::from_diag(&self.view()))
    }

    pub(crate) fn axpy(&mut self, alpha: f64, x: &Vector) {
        for (a, b) in self.data.iter_mut().zip(&x.data) {
            *a += alpha * b;
        }
    }

    pub(crate) fn scale_in_place(&mut self, alpha: f64) {
        for v in &mut self.data {
            *v *= alpha;
        }
    }
}

impl Normalize for Vector {
    fn normalize(&mut self) -> &mut Self {
        let norm = self.norm();
        if norm > 0.0 {
            self.scale_in_place(1.0 / norm);
        }
        self
    }
}

impl Multiply<f64> for Vector {
    type Output = Vector;

    fn multiply(&self, rhs: &f64) -> anyhow::Result<Vector> {
        Ok(Self::from_vec(self.data.iter().map(|v| v * rhs).collect()))
    }
}

impl Index<usize> for Vector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.data[index]
    }
}

impl From<Vec<f64>> for Vector {
    fn from(data: Vec<f64>) -> Self {
        Self::from_vec(data)
    }
}

impl From<Array1<f64>> for Vector {
    fn from(data: Array1<f64>) -> Self {
        Self::from_vec(data.to_vec())
    }
}

impl FromIterator<f64> for Vector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}
