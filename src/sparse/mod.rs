use std::ops::AddAssign;

use anyhow::bail;
use num_traits::{PrimInt, Unsigned, Zero};
use serde::{Deserialize, Serialize};

use crate::dense::Vector;
use crate::error::{check_dim, check_index, LinalgError};
use crate::utils::{Multiply, Normalize};

pub mod csc;
mod matrix;

pub use matrix::SparseMatrix;

pub trait MatrixNonZero {
    fn nonzero_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign;

    fn nonzero_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign;
}

/// Sparse vector stored as strictly increasing indices with parallel values.
///
/// `dim` is the declared length, `None` when unbounded. Entries set with `put` are kept
/// even when their value is zero, so `nnz` counts stored entries rather than nonzeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SparseVectorRepr")]
pub struct SparseVector {
    idx: Vec<usize>,
    #[serde(serialize_with = "crate::utils::float::seq::serialize")]
    val: Vec<f64>,
    dim: Option<usize>,
}

#[derive(Deserialize)]
struct SparseVectorRepr {
    idx: Vec<usize>,
    #[serde(with = "crate::utils::float::seq")]
    val: Vec<f64>,
    dim: Option<usize>,
}

impl TryFrom<SparseVectorRepr> for SparseVector {
    type Error = anyhow::Error;

    fn try_from(repr: SparseVectorRepr) -> anyhow::Result<Self> {
        check_dim("sparse vector values", repr.idx.len(), repr.val.len())?;
        if let Some(w) = repr.idx.windows(2).find(|w| w[0] >= w[1]) {
            bail!(LinalgError::InvalidArgument(format!(
                "sparse indices must be strictly increasing, found {} before {}",
                w[0], w[1]
            )));
        }
        if let (Some(d), Some(&last)) = (repr.dim, repr.idx.last()) {
            check_index(last, d)?;
        }
        Ok(Self::from_sorted_parts(repr.idx, repr.val, repr.dim))
    }
}

impl SparseVector {
    /// Builds a vector from `(index, value)` pairs in any order.
    /// Duplicate indices and indices beyond `dim` are rejected.
    pub fn new(mut pairs: Vec<(usize, f64)>, dim: Option<usize>) -> anyhow::Result<Self> {
        pairs.sort_by_key(|&(i, _)| i);
        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            bail!(LinalgError::InvalidArgument(format!(
                "duplicate sparse index {}",
                w[0].0
            )));
        }
        if let (Some(d), Some(&(last, _))) = (dim, pairs.last()) {
            check_index(last, d)?;
        }
        let (idx, val) = pairs.into_iter().unzip();
        Ok(Self { idx, val, dim })
    }

    pub fn empty(dim: Option<usize>) -> Self {
        Self {
            idx: Vec::new(),
            val: Vec::new(),
            dim,
        }
    }

    pub(crate) fn from_sorted_parts(idx: Vec<usize>, val: Vec<f64>, dim: Option<usize>) -> Self {
        debug_assert!(idx.windows(2).all(|w| w[0] < w[1]));
        Self { idx, val, dim }
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Declares a new dimension; every stored index must fit.
    pub fn set_dim(&mut self, dim: Option<usize>) -> anyhow::Result<&mut Self> {
        if let (Some(d), Some(last)) = (dim, self.max_index()) {
            check_index(last, d)?;
        }
        self.dim = dim;
        Ok(self)
    }

    pub fn nnz(&self) -> usize {
        self.idx.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.idx.iter().copied().zip(self.val.iter().copied())
    }

    pub(crate) fn max_index(&self) -> Option<usize> {
        self.idx.last().copied()
    }

    /// Dense length: the declared dimension, otherwise one past the largest index.
    pub fn len(&self) -> usize {
        self.dim
            .unwrap_or_else(|| self.max_index().map_or(0, |i| i + 1))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, index: usize) -> anyhow::Result<f64> {
        if let Some(d) = self.dim {
            check_index(index, d)?;
        }
        Ok(self.get(index))
    }

    pub(crate) fn get(&self, index: usize) -> f64 {
        match self.idx.binary_search(&index) {
            Ok(pos) => self.val[pos],
            Err(_) => 0.0,
        }
    }

    /// Stores `value` at `index`, overwriting an existing entry. Zeros are stored too.
    pub fn put(&mut self, index: usize, value: f64) -> anyhow::Result<&mut Self> {
        if let Some(d) = self.dim {
            check_index(index, d)?;
        }
        match self.idx.binary_search(&index) {
            Ok(pos) => self.val[pos] = value,
            Err(pos) => {
                self.idx.insert(pos, index);
                self.val.insert(pos, value);
            }
        }
        Ok(self)
    }

    pub fn sum(&self) -> f64 {
        self.val.iter().sum()
    }

    pub fn norm(&self) -> f64 {
        self.val.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Inner product by merging the two sorted index lists.
    pub fn inner(&self, other: &SparseVector) -> anyhow::Result<f64> {
        if let (Some(a), Some(b)) = (self.dim, other.dim) {
            check_dim("sparse inner product", a, b)?;
        }
        Ok(self.merge_dot(other))
    }

    /// Merge over both sorted index lists; declared dimensions are ignored.
    pub(crate) fn merge_dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0;
        while i < self.idx.len() && j < other.idx.len() {
            match self.idx[i].cmp(&other.idx[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.val[i] * other.val[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    pub fn inner_dense(&self, other: &Vector) -> anyhow::Result<f64> {
        self.check_fits("sparse-dense inner product", other.len())?;
        Ok(self.dot_slice(other.as_slice()))
    }

    pub(crate) fn dot_slice(&self, dense: &[f64]) -> f64 {
        self.iter().map(|(i, v)| v * dense[i]).sum()
    }

    /// `target += alpha * self`; indices are assumed to fit.
    pub(crate) fn add_scaled_to(&self, target: &mut [f64], alpha: f64) {
        for (i, v) in self.iter() {
            target[i] += alpha * v;
        }
    }

    pub fn plus(&self, other: &SparseVector) -> anyhow::Result<SparseVector> {
        if let (Some(a), Some(b)) = (self.dim, other.dim) {
            check_dim("sparse plus", a, b)?;
        }
        let mut idx = Vec::with_capacity(self.nnz() + other.nnz());
        let mut val = Vec::with_capacity(self.nnz() + other.nnz());
        let (mut i, mut j) = (0, 0);
        while i < self.idx.len() || j < other.idx.len() {
            let left = self.idx.get(i).copied().unwrap_or(usize::MAX);
            let right = other.idx.get(j).copied().unwrap_or(usize::MAX);
            if left < right {
                idx.push(left);
                val.push(self.val[i]);
                i += 1;
            } else if right < left {
                idx.push(right);
                val.push(other.val[j]);
                j += 1;
            } else {
                idx.push(left);
                val.push(self.val[i] + other.val[j]);
                i += 1;
                j += 1;
            }
        }
        Ok(Self::from_sorted_parts(idx, val, self.dim.or(other.dim)))
    }

    /// Dense copy of length [`SparseVector::len`].
    pub fn full(&self) -> Vector {
        let mut out = vec![0.0; self.len()];
        self.add_scaled_to(&mut out, 1.0);
        Vector::from_vec(out)
    }

    /// Stored values, parallel to [`SparseVector::idx_vec`].
    pub fn val_vec(&self) -> Vector {
        Vector::from_slice(&self.val)
    }

    pub fn idx_vec(&self) -> Vec<usize> {
        self.idx.clone()
    }

    /// Checks that the vector can act on a dense operand of length `len`. A shorter
    /// declared dimension is padded with implicit zeros.
    pub(crate) fn check_fits(&self, op: &'static str, len: usize) -> anyhow::Result<()> {
        match self.dim {
            Some(d) if d > len => bail!(LinalgError::DimensionMismatch {
                op,
                expected: len,
                found: d
            }),
            Some(_) => Ok(()),
            None => match self.max_index() {
                Some(last) => check_index(last, len),
                None => Ok(()),
            },
        }
    }
}

impl Normalize for SparseVector {
    fn normalize(&mut self) -> &mut Self {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.val {
                *v /= norm;
            }
        }
        self
    }
}

impl Multiply<f64> for SparseVector {
    type Output = SparseVector;

    fn multiply(&self, rhs: &f64) -> anyhow::Result<SparseVector> {
        Ok(Self::from_sorted_parts(
            self.idx.clone(),
            self.val.iter().map(|v| v * rhs).collect(),
            self.dim,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Persist;
    use approx::assert_relative_eq;

    fn sample() -> SparseVector {
        SparseVector::new(vec![(4, 2.0), (0, 1.0), (2, -3.0)], Some(6)).unwrap()
    }

    #[test]
    fn test_construction_sorts_and_rejects_duplicates() {
        let v = sample();
        assert_eq!(v.idx_vec(), vec![0, 2, 4]);
        assert_eq!(v.val_vec().as_slice(), &[1.0, -3.0, 2.0]);
        assert!(SparseVector::new(vec![(1, 1.0), (1, 2.0)], None).is_err());
        assert!(SparseVector::new(vec![(6, 1.0)], Some(6)).is_err());
    }

    #[test]
    fn test_at_put() {
        let mut v = sample();
        assert_eq!(v.at(2).unwrap(), -3.0);
        assert_eq!(v.at(3).unwrap(), 0.0);
        assert!(v.at(6).is_err());

        v.put(3, 0.0).unwrap().put(0, 5.0).unwrap();
        assert_eq!(v.nnz(), 4);
        assert_eq!(v.at(0).unwrap(), 5.0);
        assert_eq!(v.idx_vec(), vec![0, 2, 3, 4]);
        assert!(v.put(10, 1.0).is_err());
        assert_eq!(v.nnz(), 4);

        let mut unbounded = SparseVector::empty(None);
        unbounded.put(100, 1.0).unwrap();
        assert_eq!(unbounded.len(), 101);
    }

    #[test]
    fn test_inner_merge() {
        let a = sample();
        let b = SparseVector::new(vec![(1, 7.0), (2, 2.0), (4, 0.5), (5, 1.0)], Some(6)).unwrap();
        assert_relative_eq!(a.inner(&b).unwrap(), -6.0 + 1.0);
        assert_relative_eq!(a.inner(&b).unwrap(), a.full().inner(&b.full()).unwrap());
        let other_dim = SparseVector::empty(Some(5));
        assert!(a.inner(&other_dim).is_err());
        assert_relative_eq!(a.inner_dense(&b.full()).unwrap(), -5.0);
        assert!(a.inner_dense(&Vector::ones(3)).is_err());
    }

    #[test]
    fn test_plus_and_scale() {
        let a = sample();
        let b = SparseVector::new(vec![(0, -1.0), (5, 1.0)], Some(6)).unwrap();
        let sum = a.plus(&b).unwrap();
        assert_eq!(sum.idx_vec(), vec![0, 2, 4, 5]);
        assert_eq!(sum.at(0).unwrap(), 0.0);
        assert_eq!(sum.full(), a.full().plus(&b.full()).unwrap());
        let scaled = a.multiply(&2.0_f64).unwrap();
        assert_eq!(scaled.val_vec().as_slice(), &[2.0, -6.0, 4.0]);
    }

    #[test]
    fn test_normalize() {
        let mut v = SparseVector::new(vec![(1, 3.0), (7, 4.0)], None).unwrap();
        v.normalize();
        assert_relative_eq!(v.norm(), 1.0);
        assert_relative_eq!(v.at(7).unwrap(), 0.8);

        let mut zero = SparseVector::new(vec![(1, 0.0)], None).unwrap();
        zero.normalize();
        assert_eq!(zero.val_vec().as_slice(), &[0.0]);
    }

    #[test]
    fn test_full_sparse_round_trip() {
        let v = sample();
        let back = v.full().sparse();
        assert_eq!(back.nnz(), v.nnz());
        let mut pairs: Vec<_> = back.iter().collect();
        let mut expected: Vec<_> = v.iter().collect();
        pairs.sort_by_key(|p| p.0);
        expected.sort_by_key(|p| p.0);
        assert_eq!(pairs, expected);
        assert_eq!(v.full().len(), 6);
    }

    #[test]
    fn test_set_dim() {
        let mut v = sample();
        assert!(v.set_dim(Some(4)).is_err());
        assert_eq!(v.dim(), Some(6));
        v.set_dim(None).unwrap();
        assert_eq!(v.len(), 5);
    }

    #[test]
    fn test_save_load() {
        let v = sample();
        let mut buffer = Vec::new();
        v.save(&mut buffer).unwrap();
        assert_eq!(SparseVector::load(buffer.as_slice()).unwrap(), v);
    }

    #[test]
    fn test_save_load_non_finite_values() {
        let v = SparseVector::new(vec![(1, f64::NAN), (3, f64::INFINITY)], Some(4)).unwrap();
        let mut buffer = Vec::new();
        v.save(&mut buffer).unwrap();
        let loaded = SparseVector::load(buffer.as_slice()).unwrap();
        assert_eq!(loaded.idx_vec(), vec![1, 3]);
        assert!(loaded.get(1).is_nan());
        assert_eq!(loaded.get(3), f64::INFINITY);
    }

    #[test]
    fn test_load_rejects_broken_layout() {
        for text in [
            r#"{"idx":[3,1],"val":[1.0,2.0],"dim":null}"#,
            r#"{"idx":[1,1],"val":[1.0,2.0],"dim":null}"#,
            r#"{"idx":[0,1],"val":[1.0,2.0],"dim":1}"#,
            r#"{"idx":[3,1],"val":[1.0,2.0],"dim":2}"#,
            r#"{"idx":[0,1],"val":[1.0],"dim":null}"#,
        ] {
            assert!(SparseVector::load(text.as_bytes()).is_err(), "{text}");
        }
        let v = SparseVector::load(r#"{"idx":[0,2],"val":[1.0,2.0],"dim":3}"#.as_bytes()).unwrap();
        assert_eq!(v.full().as_slice(), &[1.0, 0.0, 2.0]);
    }
}
