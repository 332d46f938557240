use anyhow::bail;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, check_index, LinalgError};
use crate::utils::{Multiply, MultiplyT, Normalize};

use super::SparseVector;

/// Column-compressed sparse matrix: one [`SparseVector`] per column.
///
/// The row count is either declared (`with_rows`, `set_rows`) or, while undeclared,
/// inferred from the largest stored row index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SparseMatrixRepr")]
pub struct SparseMatrix {
    cols: Vec<SparseVector>,
    rows: Option<usize>,
}

#[derive(Deserialize)]
struct SparseMatrixRepr {
    cols: Vec<SparseVector>,
    rows: Option<usize>,
}

impl TryFrom<SparseMatrixRepr> for SparseMatrix {
    type Error = anyhow::Error;

    fn try_from(repr: SparseMatrixRepr) -> anyhow::Result<Self> {
        Self::from_cols(repr.cols, repr.rows)
    }
}

impl SparseMatrix {
    pub fn new() -> Self {
        Self {
            cols: Vec::new(),
            rows: None,
        }
    }

    pub fn with_rows(rows: usize) -> Self {
        Self {
            cols: Vec::new(),
            rows: Some(rows),
        }
    }

    pub fn from_cols(cols: Vec<SparseVector>, rows: Option<usize>) -> anyhow::Result<Self> {
        let mut out = Self {
            cols: Vec::with_capacity(cols.len()),
            rows,
        };
        for col in cols {
            out.push(col)?;
        }
        Ok(out)
    }

    /// Square sparse identity.
    pub fn eye(n: usize) -> Self {
        let cols = (0..n)
            .map(|i| SparseVector::from_sorted_parts(vec![i], vec![1.0], Some(n)))
            .collect();
        Self {
            cols,
            rows: Some(n),
        }
    }

    pub fn declared_rows(&self) -> Option<usize> {
        self.rows
    }

    pub fn rows(&self) -> usize {
        self.rows.unwrap_or_else(|| {
            self.cols
                .iter()
                .map(SparseVector::len)
                .max()
                .unwrap_or(0)
        })
    }

    pub fn cols(&self) -> usize {
        self.cols.len()
    }

    /// Fixes the row count; fails when a stored column does not fit.
    pub fn set_rows(&mut self, rows: usize) -> anyhow::Result<&mut Self> {
        for col in &self.cols {
            Self::check_col_fits(col, rows)?;
        }
        self.rows = Some(rows);
        Ok(self)
    }

    fn check_col_fits(col: &SparseVector, rows: usize) -> anyhow::Result<()> {
        if let Some(d) = col.dim() {
            if d > rows {
                bail!(LinalgError::DimensionMismatch {
                    op: "sparse column",
                    expected: rows,
                    found: d
                });
            }
        }
        if let Some(last) = col.max_index() {
            check_index(last, rows)?;
        }
        Ok(())
    }

    pub fn nnz(&self) -> usize {
        self.cols.iter().map(SparseVector::nnz).sum()
    }

    pub fn col_iter(&self) -> std::slice::Iter<'_, SparseVector> {
        self.cols.iter()
    }

    pub fn at(&self, row: usize, col: usize) -> anyhow::Result<f64> {
        check_index(col, self.cols())?;
        if let Some(rows) = self.rows {
            check_index(row, rows)?;
        }
        Ok(self.cols[col].get(row))
    }

    pub fn put(&mut self, row: usize, col: usize, value: f64) -> anyhow::Result<&mut Self> {
        check_index(col, self.cols())?;
        if let Some(rows) = self.rows {
            check_index(row, rows)?;
        }
        let column = &mut self.cols[col];
        if column.dim().is_some_and(|d| row >= d) {
            column.set_dim(self.rows)?;
        }
        column.put(row, value)?;
        Ok(self)
    }

    pub fn get_col(&self, col: usize) -> anyhow::Result<&SparseVector> {
        check_index(col, self.cols())?;
        Ok(&self.cols[col])
    }

    pub fn set_col(&mut self, col: usize, values: SparseVector) -> anyhow::Result<&mut Self> {
        check_index(col, self.cols())?;
        if let Some(rows) = self.rows {
            Self::check_col_fits(&values, rows)?;
        }
        self.cols[col] = values;
        Ok(self)
    }

    /// Appends a column; with a declared row count the column must fit in it.
    pub fn push(&mut self, col: SparseVector) -> anyhow::Result<&mut Self> {
        if let Some(rows) = self.rows {
            Self::check_col_fits(&col, rows)?;
        }
        self.cols.push(col);
        Ok(self)
    }

    pub(crate) fn push_unchecked(&mut self, col: SparseVector) {
        self.cols.push(col);
    }

    pub fn get_col_subset(&self, cols: &[usize]) -> anyhow::Result<SparseMatrix> {
        let mut out = Vec::with_capacity(cols.len());
        for &c in cols {
            check_index(c, self.cols())?;
            out.push(self.cols[c].clone());
        }
        Ok(Self {
            cols: out,
            rows: self.rows,
        })
    }

    pub fn col_norms(&self) -> Vector {
        self.cols.iter().map(SparseVector::norm).collect()
    }

    /// Scales every column to unit norm; zero columns are left as they are.
    pub fn normalize_cols(&mut self) -> &mut Self {
        for col in &mut self.cols {
            col.normalize();
        }
        self
    }

    pub fn frob(&self) -> f64 {
        self.cols
            .iter()
            .flat_map(|c| c.iter())
            .map(|(_, v)| v * v)
            .sum::<f64>()
            .sqrt()
    }

    pub fn transpose(&self) -> SparseMatrix {
        let rows = self.rows();
        let mut idx: Vec<Vec<usize>> = vec![Vec::new(); rows];
        let mut val: Vec<Vec<f64>> = vec![Vec::new(); rows];
        for (c, col) in self.cols.iter().enumerate() {
            for (r, v) in col.iter() {
                idx[r].push(c);
                val[r].push(v);
            }
        }
        let n = self.cols();
        let cols = idx
            .into_iter()
            .zip(val)
            .map(|(i, v)| SparseVector::from_sorted_parts(i, v, Some(n)))
            .collect();
        SparseMatrix {
            cols,
            rows: Some(n),
        }
    }

    pub fn plus(&self, other: &SparseMatrix) -> anyhow::Result<SparseMatrix> {
        check_dim("sparse matrix plus", self.cols(), other.cols())?;
        if let (Some(a), Some(b)) = (self.rows, other.rows) {
            check_dim("sparse matrix plus", a, b)?;
        }
        let cols = self
            .cols
            .iter()
            .zip(&other.cols)
            .map(|(a, b)| {
                let dim = match (a.dim(), b.dim()) {
                    (Some(x), Some(y)) => Some(x.max(y)),
                    (x, y) => x.or(y),
                };
                let mut a = a.clone();
                let mut b = b.clone();
                a.set_dim(None)?;
                b.set_dim(None)?;
                let mut sum = a.plus(&b)?;
                sum.set_dim(dim)?;
                Ok(sum)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(SparseMatrix {
            cols,
            rows: self.rows.or(other.rows),
        })
    }

    /// Dense copy of shape `rows() x cols()`.
    pub fn full(&self) -> Matrix {
        let mut out = Array2::<f64>::zeros((self.rows(), self.cols()));
        for (c, col) in self.cols.iter().enumerate() {
            for (r, v) in col.iter() {
                out[[r, c]] = v;
            }
        }
        Matrix::from_array(out)
    }
}

impl Multiply<f64> for SparseMatrix {
    type Output = SparseMatrix;

    fn multiply(&self, rhs: &f64) -> anyhow::Result<SparseMatrix> {
        let cols = self
            .cols
            .iter()
            .map(|c| c.multiply(rhs))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(SparseMatrix {
            cols,
            rows: self.rows,
        })
    }
}

impl Multiply<Vector> for SparseMatrix {
    type Output = Vector;

    fn multiply(&self, rhs: &Vector) -> anyhow::Result<Vector> {
        check_dim("sparse matrix-vector product", self.cols(), rhs.len())?;
        let mut out = vec![0.0; self.rows()];
        for (col, &x) in self.cols.iter().zip(rhs.iter()) {
            if x != 0.0 {
                col.add_scaled_to(&mut out, x);
            }
        }
        Ok(Vector::from_vec(out))
    }
}

impl MultiplyT<Vector> for SparseMatrix {
    type Output = Vector;

    fn multiply_t(&self, rhs: &Vector) -> anyhow::Result<Vector> {
        check_dim("transposed sparse matrix-vector product", self.rows(), rhs.len())?;
        let dense = rhs.as_slice();
        Ok(Vector::from_vec(
            self.cols.par_iter().map(|c| c.dot_slice(dense)).collect(),
        ))
    }
}

impl Multiply<SparseVector> for SparseMatrix {
    type Output = Vector;

    fn multiply(&self, rhs: &SparseVector) -> anyhow::Result<Vector> {
        rhs.check_fits("sparse matrix-sparse vector product", self.cols())?;
        let mut out = vec![0.0; self.rows()];
        for (c, x) in rhs.iter() {
            self.cols[c].add_scaled_to(&mut out, x);
        }
        Ok(Vector::from_vec(out))
    }
}

impl MultiplyT<SparseVector> for SparseMatrix {
    type Output = Vector;

    fn multiply_t(&self, rhs: &SparseVector) -> anyhow::Result<Vector> {
        rhs.check_fits("transposed sparse matrix-sparse vector product", self.rows())?;
        Ok(Vector::from_vec(
            self.cols.par_iter().map(|c| c.merge_dot(rhs)).collect(),
        ))
    }
}

impl Multiply<Matrix> for SparseMatrix {
    type Output = Matrix;

    fn multiply(&self, rhs: &Matrix) -> anyhow::Result<Matrix> {
        check_dim("sparse matrix-matrix product", self.cols(), rhs.rows())?;
        let dense = rhs.view();
        let mut out = Array2::<f64>::zeros((self.rows(), rhs.cols()));
        for (c, col) in self.cols.iter().enumerate() {
            let source = dense.row(c);
            for (r, v) in col.iter() {
                out.row_mut(r).scaled_add(v, &source);
            }
        }
        Ok(Matrix::from_array(out))
    }
}

impl MultiplyT<Matrix> for SparseMatrix {
    type Output = Matrix;

    fn multiply_t(&self, rhs: &Matrix) -> anyhow::Result<Matrix> {
        check_dim("transposed sparse matrix-matrix product", self.rows(), rhs.rows())?;
        let dense = rhs.view();
        let p = rhs.cols();
        let rows: Vec<Array1<f64>> = self
            .cols
            .par_iter()
            .map(|col| {
                let mut acc = Array1::<f64>::zeros(p);
                for (r, v) in col.iter() {
                    acc.scaled_add(v, &dense.row(r));
                }
                acc
            })
            .collect();
        let mut out = Array2::<f64>::zeros((self.cols(), p));
        for (c, row) in rows.iter().enumerate() {
            out.row_mut(c).assign(row);
        }
        Ok(Matrix::from_array(out))
    }
}
