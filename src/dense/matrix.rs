use std::ops::Index;

use anyhow::bail;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{check_dim, check_index, LinalgError};
use crate::sparse::{SparseMatrix, SparseVector};
use crate::utils::{Direction, Multiply, MultiplyT};

use super::Vector;

/// Dense `rows x cols` matrix of `f64`.
///
/// When a matrix holds examples, each column is one example. Columns can be appended
/// with [`Matrix::push_col`]; the row count is fixed once the first column exists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "MatrixRepr")]
pub struct Matrix {
    data: Array2<f64>,
}

/// Stored form of a [`Matrix`]: its shape and the entries in row-major order.
#[derive(Serialize, Deserialize)]
struct MatrixRepr {
    rows: usize,
    cols: usize,
    #[serde(with = "crate::utils::float::seq")]
    data: Vec<f64>,
}

impl Serialize for Matrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MatrixRepr {
            rows: self.rows(),
            cols: self.cols(),
            data: self.data.iter().copied().collect(),
        }
        .serialize(serializer)
    }
}

impl TryFrom<MatrixRepr> for Matrix {
    type Error = anyhow::Error;

    fn try_from(repr: MatrixRepr) -> anyhow::Result<Self> {
        let data = Array2::from_shape_vec((repr.rows, repr.cols), repr.data)
            .map_err(|e| LinalgError::Serialization(e.to_string()))?;
        Ok(Self { data })
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new()
    }
}

impl Matrix {
    pub fn new() -> Self {
        Self {
            data: Array2::zeros((0, 0)),
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
        }
    }

    pub fn ones(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::ones((rows, cols)),
        }
    }

    pub fn eye(n: usize) -> Self {
        Self {
            data: Array2::eye(n),
        }
    }

    pub fn from_array(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// Builds a matrix from row slices; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> anyhow::Result<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut flat = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            check_dim("matrix from rows", cols, row.len())?;
            flat.extend_from_slice(row);
        }
        Ok(Self {
            data: Array2::from_shape_vec((rows.len(), cols), flat)?,
        })
    }

    /// Builds a matrix whose columns are `cols`.
    pub fn from_cols(cols: &[Vector]) -> anyhow::Result<Self> {
        let mut out = Self::new();
        for col in cols {
            out.push_col(col)?;
        }
        Ok(out)
    }

    /// Matrix of independent standard normal draws.
    pub fn randn<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        Self {
            data: Array2::from_shape_simple_fn((rows, cols), || rng.sample(StandardNormal)),
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    pub(crate) fn as_array_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub fn at(&self, row: usize, col: usize) -> anyhow::Result<f64> {
        check_index(row, self.rows())?;
        check_index(col, self.cols())?;
        Ok(self.data[[row, col]])
    }

    pub fn put(&mut self, row: usize, col: usize, value: f64) -> anyhow::Result<&mut Self> {
        check_index(row, self.rows())?;
        check_index(col, self.cols())?;
        self.data[[row, col]] = value;
        Ok(self)
    }

    pub fn plus(&self, other: &Matrix) -> anyhow::Result<Matrix> {
        self.check_same_shape("matrix plus", other)?;
        Ok(Self::from_array(&self.data + &other.data))
    }

    pub fn minus(&self, other: &Matrix) -> anyhow::Result<Matrix> {
        self.check_same_shape("matrix minus", other)?;
        Ok(Self::from_array(&self.data - &other.data))
    }

    fn check_same_shape(&self, op: &'static str, other: &Matrix) -> anyhow::Result<()> {
        check_dim(op, self.rows(), other.rows())?;
        check_dim(op, self.cols(), other.cols())
    }

    pub fn transpose(&self) -> Matrix {
        Self::from_array(self.data.t().to_owned())
    }

    pub fn get_row(&self, row: usize) -> anyhow::Result<Vector> {
        check_index(row, self.rows())?;
        Ok(Vector::from_vec(self.data.row(row).to_vec()))
    }

    pub fn get_col(&self, col: usize) -> anyhow::Result<Vector> {
        check_index(col, self.cols())?;
        Ok(Vector::from_vec(self.data.column(col).to_vec()))
    }

    pub fn set_row(&mut self, row: usize, values: &Vector) -> anyhow::Result<&mut Self> {
        check_index(row, self.rows())?;
        check_dim("set row", self.cols(), values.len())?;
        self.data.row_mut(row).assign(&values.view());
        Ok(self)
    }

    pub fn set_col(&mut self, col: usize, values: &Vector) -> anyhow::Result<&mut Self> {
        check_index(col, self.cols())?;
        check_dim("set column", self.rows(), values.len())?;
        self.data.column_mut(col).assign(&values.view());
        Ok(self)
    }

    /// Appends a column. A `0 x 0` matrix takes its row count from the first column.
    pub fn push_col(&mut self, values: &Vector) -> anyhow::Result<&mut Self> {
        if self.rows() == 0 && self.cols() == 0 {
            self.data = values.to_array().insert_axis(Axis(1));
            return Ok(self);
        }
        check_dim("push column", self.rows(), values.len())?;
        self.data.push_column(values.view())?;
        Ok(self)
    }

    pub fn row_norms(&self) -> Vector {
        self.data
            .rows()
            .into_iter()
            .map(|r| r.dot(&r).sqrt())
            .collect()
    }

    pub fn col_norms(&self) -> Vector {
        self.data
            .columns()
            .into_iter()
            .map(|c| c.dot(&c).sqrt())
            .collect()
    }

    /// Scales every column to unit norm; zero columns are left as they are.
    pub fn normalize_cols(&mut self) -> &mut Self {
        let norms = self.col_norms();
        for (mut col, &norm) in self.data.columns_mut().into_iter().zip(norms.iter()) {
            if norm > 0.0 {
                col.mapv_inplace(|v| v / norm);
            }
        }
        self
    }

    /// Frobenius norm.
    pub fn frob(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Main diagonal.
    pub fn diag(&self) -> Vector {
        Vector::from_vec(self.data.diag().to_vec())
    }

    /// Mean of every row (`ROW`) or column (`COLUMN`).
    pub fn mean(&self, direction: &Direction) -> Vector {
        let axis = reduction_axis(direction);
        let len = self.data.len_of(axis);
        if len == 0 {
            return Vector::zeros(self.data.len_of(Axis(1 - axis.index())));
        }
        Vector::from(self.data.sum_axis(axis) / len as f64)
    }

    /// Sample standard deviation (normalized by `n - 1`) of every row or column.
    pub fn std(&self, direction: &Direction) -> Vector {
        let axis = reduction_axis(direction);
        if self.data.len_of(axis) < 2 {
            return Vector::zeros(self.data.len_of(Axis(1 - axis.index())));
        }
        Vector::from(self.data.std_axis(axis, 1.0))
    }

    /// For every row, the column index of its largest element.
    pub fn row_max_idx(&self) -> Vec<usize> {
        self.data
            .rows()
            .into_iter()
            .map(|r| Vector::from_vec(r.to_vec()).max_idx().unwrap_or(0))
            .collect()
    }

    /// For every column, the row index of its largest element.
    pub fn col_max_idx(&self) -> Vec<usize> {
        self.data
            .columns()
            .into_iter()
            .map(|c| Vector::from_vec(c.to_vec()).max_idx().unwrap_or(0))
            .collect()
    }

    pub fn get_col_subset(&self, cols: &[usize]) -> anyhow::Result<Matrix> {
        for &c in cols {
            check_index(c, self.cols())?;
        }
        Ok(Self::from_array(self.data.select(Axis(1), cols)))
    }

    /// Rows `row_start..row_end` and columns `col_start..col_end`.
    pub fn get_submatrix(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> anyhow::Result<Matrix> {
        if row_start > row_end || col_start > col_end {
            bail!(LinalgError::InvalidArgument(format!(
                "empty submatrix range {}..{} x {}..{}",
                row_start, row_end, col_start, col_end
            )));
        }
        check_index(row_end, self.rows() + 1)?;
        check_index(col_end, self.cols() + 1)?;
        Ok(Self::from_array(
            self.data
                .slice(ndarray::s![row_start..row_end, col_start..col_end])
                .to_owned(),
        ))
    }

    /// Sparse copy holding the nonzero elements, with the row count fixed.
    pub fn sparse(&self) -> SparseMatrix {
        let mut out = SparseMatrix::with_rows(self.rows());
        for col in self.data.columns() {
            let col = Vector::from_vec(col.to_vec()).sparse();
            out.push_unchecked(col);
        }
        out
    }

    /// Solves `self * x = b`; see [`crate::solver::solve`].
    pub fn solve(&self, b: &Vector) -> anyhow::Result<Vector> {
        crate::solver::solve(self, b)
    }

    pub fn to_nalgebra(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows(), self.cols(), |r, c| self.data[[r, c]])
    }

    pub fn from_nalgebra(matrix: &DMatrix<f64>) -> Self {
        Self::from_array(Array2::from_shape_fn(matrix.shape(), |(r, c)| {
            matrix[(r, c)]
        }))
    }

    pub(crate) fn column_view(&self, col: usize) -> ndarray::ArrayView1<'_, f64> {
        self.data.column(col)
    }
}

fn reduction_axis(direction: &Direction) -> Axis {
    match direction {
        Direction::ROW => Axis(1),
        Direction::COLUMN => Axis(0),
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[[row, col]]
    }
}

impl Multiply<f64> for Matrix {
    type Output = Matrix;

    fn multiply(&self, rhs: &f64) -> anyhow::Result<Matrix> {
        Ok(Self::from_array(&self.data * *rhs))
    }
}

impl Multiply<Vector> for Matrix {
    type Output = Vector;

    fn multiply(&self, rhs: &Vector) -> anyhow::Result<Vector> {
        check_dim("matrix-vector product", self.cols(), rhs.len())?;
        Ok(Vector::from(self.data.dot(&rhs.view())))
    }
}

impl MultiplyT<Vector> for Matrix {
    type Output = Vector;

    fn multiply_t(&self, rhs: &Vector) -> anyhow::Result<Vector> {
        check_dim("transposed matrix-vector product", self.rows(), rhs.len())?;
        Ok(Vector::from(self.data.t().dot(&rhs.view())))
    }
}

impl Multiply<Matrix> for Matrix {
    type Output = Matrix;

    fn multiply(&self, rhs: &Matrix) -> anyhow::Result<Matrix> {
        check_dim("matrix product", self.cols(), rhs.rows())?;
        Ok(Self::from_array(self.data.dot(&rhs.data)))
    }
}

impl MultiplyT<Matrix> for Matrix {
    type Output = Matrix;

    fn multiply_t(&self, rhs: &Matrix) -> anyhow::Result<Matrix> {
        check_dim("transposed matrix product", self.rows(), rhs.rows())?;
        Ok(Self::from_array(self.data.t().dot(&rhs.data)))
    }
}

impl Multiply<SparseVector> for Matrix {
    type Output = Vector;

    fn multiply(&self, rhs: &SparseVector) -> anyhow::Result<Vector> {
        rhs.check_fits("matrix-sparse vector product", self.cols())?;
        let mut out = Array1::<f64>::zeros(self.rows());
        for (i, v) in rhs.iter() {
            out.scaled_add(v, &self.data.column(i));
        }
        Ok(Vector::from(out))
    }
}

impl MultiplyT<SparseVector> for Matrix {
    type Output = Vector;

    fn multiply_t(&self, rhs: &SparseVector) -> anyhow::Result<Vector> {
        rhs.check_fits("transposed matrix-sparse vector product", self.rows())?;
        let mut out = Array1::<f64>::zeros(self.cols());
        for (i, v) in rhs.iter() {
            out.scaled_add(v, &self.data.row(i));
        }
        Ok(Vector::from(out))
    }
}

impl Multiply<SparseMatrix> for Matrix {
    type Output = Matrix;

    fn multiply(&self, rhs: &SparseMatrix) -> anyhow::Result<Matrix> {
        check_dim("matrix-sparse matrix product", self.cols(), rhs.rows())?;
        let mut out = Array2::<f64>::zeros((self.rows(), rhs.cols()));
        for (j, col) in rhs.col_iter().enumerate() {
            let product = self.multiply(col)?;
            out.column_mut(j).assign(&product.view());
        }
        Ok(Self::from_array(out))
    }
}

impl MultiplyT<SparseMatrix> for Matrix {
    type Output = Matrix;

    fn multiply_t(&self, rhs: &SparseMatrix) -> anyhow::Result<Matrix> {
        check_dim(
            "transposed matrix-sparse matrix product",
            self.rows(),
            rhs.rows(),
        )?;
        let mut out = Array2::<f64>::zeros((self.cols(), rhs.cols()));
        for (j, col) in rhs.col_iter().enumerate() {
            let product = self.multiply_t(col)?;
            out.column_mut(j).assign(&product.view());
        }
        Ok(Self::from_array(out))
    }
}
