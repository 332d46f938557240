use anyhow::bail;
use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, LinalgError};
use crate::sparse::SparseMatrix;
use crate::svd::inverse_svd;
use crate::utils::{Multiply, MultiplyT};

/// Residual norm below which conjugate gradient stops.
pub const CONJGRAD_TOL: f64 = 1e-6;

/// A matrix seen only through its products, so iterative methods can run on dense and
/// sparse operands alike without densifying.
pub trait LinearOperator: Sync {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// `self * x`
    fn apply(&self, x: &Vector) -> anyhow::Result<Vector>;

    /// `self^T * x`
    fn apply_t(&self, x: &Vector) -> anyhow::Result<Vector>;

    /// `self * x` for a block of column vectors.
    fn apply_block(&self, x: &Matrix) -> anyhow::Result<Matrix>;

    /// `self^T * x` for a block of column vectors.
    fn apply_t_block(&self, x: &Matrix) -> anyhow::Result<Matrix>;
}

impl LinearOperator for Matrix {
    fn nrows(&self) -> usize {
        self.rows()
    }

    fn ncols(&self) -> usize {
        self.cols()
    }

    fn apply(&self, x: &Vector) -> anyhow::Result<Vector> {
        self.multiply(x)
    }

    fn apply_t(&self, x: &Vector) -> anyhow::Result<Vector> {
        self.multiply_t(x)
    }

    fn apply_block(&self, x: &Matrix) -> anyhow::Result<Matrix> {
        self.multiply(x)
    }

    fn apply_t_block(&self, x: &Matrix) -> anyhow::Result<Matrix> {
        self.multiply_t(x)
    }
}

impl LinearOperator for SparseMatrix {
    fn nrows(&self) -> usize {
        self.rows()
    }

    fn ncols(&self) -> usize {
        self.cols()
    }

    fn apply(&self, x: &Vector) -> anyhow::Result<Vector> {
        self.multiply(x)
    }

    fn apply_t(&self, x: &Vector) -> anyhow::Result<Vector> {
        self.multiply_t(x)
    }

    fn apply_block(&self, x: &Matrix) -> anyhow::Result<Matrix> {
        self.multiply(x)
    }

    fn apply_t_block(&self, x: &Matrix) -> anyhow::Result<Matrix> {
        self.multiply_t(x)
    }
}

/// Solves `a * x = b`.
///
/// Square systems go through an LU factorization and fail with [`LinalgError::Singular`]
/// when no unique solution exists. Rectangular systems return the minimum-norm
/// least-squares solution via [`inverse_svd`].
pub fn solve(a: &Matrix, b: &Vector) -> anyhow::Result<Vector> {
    check_dim("solve", a.rows(), b.len())?;
    if a.rows() == a.cols() {
        let rhs = DVector::from_column_slice(b.as_slice());
        let x = a.to_nalgebra().lu().solve(&rhs).ok_or(LinalgError::Singular)?;
        if x.iter().any(|v| !v.is_finite()) {
            bail!(LinalgError::Singular);
        }
        Ok(Vector::from_slice(x.as_slice()))
    } else {
        inverse_svd(a)?.multiply(b)
    }
}

/// Solves `a * X = b` for every column of `b` at once.
pub fn solve_matrix(a: &Matrix, b: &Matrix) -> anyhow::Result<Matrix> {
    check_dim("solve_matrix", a.rows(), b.rows())?;
    if a.rows() == a.cols() {
        let x: DMatrix<f64> = a
            .to_nalgebra()
            .lu()
            .solve(&b.to_nalgebra())
            .ok_or(LinalgError::Singular)?;
        if x.iter().any(|v| !v.is_finite()) {
            bail!(LinalgError::Singular);
        }
        Ok(Matrix::from_nalgebra(&x))
    } else {
        inverse_svd(a)?.multiply(b)
    }
}

/// Outcome of a conjugate-gradient run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjGradReport {
    pub x: Vector,
    pub iterations: usize,
    /// Norm of `b - a * x` as tracked by the recurrence.
    #[serde(with = "crate::utils::float")]
    pub residual: f64,
}

/// Conjugate gradient for a symmetric positive-semidefinite `a`.
///
/// Starts from `x0` (zero when `None`) and runs at most `2 * dim` steps, stopping once
/// the residual norm drops below [`CONJGRAD_TOL`].
pub fn conjgrad<A: LinearOperator + ?Sized>(
    a: &A,
    b: &Vector,
    x0: Option<&Vector>,
) -> anyhow::Result<Vector> {
    Ok(conjgrad_report(a, b, x0)?.x)
}

/// [`conjgrad`] that also reports the iterations used and the final residual norm.
pub fn conjgrad_report<A: LinearOperator + ?Sized>(
    a: &A,
    b: &Vector,
    x0: Option<&Vector>,
) -> anyhow::Result<ConjGradReport> {
    let dim = a.ncols();
    check_dim("conjgrad (square operator)", a.nrows(), dim)?;
    check_dim("conjgrad", dim, b.len())?;
    let mut x = match x0 {
        Some(x0) => {
            check_dim("conjgrad initial guess", dim, x0.len())?;
            x0.clone()
        }
        None => Vector::zeros(dim),
    };

    let mut r = b.minus(&a.apply(&x)?)?;
    let mut p = r.clone();
    let mut rs_old = dot(&r, &r);
    let max_iterations = 2 * dim;
    let mut iterations = 0;

    while rs_old.sqrt() >= CONJGRAD_TOL && iterations < max_iterations {
        let ap = a.apply(&p)?;
        let curvature = dot(&p, &ap);
        if curvature <= 0.0 || !curvature.is_finite() {
            warn!("conjgrad: non-positive curvature {curvature} after {iterations} iterations");
            break;
        }
        let alpha = rs_old / curvature;
        x.axpy(alpha, &p);
        r.axpy(-alpha, &ap);
        let rs_new = dot(&r, &r);
        iterations += 1;
        trace!("conjgrad: iteration {iterations}, residual {}", rs_new.sqrt());

        p.scale_in_place(rs_new / rs_old);
        p.axpy(1.0, &r);
        rs_old = rs_new;
    }

    let residual = rs_old.sqrt();
    if residual >= CONJGRAD_TOL && iterations == max_iterations {
        warn!("conjgrad: stopped after {iterations} iterations with residual {residual}");
    } else {
        debug!("conjgrad: {iterations} iterations, residual {residual}");
    }
    Ok(ConjGradReport {
        x,
        iterations,
        residual,
    })
}

fn dot(a: &Vector, b: &Vector) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
