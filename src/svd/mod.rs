//! # Decompositions
//!
//! Truncated SVD by subspace iteration over any [`LinearOperator`], thin QR, and the
//! Moore-Penrose pseudoinverse.

mod qr;

pub use qr::qr;

use anyhow::{anyhow, bail};
use log::{debug, trace, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::dense::{Matrix, Vector};
use crate::error::LinalgError;
use crate::solver::LinearOperator;
use crate::utils::{seeded_rng, sort_permutation, Multiply};

/// Relative threshold below which singular values are dropped by [`inverse_svd`].
const PINV_EPS: f64 = 1e-16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvdParams {
    /// Maximum number of subspace iterations.
    pub iter: usize,
    /// Largest relative change of any singular value estimate accepted as converged.
    #[serde(with = "crate::utils::float")]
    pub tol: f64,
    /// Seed of the random starting subspace.
    pub seed: u64,
}

impl Default for SvdParams {
    fn default() -> Self {
        Self {
            iter: 100,
            tol: 1e-6,
            seed: 0,
        }
    }
}

impl SvdParams {
    pub fn with_iter(mut self, iter: usize) -> Self {
        self.iter = iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Rank-`k` factorization `a ~ u * diag(s) * v^T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Svd {
    u: Matrix,
    s: Vector,
    v: Matrix,
    iterations: usize,
}

impl Svd {
    /// Left singular vectors, `m x k`.
    pub fn u(&self) -> &Matrix {
        &self.u
    }

    /// Singular values in descending order.
    pub fn s(&self) -> &Vector {
        &self.s
    }

    /// Right singular vectors, `n x k`.
    pub fn v(&self) -> &Matrix {
        &self.v
    }

    /// Subspace iterations performed before stopping.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn rank(&self) -> usize {
        self.s.len()
    }

    /// Rank-`k` approximation `u * diag(s) * v^T`.
    pub fn reconstruct(&self) -> Matrix {
        let mut us = self.u.as_array().clone();
        for (mut col, s) in us.columns_mut().into_iter().zip(self.s.iter()) {
            col *= *s;
        }
        Matrix::from_array(us.dot(&self.v.as_array().t()))
    }
}

/// Computes the top `k` singular triplets of `a` without densifying it.
///
/// A random `n x k` block is driven towards the dominant right singular subspace by
/// repeated application of `a^T a` with re-orthonormalization. Iteration stops after
/// `params.iter` rounds or once every singular value estimate moves by less than
/// `params.tol` relative to its size. A final Rayleigh-Ritz step on `a * V` yields the
/// triplets.
pub fn svd<A: LinearOperator + ?Sized>(a: &A, k: usize, params: &SvdParams) -> anyhow::Result<Svd> {
    let (m, n) = (a.nrows(), a.ncols());
    if k == 0 || k > m.min(n) {
        bail!(LinalgError::InvalidArgument(format!(
            "svd rank {k} must be between 1 and {}",
            m.min(n)
        )));
    }
    if !(params.tol >= 0.0) {
        bail!(LinalgError::InvalidConfiguration(format!(
            "svd tolerance must be non-negative, got {}",
            params.tol
        )));
    }

    let mut rng = seeded_rng(params.seed);
    let (mut v, _) = qr::orthonormalize(&Matrix::randn(n, k, &mut rng));
    let mut estimates = vec![0.0; k];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.iter {
        let z = a.apply_t_block(&a.apply_block(&v)?)?;
        let (q, r_diag) = qr::orthonormalize(&z);
        v = q;
        iterations += 1;

        let current: Vec<f64> = r_diag.iter().map(|d| d.sqrt()).collect();
        let change = current
            .iter()
            .zip(&estimates)
            .map(|(s, prev)| (s - prev).abs() / s.max(f64::MIN_POSITIVE))
            .fold(0.0, f64::max);
        estimates = current;
        trace!("svd: iteration {iterations}, max relative change {change}");
        if change < params.tol {
            converged = true;
            break;
        }
    }
    if converged {
        debug!("svd: rank {k} converged after {iterations} iterations");
    } else {
        warn!("svd: rank {k} stopped at the iteration limit ({iterations})");
    }

    // Rayleigh-Ritz on the projected block.
    let projected = a.apply_block(&v)?.to_nalgebra().svd(true, true);
    let u_small = projected
        .u
        .ok_or_else(|| anyhow!("SVD did not produce left singular vectors"))?;
    let vt_small = projected
        .v_t
        .ok_or_else(|| anyhow!("SVD did not produce right singular vectors"))?;
    let values: Vec<f64> = projected.singular_values.iter().copied().collect();
    let order = sort_permutation(&values, false);

    let s = Vector::from_vec(order.iter().map(|&i| values[i]).collect());
    let u = Matrix::from_array(Array2::from_shape_fn((m, k), |(r, c)| u_small[(r, order[c])]));
    let w = Matrix::from_array(Array2::from_shape_fn((k, k), |(r, c)| vt_small[(order[c], r)]));
    let v = v.multiply(&w)?;

    Ok(Svd {
        u,
        s,
        v,
        iterations,
    })
}

/// Moore-Penrose pseudoinverse of a dense matrix.
///
/// Singular values at or below `1e-16 * max(rows, cols) * max(s)` are treated as zero.
pub fn inverse_svd(a: &Matrix) -> anyhow::Result<Matrix> {
    if a.rows() == 0 || a.cols() == 0 {
        return Ok(Matrix::zeros(a.cols(), a.rows()));
    }
    let decomposition = a.to_nalgebra().svd(true, true);
    let max_s = decomposition.singular_values.max();
    let threshold = PINV_EPS * a.rows().max(a.cols()) as f64 * max_s;
    let pinv = decomposition
        .pseudo_inverse(threshold)
        .map_err(|e| anyhow!("Failed to compute pseudoinverse: {}", e))?;
    Ok(Matrix::from_nalgebra(&pinv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MultiplyT, Persist};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::io::BufReader;

    fn diagonal_like() -> Matrix {
        Matrix::from_rows(&[
            vec![5.0, 0.0, 0.0],
            vec![0.0, 3.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.0, 0.0],
        ])
        .unwrap()
    }

    fn reconstruction_error(a: &Matrix, svd: &Svd) -> f64 {
        a.minus(&svd.reconstruct()).unwrap().frob()
    }

    #[test]
    fn test_simple_svd() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let svd = svd(&a, 2, &SvdParams::default()).unwrap();
        assert_eq!((svd.u().rows(), svd.u().cols()), (2, 2));
        assert_eq!((svd.v().rows(), svd.v().cols()), (2, 2));
        assert_abs_diff_eq!(svd.s()[0], 5.4649857, epsilon = 1e-6);
        assert_abs_diff_eq!(svd.s()[1], 0.3659662, epsilon = 1e-6);
        assert!(reconstruction_error(&a, &svd) < 1e-9);
    }

    #[test]
    fn test_error_decreases_with_rank() {
        let _ = env_logger::builder().is_test(true).try_init();
        let a = diagonal_like();
        let mut previous = f64::INFINITY;
        for k in 1..=3 {
            let svd = svd(&a, k, &SvdParams::default()).unwrap();
            for i in 1..k {
                assert!(svd.s()[i - 1] >= svd.s()[i]);
            }
            let err = reconstruction_error(&a, &svd);
            assert!(err < previous);
            previous = err;
        }
        assert!(previous < 1e-9);

        let tight = SvdParams::default().with_iter(500).with_tol(1e-12);
        let rank_one = svd(&a, 1, &tight).unwrap();
        assert!(rank_one.iterations() < 500);
        assert_abs_diff_eq!(rank_one.s()[0], 5.0, epsilon = 1e-8);
        assert_abs_diff_eq!(reconstruction_error(&a, &rank_one), 10f64.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_sparse_matches_dense() {
        let a = diagonal_like();
        let sparse = a.sparse();
        let params = SvdParams::default().with_seed(7).with_tol(1e-12);
        let dense = svd(&a, 2, &params).unwrap();
        let from_sparse = svd(&sparse, 2, &params).unwrap();
        for i in 0..2 {
            assert_abs_diff_eq!(dense.s()[i], from_sparse.s()[i], epsilon = 1e-9);
        }
        let orthogonality = from_sparse.v().multiply_t(from_sparse.v()).unwrap();
        assert_abs_diff_eq!(orthogonality[(0, 1)], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_iteration_budget_and_bad_rank() {
        let a = diagonal_like();
        let svd1 = svd(&a, 1, &SvdParams::default().with_iter(1).with_tol(0.0)).unwrap();
        assert_eq!(svd1.iterations(), 1);
        assert_eq!(svd1.rank(), 1);
        assert!(svd(&a, 0, &SvdParams::default()).is_err());
        assert!(svd(&a, 4, &SvdParams::default()).is_err());
    }

    #[test]
    fn test_inverse_svd() {
        let a = Matrix::from_rows(&[vec![2.0, 0.0], vec![0.0, 4.0], vec![0.0, 0.0]]).unwrap();
        let pinv = inverse_svd(&a).unwrap();
        assert_eq!((pinv.rows(), pinv.cols()), (2, 3));
        assert_abs_diff_eq!(pinv[(0, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(pinv[(1, 1)], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(pinv[(0, 2)], 0.0, epsilon = 1e-12);

        // Singular values at or below 1e-16 * max(rows, cols) * max(s) are not inverted.
        let tiny = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1e-17]]).unwrap();
        let pinv = inverse_svd(&tiny).unwrap();
        assert_abs_diff_eq!(pinv[(0, 0)], 1.0, epsilon = 1e-12);
        assert_eq!(pinv[(1, 1)], 0.0);
        let small = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1e-15]]).unwrap();
        let pinv = inverse_svd(&small).unwrap();
        assert_relative_eq!(pinv[(1, 1)], 1e15, max_relative = 1e-9);

        let zero = inverse_svd(&Matrix::zeros(2, 3)).unwrap();
        assert_eq!(zero, Matrix::zeros(3, 2));
    }

    #[test]
    fn test_save_load() {
        let a = diagonal_like();
        let svd = svd(&a, 2, &SvdParams::default()).unwrap();
        let mut buffer = Vec::new();
        svd.save(&mut buffer).unwrap();
        let loaded = Svd::load(BufReader::new(buffer.as_slice())).unwrap();
        assert_eq!(loaded, svd);
    }
}
