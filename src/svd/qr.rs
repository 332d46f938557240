use anyhow::bail;

use crate::dense::Matrix;
use crate::error::LinalgError;

/// Thin QR factorization `a = q * r` of a dense `m x n` matrix.
///
/// `q` is `m x min(m, n)` with orthonormal columns and `r` is `min(m, n) x n` upper
/// triangular. Entries of `r` whose magnitude falls below `tol` are set to zero, which
/// makes rank deficiency visible on the diagonal.
pub fn qr(a: &Matrix, tol: f64) -> anyhow::Result<(Matrix, Matrix)> {
    if !(tol >= 0.0) {
        bail!(LinalgError::InvalidArgument(format!(
            "qr tolerance must be non-negative, got {tol}"
        )));
    }
    let decomposition = a.to_nalgebra().qr();
    let q = decomposition.q();
    let mut r = decomposition.r();
    r.iter_mut().filter(|v| v.abs() < tol).for_each(|v| *v = 0.0);
    Ok((Matrix::from_nalgebra(&q), Matrix::from_nalgebra(&r)))
}

/// Orthonormal basis of the column space of `a` together with `|diag(r)|`.
pub(crate) fn orthonormalize(a: &Matrix) -> (Matrix, Vec<f64>) {
    let decomposition = a.to_nalgebra().qr();
    let r = decomposition.r();
    let diag = (0..r.nrows().min(r.ncols()))
        .map(|i| r[(i, i)].abs())
        .collect();
    (Matrix::from_nalgebra(&decomposition.q()), diag)
}
