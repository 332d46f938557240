use anyhow::bail;
use log::trace;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, LinalgError};
use crate::utils::validated_serde;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct RecLinRegParams {
    pub dim: usize,
    /// Forgetting factor in `(0, 1]`; values below one discount old examples.
    #[serde(with = "crate::utils::float")]
    pub forget_fact: f64,
    /// Initial regularization; the inverse covariance starts at `I / reg_fact`.
    #[serde(with = "crate::utils::float")]
    pub reg_fact: f64,
}

validated_serde!(RecLinRegParams);

impl RecLinRegParams {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            forget_fact: 1.0,
            reg_fact: 1.0,
        }
    }

    pub fn with_forget_fact(mut self, forget_fact: f64) -> Self {
        self.forget_fact = forget_fact;
        self
    }

    pub fn with_reg_fact(mut self, reg_fact: f64) -> Self {
        self.reg_fact = reg_fact;
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.forget_fact > 0.0 && self.forget_fact <= 1.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "forget_fact must lie in (0, 1], got {}",
                self.forget_fact
            )));
        }
        if !(self.reg_fact > 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "reg_fact must be positive, got {}",
                self.reg_fact
            )));
        }
        Ok(())
    }
}

/// Recursive least squares.
///
/// Each update costs `O(dim^2)` and never revisits earlier examples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecLinReg {
    params: RecLinRegParams,
    weights: Vector,
    /// Inverse of the (discounted, regularized) input covariance.
    p: Matrix,
    n_examples: usize,
}

impl RecLinReg {
    pub fn new(params: RecLinRegParams) -> anyhow::Result<Self> {
        params.validate()?;
        let p = Matrix::from_array(ndarray::Array2::eye(params.dim) / params.reg_fact);
        Ok(Self {
            weights: Vector::zeros(params.dim),
            p,
            params,
            n_examples: 0,
        })
    }

    pub fn params(&self) -> &RecLinRegParams {
        &self.params
    }

    pub fn dim(&self) -> usize {
        self.params.dim
    }

    pub fn n_examples(&self) -> usize {
        self.n_examples
    }

    pub fn weights(&self) -> &Vector {
        &self.weights
    }

    /// Incorporates one example.
    pub fn partial_fit(&mut self, x: FeatureVector<'_>, y: f64) -> anyhow::Result<&mut Self> {
        x.check_dim("recursive regression update", self.dim())?;
        if !y.is_finite() {
            bail!(LinalgError::InvalidArgument(format!(
                "target must be finite, got {y}"
            )));
        }
        let x = x.to_dense(self.dim()).to_array();
        let lambda = self.params.forget_fact;
        let p = self.p.as_array_mut();

        let px: Array1<f64> = p.dot(&x);
        let gain = &px / (lambda + x.dot(&px));
        let error = y - self.weights.view().dot(&x);
        self.weights.view_mut().scaled_add(error, &gain);

        // P <- (P - gain px^T) / lambda, using the symmetry of P.
        for ((r, c), value) in p.indexed_iter_mut() {
            *value = (*value - gain[r] * px[c]) / lambda;
        }
        self.n_examples += 1;
        trace!("recursive regression: update {}, error {error}", self.n_examples);
        Ok(self)
    }

    /// Incorporates every column of `x` in order.
    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        check_dim("recursive regression targets", x.n_examples(), y.len())?;
        if x.n_examples() > 0 && x.dim() != self.dim() {
            bail!(LinalgError::DimensionMismatch {
                op: "recursive regression fit",
                expected: self.dim(),
                found: x.dim(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            bail!(LinalgError::InvalidArgument(
                "targets must be finite".to_string()
            ));
        }
        for (col, &target) in x.columns().zip(y.iter()) {
            self.partial_fit(col, target)?;
        }
        Ok(self)
    }

    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<f64> {
        x.check_dim("recursive regression predict", self.dim())?;
        Ok(x.dot(self.weights.as_slice()))
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        x.map_columns(|col| self.predict(col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linreg::{RidgeReg, RidgeRegParams};
    use crate::utils::Persist;
    use approx::assert_abs_diff_eq;
    use std::io::BufReader;

    #[test]
    fn test_matches_ridge_regression() {
        // Without forgetting, RLS started at P = I / reg equals ridge with gamma = reg.
        let x = Matrix::from_rows(&[
            vec![1.0, 2.0, 0.5, -1.0, 3.0],
            vec![0.0, 1.0, -2.0, 1.0, 1.0],
        ])
        .unwrap();
        let y = Vector::from_vec(vec![1.0, 4.0, -3.0, 0.0, 7.0]);

        let mut rls = RecLinReg::new(RecLinRegParams::new(2).with_reg_fact(0.5)).unwrap();
        rls.fit((&x).into(), &y).unwrap();
        let mut ridge = RidgeReg::new(RidgeRegParams::default().with_gamma(0.5)).unwrap();
        ridge.fit((&x).into(), &y).unwrap();

        let expected = ridge.weights().unwrap();
        for i in 0..2 {
            assert_abs_diff_eq!(rls.weights()[i], expected[i], epsilon = 1e-10);
        }
        assert_eq!(rls.n_examples(), 5);
    }

    #[test]
    fn test_forgetting_tracks_drift() {
        let mut rls =
            RecLinReg::new(RecLinRegParams::new(1).with_forget_fact(0.5).with_reg_fact(1e-3))
                .unwrap();
        let one = Vector::from_vec(vec![1.0]);
        for _ in 0..20 {
            rls.partial_fit((&one).into(), 1.0).unwrap();
        }
        for _ in 0..20 {
            rls.partial_fit((&one).into(), 5.0).unwrap();
        }
        assert_abs_diff_eq!(rls.predict((&one).into()).unwrap(), 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(RecLinReg::new(RecLinRegParams::new(2).with_forget_fact(1.5)).is_err());
        let mut rls = RecLinReg::new(RecLinRegParams::new(2)).unwrap();
        let before = rls.clone();
        assert!(rls.partial_fit((&Vector::ones(3)).into(), 1.0).is_err());
        assert!(rls.partial_fit((&Vector::ones(2)).into(), f64::NAN).is_err());
        assert_eq!(rls, before);
    }

    #[test]
    fn test_save_load() {
        let mut rls = RecLinReg::new(RecLinRegParams::new(2)).unwrap();
        let x = Vector::from_vec(vec![1.0, 2.0]);
        rls.partial_fit((&x).into(), 3.0).unwrap();
        let mut buffer = Vec::new();
        rls.save(&mut buffer).unwrap();
        let loaded = RecLinReg::load(BufReader::new(buffer.as_slice())).unwrap();
        assert_eq!(loaded, rls);
    }
}
