use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureVector};
use crate::dense::Vector;
use crate::error::{check_dim, LinalgError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerceptronParams {
    pub dim: usize,
    pub use_bias: bool,
}

impl PerceptronParams {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            use_bias: false,
        }
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }
}

/// Classic mistake-driven perceptron with outputs in `{0, 1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perceptron {
    params: PerceptronParams,
    weights: Vector,
    #[serde(with = "crate::utils::float")]
    bias: f64,
}

impl Perceptron {
    pub fn new(params: PerceptronParams) -> Self {
        Self {
            weights: Vector::zeros(params.dim),
            bias: 0.0,
            params,
        }
    }

    pub fn params(&self) -> &PerceptronParams {
        &self.params
    }

    pub fn weights(&self) -> &Vector {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Learns from one example; `y > 0` marks the positive class. Weights only move when
    /// the current prediction is wrong.
    pub fn update(&mut self, x: FeatureVector<'_>, y: f64) -> anyhow::Result<&mut Self> {
        if y.is_nan() {
            bail!(LinalgError::InvalidArgument("label is NaN".to_string()));
        }
        let target = if y > 0.0 { 1 } else { 0 };
        if self.predict(x)? != target {
            let direction = if target == 1 { 1.0 } else { -1.0 };
            x.add_scaled_to(self.weights.as_mut_slice(), direction);
            if self.params.use_bias {
                self.bias += direction;
            }
        }
        Ok(self)
    }

    pub fn fit(&mut self, x: FeatureMatrix<'_>, y: &Vector) -> anyhow::Result<&mut Self> {
        check_dim("perceptron targets", x.n_examples(), y.len())?;
        for col in x.columns() {
            col.check_dim("perceptron fit", self.params.dim)?;
        }
        for (col, &label) in x.columns().zip(y.iter()) {
            self.update(col, label)?;
        }
        Ok(self)
    }

    /// `1` when `w . x + b > 0`, otherwise `0`.
    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<u8> {
        x.check_dim("perceptron predict", self.params.dim)?;
        Ok(u8::from(x.dot(self.weights.as_slice()) + self.bias > 0.0))
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        x.map_columns(|col| Ok(f64::from(self.predict(col)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::Matrix;
    use crate::utils::Persist;
    use std::io::BufReader;

    #[test]
    fn test_learns_separable_data() {
        let x = Matrix::from_rows(&[
            vec![2.0, 1.0, -1.0, -2.0, 3.0, -0.5],
            vec![1.0, 2.0, -2.0, -1.0, 0.5, -3.0],
        ])
        .unwrap();
        let y = Vector::from_vec(vec![1.0, 1.0, -1.0, -1.0, 1.0, -1.0]);
        let mut perceptron = Perceptron::new(PerceptronParams::new(2).with_bias(true));
        for _ in 0..10 {
            perceptron.fit((&x).into(), &y).unwrap();
        }
        let predictions = perceptron.predict_matrix((&x).into()).unwrap();
        assert_eq!(predictions.as_slice(), &[1.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_update_only_on_mistakes() {
        let mut perceptron = Perceptron::new(PerceptronParams::new(2));
        let x = Vector::from_vec(vec![1.0, 0.0]);
        perceptron.update((&x).into(), 1.0).unwrap();
        assert_eq!(perceptron.weights().as_slice(), &[1.0, 0.0]);
        perceptron.update((&x).into(), 1.0).unwrap();
        assert_eq!(perceptron.weights().as_slice(), &[1.0, 0.0]);

        let sparse = x.sparse();
        perceptron.update((&sparse).into(), 0.0).unwrap();
        assert_eq!(perceptron.weights().as_slice(), &[0.0, 0.0]);
        assert_eq!(perceptron.bias(), 0.0);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let mut perceptron = Perceptron::new(PerceptronParams::new(2));
        assert!(perceptron.update((&Vector::ones(3)).into(), 1.0).is_err());
        let x = Matrix::ones(3, 2);
        assert!(perceptron.fit((&x).into(), &Vector::ones(2)).is_err());
        assert_eq!(perceptron.weights().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_save_load() {
        let mut perceptron = Perceptron::new(PerceptronParams::new(2).with_bias(true));
        perceptron
            .update((&Vector::from_vec(vec![0.5, -1.0])).into(), 1.0)
            .unwrap();
        let mut buffer = Vec::new();
        perceptron.save(&mut buffer).unwrap();
        let loaded = Perceptron::load(BufReader::new(buffer.as_slice())).unwrap();
        assert_eq!(loaded, perceptron);
    }
}
