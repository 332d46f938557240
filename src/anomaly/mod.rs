//! # Nearest-neighbour anomaly detection
//!
//! A point is anomalous when its squared distance to the closest known point exceeds
//! the `(1 - rate)`-quantile of the nearest-neighbour distances among the known points.

use anyhow::bail;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureMatrix, FeatureStore, FeatureVector};
use crate::dense::Vector;
use crate::error::LinalgError;
use crate::similarity::pairwise_squared_distances;
use crate::utils::validated_serde;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct NearestNeighborParams {
    /// Expected share of anomalies among the fitted points, in `[0, 1)`.
    #[serde(with = "crate::utils::float")]
    pub rate: f64,
}

validated_serde!(NearestNeighborParams);

impl Default for NearestNeighborParams {
    fn default() -> Self {
        Self { rate: 0.05 }
    }
}

impl NearestNeighborParams {
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.rate >= 0.0 && self.rate < 1.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "rate must lie in [0, 1), got {}",
                self.rate
            )));
        }
        Ok(())
    }
}

/// Nearest fitted point and its squared distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub nearest: usize,
    #[serde(with = "crate::utils::float")]
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighborAD {
    params: NearestNeighborParams,
    points: Option<FeatureStore>,
    /// Squared distance from each point to its nearest other point.
    #[serde(with = "crate::utils::float::seq")]
    nn_distances: Vec<f64>,
    #[serde(with = "crate::utils::float")]
    threshold: f64,
}

impl NearestNeighborAD {
    pub fn new(params: NearestNeighborParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            points: None,
            nn_distances: Vec::new(),
            threshold: 0.0,
        })
    }

    pub fn params(&self) -> &NearestNeighborParams {
        &self.params
    }

    /// Current anomaly threshold on squared distances.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn n_points(&self) -> usize {
        self.nn_distances.len()
    }

    /// Replaces the known points with the columns of `x`.
    pub fn fit(&mut self, x: FeatureMatrix<'_>) -> anyhow::Result<&mut Self> {
        if x.n_examples() < 2 {
            bail!(LinalgError::InvalidArgument(
                "nearest-neighbour detection needs at least two points".to_string()
            ));
        }
        let distances = pairwise_squared_distances(x);
        self.nn_distances = distances
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, &d)| d)
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        self.points = Some(FeatureStore::from_features(x));
        self.threshold = self.quantile_threshold();
        debug!(
            "nearest-neighbour detector: fitted {} points, threshold {}",
            self.n_points(),
            self.threshold
        );
        Ok(self)
    }

    /// Adds `x` to the known points. Only the nearest-neighbour distances that `x`
    /// improves are touched; the threshold is then recomputed from all of them.
    pub fn update(&mut self, x: FeatureVector<'_>) -> anyhow::Result<&mut Self> {
        let points = self
            .points
            .as_mut()
            .ok_or(LinalgError::NotFitted("NearestNeighborAD"))?;
        if let FeatureStore::Dense(_) = points {
            x.check_dim("nearest-neighbour update", points.dim())?;
        }
        let distances: Vec<f64> = points
            .view()
            .columns()
            .map(|col| col.squared_distance(&x))
            .collect();
        points.push(x)?;

        let mut own = f64::INFINITY;
        for (known, &d) in self.nn_distances.iter_mut().zip(&distances) {
            *known = known.min(d);
            own = own.min(d);
        }
        self.nn_distances.push(own);
        self.threshold = self.quantile_threshold();
        Ok(self)
    }

    /// Closest known point to `x`; ties go to the earlier point.
    pub fn explain(&self, x: FeatureVector<'_>) -> anyhow::Result<Explanation> {
        let points = self
            .points
            .as_ref()
            .ok_or(LinalgError::NotFitted("NearestNeighborAD"))?;
        if let FeatureStore::Dense(_) = points {
            x.check_dim("nearest-neighbour predict", points.dim())?;
        }
        let mut best = Explanation {
            nearest: 0,
            distance: f64::INFINITY,
        };
        for (i, col) in points.view().columns().enumerate() {
            let distance = col.squared_distance(&x);
            if distance < best.distance {
                best = Explanation {
                    nearest: i,
                    distance,
                };
            }
        }
        Ok(best)
    }

    /// `1` if `x` is anomalous, `0` otherwise.
    pub fn predict(&self, x: FeatureVector<'_>) -> anyhow::Result<u8> {
        let explanation = self.explain(x)?;
        Ok(u8::from(explanation.distance > self.threshold))
    }

    pub fn predict_matrix(&self, x: FeatureMatrix<'_>) -> anyhow::Result<Vector> {
        x.map_columns(|col| Ok(f64::from(self.predict(col)?)))
    }

    /// Element at position `floor((1 - rate) * n)` of the sorted distances, clamped to
    /// the last element.
    fn quantile_threshold(&self) -> f64 {
        let mut sorted = self.nn_distances.clone();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let position = (((1.0 - self.params.rate) * n as f64).floor() as usize).min(n - 1);
        sorted[position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::Matrix;
    use crate::utils::Persist;
    use std::io::BufReader;

    fn line() -> Matrix {
        // Points at 0, 1, 2, 3 and an outlier at 10.
        Matrix::from_rows(&[vec![0.0, 1.0, 2.0, 3.0, 10.0]]).unwrap()
    }

    #[test]
    fn test_threshold_and_predictions() {
        let x = line();
        let mut ad = NearestNeighborAD::new(NearestNeighborParams::default().with_rate(0.2)).unwrap();
        ad.fit((&x).into()).unwrap();
        // NN distances: 1, 1, 1, 1, 49; position floor(0.8 * 5) = 4.
        assert_eq!(ad.threshold(), 49.0);

        // Position floor(0.6 * 5) = 3.
        let mut ad = NearestNeighborAD::new(NearestNeighborParams::default().with_rate(0.4)).unwrap();
        ad.fit((&x).into()).unwrap();
        assert_eq!(ad.threshold(), 1.0);

        let near = Vector::from_vec(vec![1.5]);
        assert_eq!(ad.predict((&near).into()).unwrap(), 0);
        let far = Vector::from_vec(vec![-5.0]);
        assert_eq!(ad.predict((&far).into()).unwrap(), 1);

        let explanation = ad.explain((&far).into()).unwrap();
        assert_eq!(explanation.nearest, 0);
        assert_eq!(explanation.distance, 25.0);
    }

    #[test]
    fn test_fitted_points_are_never_anomalous() {
        let x = Matrix::from_rows(&[
            vec![0.0, 5.0, 1.0, 9.0, 2.0],
            vec![1.0, -3.0, 0.5, 4.0, 7.0],
        ])
        .unwrap();
        for rate in [0.0, 0.3, 0.99] {
            let mut ad = NearestNeighborAD::new(NearestNeighborParams::default().with_rate(rate))
                .unwrap();
            ad.fit((&x.sparse()).into()).unwrap();
            let flags = ad.predict_matrix((&x.sparse()).into()).unwrap();
            assert!(flags.iter().all(|&f| f == 0.0));
        }
    }

    #[test]
    fn test_update_matches_refit() {
        let x = line();
        let params = NearestNeighborParams::default().with_rate(0.25);
        let mut incremental = NearestNeighborAD::new(params).unwrap();
        incremental.fit((&x).into()).unwrap();
        let new_point = Vector::from_vec(vec![9.0]);
        incremental.update((&new_point).into()).unwrap();

        let mut grown = x.clone();
        grown.push_col(&new_point).unwrap();
        let mut refit = NearestNeighborAD::new(params).unwrap();
        refit.fit((&grown).into()).unwrap();

        assert_eq!(incremental.n_points(), 6);
        assert_eq!(incremental.threshold(), refit.threshold());
        assert_eq!(incremental, refit);
    }

    #[test]
    fn test_errors() {
        assert!(NearestNeighborAD::new(NearestNeighborParams::default().with_rate(1.0)).is_err());
        let mut ad = NearestNeighborAD::new(NearestNeighborParams::default()).unwrap();
        assert!(ad.predict((&Vector::ones(1)).into()).is_err());
        assert!(ad.update((&Vector::ones(1)).into()).is_err());
        assert!(ad.fit((&Matrix::ones(1, 1)).into()).is_err());

        ad.fit((&line()).into()).unwrap();
        let before = ad.clone();
        assert!(ad.update((&Vector::ones(2)).into()).is_err());
        assert_eq!(ad, before);
    }

    #[test]
    fn test_save_load() {
        let mut ad = NearestNeighborAD::new(NearestNeighborParams::default()).unwrap();
        ad.fit((&line()).into()).unwrap();
        let mut buffer = Vec::new();
        ad.save(&mut buffer).unwrap();
        let loaded = NearestNeighborAD::load(BufReader::new(buffer.as_slice())).unwrap();
        assert_eq!(loaded, ad);
    }
}
