//! # Online learners
//!
//! Models that absorb one example per call and never replay their history:
//! a perceptron, a k-nearest-neighbour regressor, online k-means (Lloyd) and a linear
//! Kalman filter.

mod kalman;
mod knn;
mod lloyd;
mod perceptron;

pub use kalman::KalmanFilter;
pub use knn::{KnnRegressor, KnnRegressorParams};
pub use lloyd::{Lloyd, LloydParams};
pub use perceptron::{Perceptron, PerceptronParams};
