use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::dense::{Matrix, Vector};
use crate::error::{check_dim, LinalgError};
use crate::solver::solve_matrix;
use crate::utils::Multiply;

/// Linear Kalman filter.
///
/// Defaults: identity transition and process noise, identity measurement noise, zero
/// measurement and control matrices, zero state and error covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanFilter {
    transition: Matrix,
    control: Matrix,
    measurement: Matrix,
    process_noise: Matrix,
    measurement_noise: Matrix,
    state_pre: Vector,
    state_post: Vector,
    error_cov_pre: Matrix,
    error_cov_post: Matrix,
    gain: Matrix,
}

macro_rules! square_setter {
    ($name:ident, $field:ident, $dim:ident) => {
        pub fn $name(&mut self, value: Matrix) -> anyhow::Result<&mut Self> {
            let dim = self.$dim();
            check_dim(stringify!($name), dim, value.rows())?;
            check_dim(stringify!($name), dim, value.cols())?;
            self.$field = value;
            Ok(self)
        }
    };
}

impl KalmanFilter {
    /// Filter with `dynam_params` state variables, `measure_params` measured variables and
    /// `control_params` control inputs.
    pub fn new(
        dynam_params: usize,
        measure_params: usize,
        control_params: usize,
    ) -> anyhow::Result<Self> {
        if dynam_params == 0 || measure_params == 0 {
            bail!(LinalgError::InvalidConfiguration(
                "state and measurement dimensions must be positive".to_string()
            ));
        }
        Ok(Self {
            transition: Matrix::eye(dynam_params),
            control: Matrix::zeros(dynam_params, control_params),
            measurement: Matrix::zeros(measure_params, dynam_params),
            process_noise: Matrix::eye(dynam_params),
            measurement_noise: Matrix::eye(measure_params),
            state_pre: Vector::zeros(dynam_params),
            state_post: Vector::zeros(dynam_params),
            error_cov_pre: Matrix::zeros(dynam_params, dynam_params),
            error_cov_post: Matrix::zeros(dynam_params, dynam_params),
            gain: Matrix::zeros(dynam_params, measure_params),
        })
    }

    pub fn state_dim(&self) -> usize {
        self.transition.rows()
    }

    pub fn measurement_dim(&self) -> usize {
        self.measurement.rows()
    }

    pub fn control_dim(&self) -> usize {
        self.control.cols()
    }

    square_setter!(set_transition_matrix, transition, state_dim);
    square_setter!(set_process_noise_cov, process_noise, state_dim);
    square_setter!(set_error_cov_pre, error_cov_pre, state_dim);
    square_setter!(set_error_cov_post, error_cov_post, state_dim);
    square_setter!(set_measurement_noise_cov, measurement_noise, measurement_dim);

    pub fn set_measurement_matrix(&mut self, value: Matrix) -> anyhow::Result<&mut Self> {
        check_dim("set_measurement_matrix", self.measurement_dim(), value.rows())?;
        check_dim("set_measurement_matrix", self.state_dim(), value.cols())?;
        self.measurement = value;
        Ok(self)
    }

    pub fn set_control_matrix(&mut self, value: Matrix) -> anyhow::Result<&mut Self> {
        check_dim("set_control_matrix", self.state_dim(), value.rows())?;
        check_dim("set_control_matrix", self.control_dim(), value.cols())?;
        self.control = value;
        Ok(self)
    }

    pub fn set_state_post(&mut self, value: Vector) -> anyhow::Result<&mut Self> {
        check_dim("set_state_post", self.state_dim(), value.len())?;
        self.state_post = value;
        Ok(self)
    }

    pub fn state_pre(&self) -> &Vector {
        &self.state_pre
    }

    pub fn state_post(&self) -> &Vector {
        &self.state_post
    }

    pub fn error_cov_pre(&self) -> &Matrix {
        &self.error_cov_pre
    }

    pub fn error_cov_post(&self) -> &Matrix {
        &self.error_cov_post
    }

    pub fn gain(&self) -> &Matrix {
        &self.gain
    }

    /// Time update: `x' = A x + B u`, `P' = A P A^T + Q`. Returns the predicted state.
    pub fn predict(&mut self, control: Option<&Vector>) -> anyhow::Result<&Vector> {
        let mut state = self.transition.multiply(&self.state_post)?;
        if let Some(u) = control {
            let pushed = self.control.multiply(u)?;
            state = state.plus(&pushed)?;
        }
        let error_cov = self
            .transition
            .multiply(&self.error_cov_post)?
            .multiply(&self.transition.transpose())?
            .plus(&self.process_noise)?;

        self.state_pre = state;
        self.error_cov_pre = error_cov;
        // Without a measurement the prediction is also the posterior.
        self.state_post = self.state_pre.clone();
        self.error_cov_post = self.error_cov_pre.clone();
        Ok(&self.state_pre)
    }

    /// Measurement update with observation `z`. Returns the corrected state.
    ///
    /// The gain `K = P' H^T S^-1` with `S = H P' H^T + R` is obtained by solving
    /// `S K^T = H P'`, relying on the symmetry of `S` and `P'`.
    pub fn correct(&mut self, z: &Vector) -> anyhow::Result<&Vector> {
        check_dim("kalman correct", self.measurement_dim(), z.len())?;
        let h = &self.measurement;
        let hp = h.multiply(&self.error_cov_pre)?;
        let s = hp.multiply(&h.transpose())?.plus(&self.measurement_noise)?;
        let gain = solve_matrix(&s, &hp)?.transpose();

        let innovation = z.minus(&h.multiply(&self.state_pre)?)?;
        let state = self.state_pre.plus(&gain.multiply(&innovation)?)?;
        let error_cov = self.error_cov_pre.minus(&gain.multiply(&hp)?)?;

        self.gain = gain;
        self.state_post = state;
        self.error_cov_post = error_cov;
        Ok(&self.state_post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Persist;
    use approx::assert_abs_diff_eq;
    use std::io::BufReader;

    fn constant_tracker() -> KalmanFilter {
        let mut kf = KalmanFilter::new(1, 1, 0).unwrap();
        kf.set_measurement_matrix(Matrix::eye(1))
            .unwrap()
            .set_process_noise_cov(Matrix::zeros(1, 1))
            .unwrap()
            .set_error_cov_post(Matrix::eye(1).multiply(&1e6_f64).unwrap())
            .unwrap();
        kf
    }

    #[test]
    fn test_constant_signal_converges_to_mean() {
        let mut kf = constant_tracker();
        let readings = [4.0, 6.0, 5.0, 5.5, 4.5];
        for r in readings {
            kf.predict(None).unwrap();
            kf.correct(&Vector::from_vec(vec![r])).unwrap();
        }
        // With a vague prior the filter reproduces the sample mean.
        assert_abs_diff_eq!(kf.state_post()[0], 5.0, epsilon = 1e-4);
        assert!(kf.error_cov_post()[(0, 0)] < 0.25);
    }

    #[test]
    fn test_constant_velocity_with_control() {
        // State (position, velocity), measured position, control adds to velocity.
        let mut kf = KalmanFilter::new(2, 1, 1).unwrap();
        kf.set_transition_matrix(Matrix::from_rows(&[vec![1.0, 1.0], vec![0.0, 1.0]]).unwrap())
            .unwrap();
        kf.set_control_matrix(Matrix::from_rows(&[vec![0.0], vec![1.0]]).unwrap())
            .unwrap();
        kf.set_state_post(Vector::from_vec(vec![0.0, 1.0])).unwrap();

        let predicted = kf.predict(Some(&Vector::from_vec(vec![1.0]))).unwrap();
        assert_eq!(predicted.as_slice(), &[1.0, 2.0]);
        assert_eq!(kf.error_cov_pre(), &Matrix::eye(2));
        assert!(kf.predict(Some(&Vector::ones(2))).is_err());
    }

    #[test]
    fn test_correct_pulls_towards_measurement() {
        let mut kf = KalmanFilter::new(1, 1, 0).unwrap();
        kf.set_measurement_matrix(Matrix::eye(1)).unwrap();
        kf.predict(None).unwrap();
        // P' = 1, R = 1: gain is one half.
        let state = kf.correct(&Vector::from_vec(vec![2.0])).unwrap();
        assert_abs_diff_eq!(state[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kf.gain()[(0, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(kf.error_cov_post()[(0, 0)], 0.5, epsilon = 1e-12);
        assert!(kf.correct(&Vector::ones(2)).is_err());
    }

    #[test]
    fn test_setters_check_shapes() {
        let mut kf = KalmanFilter::new(2, 1, 0).unwrap();
        assert!(kf.set_transition_matrix(Matrix::eye(3)).is_err());
        assert!(kf.set_measurement_matrix(Matrix::zeros(2, 2)).is_err());
        assert!(kf.set_measurement_noise_cov(Matrix::eye(2)).is_err());
        assert!(KalmanFilter::new(0, 1, 0).is_err());
    }

    #[test]
    fn test_save_load() {
        let mut kf = constant_tracker();
        kf.predict(None).unwrap();
        kf.correct(&Vector::from_vec(vec![1.5])).unwrap();
        let mut buffer = Vec::new();
        kf.save(&mut buffer).unwrap();
        let loaded = KalmanFilter::load(BufReader::new(buffer.as_slice())).unwrap();
        assert_eq!(loaded, kf);
    }
}
