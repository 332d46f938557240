//! # Linear support vector models
//!
//! [`Svc`] and [`Svr`] share one PEGASOS trainer: stochastic sub-gradient descent on the
//! primal objective `lambda/2 |w|^2 + 1/n sum loss(y_i, w . x_i)` with `lambda = 1/(c n)`,
//! step size `1/(lambda t)` and projection onto the ball of radius `1/sqrt(lambda)`.
//! Neither model has a bias term.

mod svc;
mod svr;

pub use svc::{Svc, SvcParams};
pub use svr::{Svr, SvrParams};

use std::time::Instant;

use anyhow::bail;
use log::{debug, trace, warn};
use rand::Rng;

use crate::dataset::FeatureMatrix;
use crate::dense::Vector;
use crate::error::{check_dim, LinalgError};
use crate::utils::seeded_rng;

/// Loss whose sub-gradient drives the weight update.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Loss {
    /// Hinge loss, positive examples weighted by `j`.
    Hinge { j: f64 },
    /// Epsilon-insensitive absolute loss.
    EpsilonInsensitive { eps: f64 },
}

impl Loss {
    /// Coefficient of `x` in the negative sub-gradient of the loss, zero when the example
    /// is not a violator.
    fn coefficient(&self, target: f64, score: f64) -> f64 {
        match *self {
            Loss::Hinge { j } => {
                if target * score < 1.0 {
                    if target > 0.0 {
                        j * target
                    } else {
                        target
                    }
                } else {
                    0.0
                }
            }
            Loss::EpsilonInsensitive { eps } => {
                let residual = target - score;
                if residual.abs() > eps {
                    residual.signum()
                } else {
                    0.0
                }
            }
        }
    }
}

/// Budget and step settings common to both models.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Schedule {
    pub c: f64,
    pub batch_size: usize,
    pub max_iterations: usize,
    pub max_time: f64,
    pub min_diff: f64,
    pub seed: u64,
}

impl Schedule {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if !(self.c > 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "c must be positive, got {}",
                self.c
            )));
        }
        if self.batch_size == 0 {
            bail!(LinalgError::InvalidConfiguration(
                "batch_size must be positive".to_string()
            ));
        }
        if self.max_iterations == 0 {
            bail!(LinalgError::InvalidConfiguration(
                "max_iterations must be positive".to_string()
            ));
        }
        if !(self.max_time > 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "max_time must be positive, got {}",
                self.max_time
            )));
        }
        if !(self.min_diff >= 0.0) {
            bail!(LinalgError::InvalidConfiguration(format!(
                "min_diff must be non-negative, got {}",
                self.min_diff
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Trained {
    pub weights: Vector,
    pub iterations: usize,
}

/// Runs PEGASOS until `max_iterations`, `max_time` or `min_diff` stops it, whichever
/// comes first. Validation happens before any work, so a failing call has no effect.
pub(crate) fn pegasos(
    x: FeatureMatrix<'_>,
    y: &Vector,
    loss: Loss,
    schedule: &Schedule,
) -> anyhow::Result<Trained> {
    schedule.validate()?;
    let n = x.n_examples();
    check_dim("fit targets", n, y.len())?;
    if n == 0 {
        bail!(LinalgError::InvalidArgument(
            "cannot fit on an empty training set".to_string()
        ));
    }
    if y.iter().any(|v| !v.is_finite()) {
        bail!(LinalgError::InvalidArgument(
            "targets must be finite".to_string()
        ));
    }

    let dim = x.dim();
    let lambda = 1.0 / (schedule.c * n as f64);
    let radius = 1.0 / lambda.sqrt();
    let full_batch = schedule.batch_size >= n;
    let batch_len = schedule.batch_size.min(n);
    let mut rng = seeded_rng(schedule.seed);
    let start = Instant::now();

    let mut w = vec![0.0; dim];
    let mut next = vec![0.0; dim];
    let mut iterations = 0;

    for t in 1..=schedule.max_iterations {
        if start.elapsed().as_secs_f64() > schedule.max_time {
            warn!(
                "pegasos: time budget of {}s exhausted after {} iterations",
                schedule.max_time, iterations
            );
            break;
        }
        let eta = 1.0 / (lambda * t as f64);

        next.iter_mut().for_each(|v| *v = 0.0);
        for b in 0..batch_len {
            let i = if full_batch {
                b
            } else {
                rng.random_range(0..n)
            };
            let xi = x.column_unchecked(i);
            let coef = loss.coefficient(y[i], xi.dot(&w));
            if coef != 0.0 {
                xi.add_scaled_to(&mut next, coef);
            }
        }

        let decay = 1.0 - eta * lambda;
        let step = eta / batch_len as f64;
        for (n_k, w_k) in next.iter_mut().zip(&w) {
            *n_k = decay * w_k + step * *n_k;
        }
        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > radius {
            let scale = radius / norm;
            next.iter_mut().for_each(|v| *v *= scale);
        }

        let diff = next
            .iter()
            .zip(&w)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        std::mem::swap(&mut w, &mut next);
        iterations = t;
        trace!("pegasos: iteration {t}, weight change {diff}");
        if diff < schedule.min_diff {
            debug!("pegasos: converged after {t} iterations (change {diff})");
            break;
        }
    }
    if iterations == schedule.max_iterations {
        debug!("pegasos: reached max_iterations ({iterations})");
    }

    Ok(Trained {
        weights: Vector::from_vec(w),
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_coefficients() {
        let hinge = Loss::Hinge { j: 2.0 };
        assert_eq!(hinge.coefficient(1.0, 0.5), 2.0);
        assert_eq!(hinge.coefficient(-1.0, 0.5), -1.0);
        assert_eq!(hinge.coefficient(1.0, 1.5), 0.0);

        let eps = Loss::EpsilonInsensitive { eps: 0.1 };
        assert_eq!(eps.coefficient(1.0, 0.5), 1.0);
        assert_eq!(eps.coefficient(0.0, 0.5), -1.0);
        assert_eq!(eps.coefficient(0.55, 0.5), 0.0);
    }

    #[test]
    fn test_schedule_validation() {
        let ok = Schedule {
            c: 1.0,
            batch_size: 10,
            max_iterations: 10,
            max_time: 1.0,
            min_diff: 0.0,
            seed: 0,
        };
        assert!(ok.validate().is_ok());
        assert!(Schedule { c: 0.0, ..ok }.validate().is_err());
        assert!(Schedule { batch_size: 0, ..ok }.validate().is_err());
        assert!(Schedule { max_time: f64::NAN, ..ok }.validate().is_err());
    }
}
