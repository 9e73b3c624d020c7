//! Trajectory refit service
//!
//! `KalmanTrajectoryFitter` uses a linearized track model propagated in
//! R, the distance from the origin. The state is
//! `[phi, dphi/dR, theta, dtheta/dR]`; hits measure `phi` and, when
//! two-dimensional, `theta`. Multiple scattering enters as process noise.

use crate::geometry::delta_phi;
use crate::hit::HitRef;
use crate::kalman::KalmanFilter;
use crate::track::{Track, ETA, PHI, QOVERPT};
use crate::trajectory::{PropagationDirection, Trajectory, TrajectoryMeasurement, TrajectoryState};
use anyhow::Result;
use nalgebra::{DMatrix, DVector, Matrix4, Vector4};
use serde::{Deserialize, Serialize};

/// Number of parameters of the track model
pub const FIT_PARAMETERS: usize = 4;

/// Curvature constant: dphi/drho = -q * K * B / pT with rho in cm, B in T
const CURVATURE_CONSTANT: f64 = 0.0015;

/// Highland multiple scattering constant (GeV)
const HIGHLAND_CONSTANT: f64 = 0.0136;

/// Refit service contract
///
/// Implementations must not keep state between calls: the same seed and
/// hits may be refit several times in one event, possibly concurrently.
pub trait TrajectoryFitter: Send + Sync {
    fn fit(
        &self,
        seed: &Track,
        hits: &[HitRef],
        direction: PropagationDirection,
    ) -> Result<Trajectory>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Solenoid field (T)
    pub field_tesla: f64,
    /// Factor applied to the seed covariance before the fit
    pub seed_error_rescale: f64,
    /// Radiation lengths traversed per cm of flight
    pub material_per_cm: f64,
    /// Minimum number of valid hits the fit accepts
    pub min_valid_hits: usize,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            field_tesla: 3.8,
            seed_error_rescale: 100.0,
            material_per_cm: 0.01,
            min_valid_hits: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KalmanTrajectoryFitter {
    pub config: FitterConfig,
}

impl KalmanTrajectoryFitter {
    pub fn new(config: FitterConfig) -> Self {
        Self { config }
    }

    /// Seed state at the reference point (R = 0)
    fn seed_state(&self, seed: &Track) -> (DVector<f64>, DMatrix<f64>) {
        let params = &seed.parameters;
        let theta = params.theta();
        let slope_scale = CURVATURE_CONSTANT * self.config.field_tesla * theta.sin();
        let phi_slope = -slope_scale * params.q_over_pt();

        let x = DVector::from_vec(vec![params.phi, phi_slope, theta, 0.0]);

        let sigma_theta = seed.sigma(ETA) * theta.sin();
        let sigma_slope = slope_scale * seed.sigma(QOVERPT);
        let floor = 1e-12;
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![
            seed.sigma(PHI).powi(2).max(floor),
            sigma_slope.powi(2).max(floor),
            sigma_theta.powi(2).max(floor),
            floor,
        ])) * self.config.seed_error_rescale.max(1.0);

        (x, p)
    }

    fn transition(step: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, step, 0.0, 0.0, // phi' = phi + dphi/dR * dR
                0.0, 1.0, 0.0, 0.0, // dphi/dR' = dphi/dR
                0.0, 0.0, 1.0, step, // theta' = theta + dtheta/dR * dR
                0.0, 0.0, 0.0, 1.0, // dtheta/dR' = dtheta/dR
            ],
        )
    }

    fn process_noise(&self, step: f64, radius: f64, momentum: f64) -> DMatrix<f64> {
        let length = step.abs();
        let mut q = DMatrix::zeros(4, 4);
        if length == 0.0 || momentum <= 0.0 {
            return q;
        }
        let theta0 = HIGHLAND_CONSTANT / momentum * (length * self.config.material_per_cm).sqrt();
        let slope_var = (theta0 / radius.max(1.0)).powi(2);
        for offset in [0, 2] {
            q[(offset, offset)] = slope_var * length * length / 3.0;
            q[(offset, offset + 1)] = slope_var * length / 2.0;
            q[(offset + 1, offset)] = slope_var * length / 2.0;
            q[(offset + 1, offset + 1)] = slope_var;
        }
        q
    }

    fn measurement_model(hit: &HitRef) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>) {
        let position = &hit.position;
        let sigma_phi = hit.error[0] / position.perp().max(1e-6);
        let sigma_theta = hit.error[1] / position.mag().max(1e-6);

        if hit.dimension >= 2 {
            (
                DVector::from_vec(vec![position.phi(), position.theta()]),
                DMatrix::from_row_slice(2, 4, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
                DMatrix::from_diagonal(&DVector::from_vec(vec![
                    sigma_phi * sigma_phi,
                    sigma_theta * sigma_theta,
                ])),
            )
        } else {
            (
                DVector::from_vec(vec![position.phi()]),
                DMatrix::from_row_slice(1, 4, &[1.0, 0.0, 0.0, 0.0]),
                DMatrix::from_element(1, 1, sigma_phi * sigma_phi),
            )
        }
    }

    fn snapshot(kf: &KalmanFilter, radius: f64) -> TrajectoryState {
        TrajectoryState {
            radius,
            parameters: Vector4::from_iterator(kf.get_state().iter().copied()),
            covariance: Matrix4::from_iterator(kf.get_covariance().iter().copied()),
        }
    }
}

/// Resolve an undefined direction from the hit ordering
pub fn resolve_direction(hits: &[HitRef], direction: PropagationDirection) -> PropagationDirection {
    match direction {
        PropagationDirection::Undefined => match (hits.first(), hits.last()) {
            (Some(first), Some(last)) if last.radius() < first.radius() => {
                PropagationDirection::OutsideIn
            }
            _ => PropagationDirection::InsideOut,
        },
        d => d,
    }
}

impl TrajectoryFitter for KalmanTrajectoryFitter {
    fn fit(
        &self,
        seed: &Track,
        hits: &[HitRef],
        direction: PropagationDirection,
    ) -> Result<Trajectory> {
        let valid = hits.iter().filter(|h| h.valid && h.dimension > 0).count();
        if valid < self.config.min_valid_hits {
            anyhow::bail!(
                "{} valid hits, at least {} needed",
                valid,
                self.config.min_valid_hits
            );
        }

        let resolved = resolve_direction(hits, direction);
        let momentum = seed.parameters.p();
        let (x0, p0) = self.seed_state(seed);
        let mut kf = KalmanFilter::new(x0, p0);

        let mut radius = 0.0;
        let mut measurements = Vec::with_capacity(hits.len());

        for (i, hit) in hits.iter().enumerate() {
            let target = hit.radius();
            let step = target - radius;
            let against_direction = match resolved {
                PropagationDirection::OutsideIn => step > 0.0,
                _ => step < 0.0,
            };
            // The first step leaves the reference point and may go either way
            if i > 0 && against_direction {
                anyhow::bail!(
                    "propagation from R={:.2} to R={:.2} runs against {:?}",
                    radius,
                    target,
                    resolved
                );
            }

            kf.predict(
                &Self::transition(step),
                &self.process_noise(step, target, momentum),
            );
            radius = target;
            let predicted = Self::snapshot(&kf, radius);

            if !hit.valid || hit.dimension == 0 {
                measurements.push(TrajectoryMeasurement {
                    hit: hit.clone(),
                    predicted,
                    updated: predicted,
                    estimate: 0.0,
                });
                continue;
            }

            let (mut z, h, r) = Self::measurement_model(hit);
            // Compare phi on the branch of the prediction
            z[0] = kf.x[0] + delta_phi(z[0], kf.x[0]);

            let estimate = kf
                .update(&z, &h, &r)
                .map_err(|e| anyhow::anyhow!("update at {} failed: {}", hit.det_id, e))?;

            measurements.push(TrajectoryMeasurement {
                hit: hit.clone(),
                predicted,
                updated: Self::snapshot(&kf, radius),
                estimate,
            });
        }

        log::trace!(
            "kalman fit of track {}: {} measurements",
            seed.id,
            measurements.len()
        );
        Ok(Trajectory::new(measurements, resolved, FIT_PARAMETERS))
    }
}
