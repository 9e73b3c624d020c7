//! Fitted trajectories

use crate::hit::HitRef;
use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

/// Ordering of hits along the fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationDirection {
    #[default]
    InsideOut,
    OutsideIn,
    Undefined,
}

/// Fitted state on a surface
///
/// Parameters are `[phi, dphi/dR, theta, dtheta/dR]` at distance `radius`
/// from the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryState {
    pub radius: f64,
    pub parameters: Vector4<f64>,
    pub covariance: Matrix4<f64>,
}

impl TrajectoryState {
    pub fn phi(&self) -> f64 {
        self.parameters[0]
    }

    pub fn theta(&self) -> f64 {
        self.parameters[2]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryMeasurement {
    pub hit: HitRef,
    pub predicted: TrajectoryState,
    /// Equal to `predicted` for a missing hit
    pub updated: TrajectoryState,
    /// Chi-square contribution of the hit, 0 for a missing hit
    pub estimate: f64,
}

impl TrajectoryMeasurement {
    pub fn is_valid(&self) -> bool {
        self.hit.valid
    }
}

/// Compact fit summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub chi2: f64,
    pub ndof: i32,
    pub valid_hits: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    measurements: Vec<TrajectoryMeasurement>,
    direction: PropagationDirection,
    chi2: f64,
    ndof: i32,
}

impl Trajectory {
    /// Finalize a trajectory.
    ///
    /// chi2 is the sum of valid estimates; ndof is the number of measured
    /// dimensions minus `fitted_parameters` and may be non-positive.
    pub fn new(
        measurements: Vec<TrajectoryMeasurement>,
        direction: PropagationDirection,
        fitted_parameters: usize,
    ) -> Self {
        let chi2 = measurements
            .iter()
            .filter(|m| m.is_valid())
            .map(|m| m.estimate)
            .sum();
        let dims: usize = measurements.iter().map(|m| m.hit.fit_dimension()).sum();
        let ndof = dims as i32 - fitted_parameters as i32;

        Self {
            measurements,
            direction,
            chi2,
            ndof,
        }
    }

    pub fn measurements(&self) -> &[TrajectoryMeasurement] {
        &self.measurements
    }

    pub fn direction(&self) -> PropagationDirection {
        self.direction
    }

    pub fn chi2(&self) -> f64 {
        self.chi2
    }

    pub fn ndof(&self) -> i32 {
        self.ndof
    }

    pub fn hits(&self) -> Vec<HitRef> {
        self.measurements.iter().map(|m| m.hit.clone()).collect()
    }

    pub fn valid_hit_count(&self) -> usize {
        self.measurements.iter().filter(|m| m.is_valid()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn first_measurement(&self) -> Option<&TrajectoryMeasurement> {
        self.measurements.first()
    }

    pub fn last_measurement(&self) -> Option<&TrajectoryMeasurement> {
        self.measurements.last()
    }

    pub fn summary(&self) -> FitSummary {
        FitSummary {
            chi2: self.chi2,
            ndof: self.ndof,
            valid_hits: self.valid_hit_count(),
        }
    }

    /// Hits are ordered by distance from the origin along the direction.
    /// An undefined direction accepts either monotonic ordering.
    pub fn is_monotonic(&self) -> bool {
        let radii: Vec<f64> = self.measurements.iter().map(|m| m.hit.radius()).collect();
        let ascending = radii.windows(2).all(|w| w[1] >= w[0]);
        let descending = radii.windows(2).all(|w| w[1] <= w[0]);
        match self.direction {
            PropagationDirection::InsideOut => ascending,
            PropagationDirection::OutsideIn => descending,
            PropagationDirection::Undefined => ascending || descending,
        }
    }
}
