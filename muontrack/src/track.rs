//! Reconstructed tracks as delivered by the tracking reconstruction

use crate::geometry::eta_to_theta;
use crate::hit::HitRef;
use nalgebra::{Matrix3, Matrix5, Vector3};
use serde::{Deserialize, Serialize};

/// Index of each parameter in the track covariance matrix
pub const QOVERPT: usize = 0;
pub const ETA: usize = 1;
pub const PHI: usize = 2;
pub const DXY: usize = 3;
pub const DZ: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Inner tracker hits only
    Tracker,
    /// Outer muon-system hits only
    Standalone,
}

/// Track parameters at the reference point (point of closest approach)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParameters {
    pub charge: i8,
    /// Transverse momentum (GeV)
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    /// Transverse impact parameter (cm)
    pub dxy: f64,
    /// Longitudinal impact parameter (cm)
    pub dz: f64,
}

impl TrackParameters {
    pub fn new(charge: i8, pt: f64, eta: f64, phi: f64) -> Self {
        Self {
            charge,
            pt,
            eta,
            phi,
            dxy: 0.0,
            dz: 0.0,
        }
    }

    /// Signed curvature q/pT, 0 for a non-positive pT
    pub fn q_over_pt(&self) -> f64 {
        if self.pt > 0.0 {
            self.charge as f64 / self.pt
        } else {
            0.0
        }
    }

    pub fn theta(&self) -> f64 {
        eta_to_theta(self.eta)
    }

    /// Total momentum (GeV)
    pub fn p(&self) -> f64 {
        self.pt * self.eta.cosh()
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub provenance: Provenance,
    pub parameters: TrackParameters,
    /// Covariance of (q/pT, eta, phi, dxy, dz)
    pub covariance: Matrix5<f64>,
    pub hits: Vec<HitRef>,
}

impl Track {
    pub fn new(
        id: u32,
        provenance: Provenance,
        parameters: TrackParameters,
        covariance: Matrix5<f64>,
        hits: Vec<HitRef>,
    ) -> Self {
        Self {
            id,
            provenance,
            parameters,
            covariance,
            hits,
        }
    }

    /// Uncertainty of one parameter (see the index constants)
    pub fn sigma(&self, index: usize) -> f64 {
        self.covariance[(index, index)].max(0.0).sqrt()
    }

    pub fn has_positive_definite_covariance(&self) -> bool {
        self.covariance.iter().all(|v| v.is_finite()) && self.covariance.cholesky().is_some()
    }

    /// (q/pT, eta, phi) sub-vector used for track-to-track comparison
    pub fn direction_vector(&self) -> Vector3<f64> {
        Vector3::new(
            self.parameters.q_over_pt(),
            self.parameters.eta,
            self.parameters.phi,
        )
    }

    /// Covariance block matching [`Track::direction_vector`]
    pub fn direction_covariance(&self) -> Matrix3<f64> {
        self.covariance.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn valid_hits(&self) -> impl Iterator<Item = &HitRef> {
        self.hits.iter().filter(|h| h.valid)
    }

    pub fn muon_hits(&self) -> impl Iterator<Item = &HitRef> {
        self.hits.iter().filter(|h| h.is_muon())
    }

    pub fn tracker_hits(&self) -> impl Iterator<Item = &HitRef> {
        self.hits.iter().filter(|h| !h.is_muon())
    }
}

/// Diagonal covariance from per-parameter uncertainties
pub fn diagonal_covariance(sigmas: [f64; 5]) -> Matrix5<f64> {
    Matrix5::from_diagonal(&nalgebra::Vector5::from_iterator(
        sigmas.iter().map(|s| s * s),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn track(cov: Matrix5<f64>) -> Track {
        Track::new(
            1,
            Provenance::Standalone,
            TrackParameters::new(-1, 20.0, 0.5, 1.0),
            cov,
            Vec::new(),
        )
    }

    #[test]
    fn test_parameters() {
        let p = TrackParameters::new(-1, 20.0, 0.0, 1.0);
        assert_abs_diff_eq!(p.q_over_pt(), -0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(p.theta(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(p.p(), 20.0, epsilon = 1e-12);
        assert_eq!(TrackParameters::new(1, 0.0, 0.0, 0.0).q_over_pt(), 0.0);
    }

    #[test]
    fn test_covariance_checks() {
        let t = track(diagonal_covariance([0.01, 0.002, 0.003, 0.1, 0.5]));
        assert!(t.has_positive_definite_covariance());
        assert_abs_diff_eq!(t.sigma(ETA), 0.002, epsilon = 1e-12);

        let mut singular = diagonal_covariance([0.01, 0.002, 0.003, 0.1, 0.5]);
        singular[(PHI, PHI)] = 0.0;
        assert!(!track(singular).has_positive_definite_covariance());
    }
}
