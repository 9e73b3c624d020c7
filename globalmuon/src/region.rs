//! Region of interest around a standalone muon
//!
//! The window is built from the standalone track parameters and their
//! uncertainties, widened at low pT where multiple scattering in the
//! calorimeters and the return yoke dominates.

use crate::config::RegionConfig;
use crate::error::{BuildError, Result};
use muontrack::track::{ETA, PHI, QOVERPT};
use muontrack::{delta_phi, Track};

/// Bounded (eta, phi, |q/pT|) window with an origin window along z
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub eta: f64,
    pub phi: f64,
    /// Center in |q/pT| (1/GeV)
    pub inv_pt: f64,
    pub half_eta: f64,
    pub half_phi: f64,
    pub half_inv_pt: f64,
    pub vertex_z: f64,
    pub half_length: f64,
    pub valid: bool,
}

impl RegionOfInterest {
    /// A region that contains nothing
    pub fn invalid() -> Self {
        Self {
            eta: 0.0,
            phi: 0.0,
            inv_pt: 0.0,
            half_eta: 0.0,
            half_phi: 0.0,
            half_inv_pt: 0.0,
            vertex_z: 0.0,
            half_length: 0.0,
            valid: false,
        }
    }

    /// Kinematic and origin compatibility of a tracker track
    pub fn contains(&self, track: &Track) -> bool {
        if !self.valid {
            return false;
        }
        let p = &track.parameters;
        (p.eta - self.eta).abs() <= self.half_eta
            && delta_phi(p.phi, self.phi).abs() <= self.half_phi
            && (p.q_over_pt().abs() - self.inv_pt).abs() <= self.half_inv_pt
            && (p.dz - self.vertex_z).abs() <= self.half_length
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionSelector {
    config: RegionConfig,
}

impl RegionSelector {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Region around a standalone track, or the reason none can be built
    pub fn try_define(&self, standalone: &Track) -> Result<RegionOfInterest> {
        let p = &standalone.parameters;
        if !(p.pt.is_finite() && p.pt > 0.0) {
            return Err(BuildError::invalid_region(format!(
                "non-positive transverse momentum {}",
                p.pt
            )));
        }
        if !(p.eta.is_finite() && p.phi.is_finite() && p.dz.is_finite()) {
            return Err(BuildError::invalid_region("non-finite direction"));
        }
        if !standalone.has_positive_definite_covariance() {
            return Err(BuildError::invalid_region(
                "covariance is not positive definite",
            ));
        }

        let c = &self.config;
        let widen = 1.0 + c.pt_widen_const / p.pt;
        let half_eta = (c.eta_window_scale * standalone.sigma(ETA) * widen)
            .clamp(c.min_eta_half_width, c.max_eta_half_width);
        let half_phi = (c.phi_window_scale * standalone.sigma(PHI) * widen)
            .clamp(c.min_phi_half_width, c.max_phi_half_width);
        let half_inv_pt = (c.inv_pt_window_scale * standalone.sigma(QOVERPT) * widen)
            .max(c.min_inv_pt_half_width);

        Ok(RegionOfInterest {
            eta: p.eta,
            phi: p.phi,
            inv_pt: 1.0 / p.pt,
            half_eta,
            half_phi,
            half_inv_pt,
            vertex_z: c.vertex_z,
            half_length: c.vertex_half_length,
            valid: true,
        })
    }

    /// Like [`RegionSelector::try_define`], with failures turned into an
    /// invalid region
    pub fn define(&self, standalone: &Track) -> RegionOfInterest {
        self.try_define(standalone).unwrap_or_else(|e| {
            log::debug!("Standalone track {}: {}", standalone.id, e);
            RegionOfInterest::invalid()
        })
    }
}
