//! Detector measurements

use crate::geometry::{DetId, GlobalPoint, Technology};
use std::fmt;
use std::sync::Arc;

/// Shared, immutable handle to a hit
pub type HitRef = Arc<Hit>;

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub det_id: DetId,
    pub position: GlobalPoint,
    /// Measurement uncertainties (cm): along r*phi, then along the second
    /// measured coordinate
    pub error: [f64; 2],
    /// Number of measured coordinates (1 = r*phi only, 2 = both)
    pub dimension: u8,
    pub valid: bool,
}

impl Hit {
    /// Two-dimensional valid measurement
    pub fn new(det_id: DetId, position: GlobalPoint, error: [f64; 2]) -> Self {
        Self {
            det_id,
            position,
            error,
            dimension: 2,
            valid: true,
        }
    }

    /// Missing-hit marker on the given detector
    pub fn missing(det_id: DetId, position: GlobalPoint) -> Self {
        Self {
            det_id,
            position,
            error: [0.0, 0.0],
            dimension: 0,
            valid: false,
        }
    }

    pub fn with_dimension(mut self, dimension: u8) -> Self {
        self.dimension = dimension.min(2);
        self
    }

    pub fn into_ref(self) -> HitRef {
        Arc::new(self)
    }

    pub fn technology(&self) -> Option<Technology> {
        self.det_id.technology()
    }

    pub fn is_muon(&self) -> bool {
        self.det_id.is_muon()
    }

    pub fn layer_key(&self) -> u32 {
        self.det_id.layer_key()
    }

    /// Distance from the origin, the ordering coordinate along a trajectory
    pub fn radius(&self) -> f64 {
        self.position.mag()
    }

    /// Dimensions contributing to the fit
    pub fn fit_dimension(&self) -> usize {
        if self.valid {
            self.dimension as usize
        } else {
            0
        }
    }
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} r={:.1} eta={:.3} phi={:.3}{}",
            self.det_id,
            self.radius(),
            self.position.eta(),
            self.position.phi(),
            if self.valid { "" } else { " (missing)" }
        )
    }
}

/// Count hits that take part in a fit
pub fn count_valid(hits: &[HitRef]) -> usize {
    hits.iter().filter(|h| h.valid).count()
}
