//! Hit quality selection between the two refits

use crate::config::HitQualityConfig;
use crate::error::{BuildError, Result};
use crate::occupancy::ChamberOccupancy;
use muontrack::{HitRef, Trajectory, TrajectoryMeasurement};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Missing-hit marker
    Invalid,
    /// Layer above the occupancy threshold
    HighOccupancy,
    /// Estimate above the technology chi-square cut
    Chi2,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Invalid => write!(f, "invalid"),
            RejectReason::HighOccupancy => write!(f, "high occupancy"),
            RejectReason::Chi2 => write!(f, "chi2"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HitSelection {
    /// Accepted hits, in trajectory order
    pub accepted: Vec<HitRef>,
    /// Layer keys whose hits were all dropped for occupancy
    pub excluded_layers: BTreeSet<u32>,
    pub rejected: Vec<(HitRef, RejectReason)>,
}

impl HitSelection {
    pub fn rejected_count(&self, reason: RejectReason) -> usize {
        self.rejected.iter().filter(|(_, r)| *r == reason).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HitQualityFilter {
    config: HitQualityConfig,
}

impl HitQualityFilter {
    pub fn new(config: HitQualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HitQualityConfig {
        &self.config
    }

    /// Layers to drop entirely, decided from the occupancy table alone
    pub fn excluded_layers(&self, occupancy: &ChamberOccupancy) -> BTreeSet<u32> {
        occupancy
            .layers()
            .filter(|&(_, technology, count)| {
                count > self.config.occupancy_threshold
                    && technology
                        .map(|t| self.config.cut(t).reject_high_occupancy)
                        .unwrap_or(false)
            })
            .map(|(layer, _, _)| layer)
            .collect()
    }

    pub fn filter(
        &self,
        trajectory: &Trajectory,
        occupancy: &ChamberOccupancy,
    ) -> Result<HitSelection> {
        self.filter_measurements(trajectory.measurements(), occupancy)
    }

    /// Split measurements into accepted and rejected hits
    ///
    /// Fails with `InsufficientHits` when nothing survives.
    pub fn filter_measurements(
        &self,
        measurements: &[TrajectoryMeasurement],
        occupancy: &ChamberOccupancy,
    ) -> Result<HitSelection> {
        let excluded_layers = self.excluded_layers(occupancy);
        let mut accepted = Vec::with_capacity(measurements.len());
        let mut rejected = Vec::new();

        for m in measurements {
            let hit = &m.hit;
            let cut = hit
                .technology()
                .map(|t| self.config.cut(t))
                .unwrap_or_default();
            let reason = if !m.is_valid() {
                Some(RejectReason::Invalid)
            } else if excluded_layers.contains(&hit.layer_key()) {
                Some(RejectReason::HighOccupancy)
            } else if cut.chi2_cut.map(|c| m.estimate > c).unwrap_or(false) {
                Some(RejectReason::Chi2)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    log::trace!("Rejected hit {} ({}, chi2 {:.2})", hit, reason, m.estimate);
                    rejected.push((hit.clone(), reason));
                }
                None => accepted.push(hit.clone()),
            }
        }

        if accepted.is_empty() {
            return Err(BuildError::insufficient_hits(0, 1));
        }

        Ok(HitSelection {
            accepted,
            excluded_layers,
            rejected,
        })
    }
}
