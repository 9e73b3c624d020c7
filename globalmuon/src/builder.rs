//! Global muon trajectory builder
//!
//! For one standalone muon the builder walks:
//!
//! ```text
//! Start -> RegionDefined -> CandidatesFiltered
//!       -> per candidate: Refit1 -> HitsFiltered -> Refit2 -> Scored
//!       -> BestSelected | NoCandidate
//! ```
//!
//! A failure inside the per-candidate chain only drops that candidate.
//! Candidates are independent and are evaluated on the rayon pool when
//! `BuilderConfig::parallel` is set; results are always gathered in
//! candidate order so the selection does not depend on scheduling.

use crate::candidates::{CandidateFilter, TrackCand};
use crate::config::{BuilderConfig, MuonHitsOption};
use crate::error::{BuildError, Result};
use crate::hit_filter::HitQualityFilter;
use crate::occupancy::ChamberOccupancy;
use crate::refit::TrajectoryRefitter;
use crate::region::RegionSelector;
use crate::scorer::{TrajectoryScorer, TrajectorySummary};
use crate::selector::{ScoredCandidate, TrajectorySelector};
use muontrack::{HitRef, KalmanTrajectoryFitter, Track, Trajectory, TrajectoryFitter};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Per-event inputs shared by every standalone track of the event
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub tracker_tracks: &'a [Track],
    /// Muon-layer measurements used for chamber occupancy
    pub muon_measurements: &'a [HitRef],
    /// Candidates not started by this instant are abandoned
    pub deadline: Option<Instant>,
}

impl<'a> EventContext<'a> {
    pub fn new(tracker_tracks: &'a [Track]) -> Self {
        Self {
            tracker_tracks,
            muon_measurements: &[],
            deadline: None,
        }
    }

    pub fn with_measurements(mut self, muon_measurements: &'a [HitRef]) -> Self {
        self.muon_measurements = muon_measurements;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Start,
    RegionDefined,
    CandidatesFiltered,
    Refit1,
    HitsFiltered,
    Refit2,
    Scored,
    BestSelected,
    NoCandidate,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Start => "start",
            BuildStage::RegionDefined => "region defined",
            BuildStage::CandidatesFiltered => "candidates filtered",
            BuildStage::Refit1 => "first refit",
            BuildStage::HitsFiltered => "hits filtered",
            BuildStage::Refit2 => "second refit",
            BuildStage::Scored => "scored",
            BuildStage::BestSelected => "best selected",
            BuildStage::NoCandidate => "no candidate",
        };
        f.write_str(name)
    }
}

/// Combined muon built from one standalone and one tracker track
#[derive(Debug, Clone)]
pub struct MuonCandidate {
    pub standalone_id: u32,
    /// Position of the tracker track in the event collection
    pub tracker_index: usize,
    pub tracker_id: u32,
    pub trajectory: Trajectory,
    pub summary: TrajectorySummary,
    /// Muon layers dropped for high occupancy
    pub excluded_layers: BTreeSet<u32>,
}

/// Outcome of one candidate, kept for diagnostics
#[derive(Debug)]
pub struct CandidateReport {
    pub tracker_index: usize,
    pub result: Result<ScoredCandidate>,
}

/// Every evaluated candidate of one standalone track
#[derive(Debug)]
pub struct CandidateSet {
    pub standalone_id: u32,
    pub reports: Vec<CandidateReport>,
    pub excluded_layers: BTreeSet<u32>,
}

impl CandidateSet {
    pub fn scored(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.reports.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn into_scored(self) -> Vec<ScoredCandidate> {
        self.reports
            .into_iter()
            .filter_map(|r| r.result.ok())
            .collect()
    }
}

pub trait TrajectoryBuilder: Send + Sync {
    /// Best combined trajectory for `standalone`, or `NoCandidate`
    fn build_best(&self, standalone: &Track, event: &EventContext<'_>) -> Result<MuonCandidate>;
}

pub struct GlobalMuonTrajectoryBuilder<F: TrajectoryFitter> {
    config: BuilderConfig,
    region_selector: RegionSelector,
    candidate_filter: CandidateFilter,
    hit_filter: HitQualityFilter,
    refitter: TrajectoryRefitter<F>,
    scorer: TrajectoryScorer,
    selector: TrajectorySelector,
}

impl GlobalMuonTrajectoryBuilder<KalmanTrajectoryFitter> {
    /// Builder using the Kalman reference fitter configured by `config.fitter`
    pub fn from_config(config: BuilderConfig) -> Result<Self> {
        let fitter = KalmanTrajectoryFitter::new(config.fitter.clone());
        Self::new(config, fitter)
    }
}

impl<F: TrajectoryFitter> GlobalMuonTrajectoryBuilder<F> {
    pub fn new(config: BuilderConfig, fitter: F) -> Result<Self> {
        Self::with_shared_fitter(config, Arc::new(fitter))
    }

    pub fn with_shared_fitter(config: BuilderConfig, fitter: Arc<F>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            region_selector: RegionSelector::new(config.region.clone()),
            candidate_filter: CandidateFilter::from_config(&config),
            hit_filter: HitQualityFilter::new(config.hit_quality.clone()),
            refitter: TrajectoryRefitter::new(fitter, config.direction, config.min_hits_to_refit),
            scorer: TrajectoryScorer,
            selector: TrajectorySelector::new(config.prob_cut, config.hit_threshold),
            config,
        })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn selector(&self) -> &TrajectorySelector {
        &self.selector
    }

    /// Standalone muon hits added to the tracker hits for the first refit
    pub fn muon_hits_for_refit(&self, standalone: &Track) -> Vec<HitRef> {
        let valid_muon = || standalone.muon_hits().filter(|h| h.valid);
        match self.config.muon_hits_option {
            MuonHitsOption::TrackerOnly => Vec::new(),
            MuonHitsOption::AllStations => valid_muon().cloned().collect(),
            MuonHitsOption::FirstStation => match valid_muon().map(|h| h.det_id.station()).min() {
                Some(first) => valid_muon()
                    .filter(|h| h.det_id.station() == first)
                    .cloned()
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    /// Refit, filter, refit and score one tracker track
    fn evaluate(
        &self,
        standalone: &Track,
        cand: &TrackCand<'_>,
        muon_hits: &[HitRef],
        occupancy: &ChamberOccupancy,
        event: &EventContext<'_>,
    ) -> Result<ScoredCandidate> {
        if event.is_expired() {
            return Err(BuildError::DeadlineExceeded);
        }
        let tracker = cand.track;

        let mut hits: Vec<HitRef> = tracker.hits.clone();
        hits.extend(muon_hits.iter().cloned());
        let first = self.refitter.refit(tracker, &hits)?;
        log::debug!(
            "Standalone {} / tracker {}: {} (chi2 {:.2}, ndof {})",
            standalone.id,
            tracker.id,
            BuildStage::Refit1,
            first.chi2(),
            first.ndof()
        );

        let selection = self.hit_filter.filter(&first, occupancy)?;
        log::debug!(
            "Standalone {} / tracker {}: {} ({} accepted, {} rejected)",
            standalone.id,
            tracker.id,
            BuildStage::HitsFiltered,
            selection.accepted.len(),
            selection.rejected.len()
        );

        let trajectory = self.refitter.refit(tracker, &selection.accepted)?;
        let summary = self.scorer.score(&trajectory);
        log::debug!(
            "Standalone {} / tracker {}: {} (chi2 {:.2}, ndof {}, score {:.3})",
            standalone.id,
            tracker.id,
            BuildStage::Scored,
            summary.chi2,
            summary.ndof,
            summary.score
        );

        Ok(ScoredCandidate {
            tracker_index: cand.tracker_index,
            trajectory,
            summary,
        })
    }

    /// Evaluate every compatible tracker track
    ///
    /// Fails only when no region can be built around `standalone`;
    /// per-candidate failures are reported in the returned set.
    pub fn build_candidates(
        &self,
        standalone: &Track,
        event: &EventContext<'_>,
    ) -> Result<CandidateSet> {
        log::debug!("Standalone {}: {}", standalone.id, BuildStage::Start);
        let region = self.region_selector.try_define(standalone)?;
        log::debug!(
            "Standalone {}: {} (eta {:.3} +- {:.3}, phi {:.3} +- {:.3})",
            standalone.id,
            BuildStage::RegionDefined,
            region.eta,
            region.half_eta,
            region.phi,
            region.half_phi
        );

        let cands = self
            .candidate_filter
            .select(&region, standalone, event.tracker_tracks);
        log::debug!(
            "Standalone {}: {} ({} of {} tracker tracks)",
            standalone.id,
            BuildStage::CandidatesFiltered,
            cands.len(),
            event.tracker_tracks.len()
        );

        let occupancy = ChamberOccupancy::compute(
            standalone,
            event.muon_measurements,
            self.config.hit_quality.occupancy_window,
        );
        let excluded_layers = self.hit_filter.excluded_layers(&occupancy);
        let muon_hits = self.muon_hits_for_refit(standalone);

        let evaluate = |cand: &TrackCand<'_>| CandidateReport {
            tracker_index: cand.tracker_index,
            result: self.evaluate(standalone, cand, &muon_hits, &occupancy, event),
        };
        let reports: Vec<CandidateReport> = if self.config.parallel && cands.len() > 1 {
            cands.par_iter().map(evaluate).collect()
        } else {
            cands.iter().map(evaluate).collect()
        };

        for report in &reports {
            if let Err(e) = &report.result {
                match e {
                    BuildError::RefitFailure(_) => log::warn!(
                        "Standalone {} / tracker index {}: {}",
                        standalone.id,
                        report.tracker_index,
                        e
                    ),
                    _ => log::debug!(
                        "Standalone {} / tracker index {}: dropped, {}",
                        standalone.id,
                        report.tracker_index,
                        e
                    ),
                }
            }
        }

        Ok(CandidateSet {
            standalone_id: standalone.id,
            reports,
            excluded_layers,
        })
    }

    pub(crate) fn to_muon_candidate(
        &self,
        standalone: &Track,
        event: &EventContext<'_>,
        best: ScoredCandidate,
        excluded_layers: BTreeSet<u32>,
    ) -> MuonCandidate {
        let tracker_id = event
            .tracker_tracks
            .get(best.tracker_index)
            .map(|t| t.id)
            .unwrap_or_default();

        if log::log_enabled!(log::Level::Trace) {
            for m in best.trajectory.measurements() {
                log::trace!("  {} chi2 {:.3}", m.hit, m.estimate);
            }
        }

        MuonCandidate {
            standalone_id: standalone.id,
            tracker_index: best.tracker_index,
            tracker_id,
            trajectory: best.trajectory,
            summary: best.summary,
            excluded_layers,
        }
    }
}

impl<F: TrajectoryFitter> TrajectoryBuilder for GlobalMuonTrajectoryBuilder<F> {
    fn build_best(&self, standalone: &Track, event: &EventContext<'_>) -> Result<MuonCandidate> {
        let set = match self.build_candidates(standalone, event) {
            Ok(set) => set,
            Err(BuildError::InvalidRegion(reason)) => {
                log::debug!(
                    "Standalone {}: {} ({})",
                    standalone.id,
                    BuildStage::NoCandidate,
                    reason
                );
                return Err(BuildError::NoCandidate);
            }
            Err(e) => return Err(e),
        };

        let excluded_layers = set.excluded_layers.clone();
        match self.selector.select(set.into_scored()) {
            Ok(best) => {
                log::debug!(
                    "Standalone {}: {} (tracker index {}, score {:.3})",
                    standalone.id,
                    BuildStage::BestSelected,
                    best.tracker_index,
                    best.summary.score
                );
                Ok(self.to_muon_candidate(standalone, event, best, excluded_layers))
            }
            Err(e) => {
                log::debug!("Standalone {}: {}", standalone.id, BuildStage::NoCandidate);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muontrack::track::diagonal_covariance;
    use muontrack::{
        DetId, GlobalPoint, Hit, PropagationDirection, Provenance, Technology, TrackParameters,
        TrajectoryMeasurement, TrajectoryState,
    };
    use nalgebra::{Matrix4, Vector4};
    use std::time::Duration;

    /// Every hit of track `id` contributes `chi2_per_hit[id]`
    struct FixedChi2Fitter {
        chi2_per_hit: Vec<f64>,
    }

    impl TrajectoryFitter for FixedChi2Fitter {
        fn fit(
            &self,
            seed: &Track,
            hits: &[HitRef],
            direction: PropagationDirection,
        ) -> anyhow::Result<Trajectory> {
            let estimate = self.chi2_per_hit[seed.id as usize];
            let state = TrajectoryState {
                radius: 0.0,
                parameters: Vector4::zeros(),
                covariance: Matrix4::identity(),
            };
            let measurements = hits
                .iter()
                .map(|h| TrajectoryMeasurement {
                    hit: h.clone(),
                    predicted: state,
                    updated: state,
                    estimate,
                })
                .collect();
            Ok(Trajectory::new(measurements, direction, 4))
        }
    }

    fn hit(det_id: DetId, radius: f64) -> HitRef {
        Hit::new(
            det_id,
            GlobalPoint::from_polar(radius, 0.5, 1.0),
            [0.01, 0.01],
        )
        .into_ref()
    }

    fn tracker_track(id: u32, pt: f64, eta: f64, phi: f64) -> Track {
        let hits = (1..=3)
            .map(|layer| hit(DetId::tracker(layer, id as u16), 10.0 * layer as f64))
            .collect();
        Track::new(
            id,
            Provenance::Tracker,
            TrackParameters::new(1, pt, eta, phi),
            diagonal_covariance([1e-3; 5]),
            hits,
        )
    }

    fn standalone() -> Track {
        let hits = vec![
            hit(DetId::muon(Technology::DriftTube, 1, 1, 0), 450.0),
            hit(DetId::muon(Technology::DriftTube, 1, 2, 0), 460.0),
            hit(DetId::muon(Technology::DriftTube, 2, 1, 0), 520.0),
        ];
        Track::new(
            100,
            Provenance::Standalone,
            TrackParameters::new(1, 20.0, 0.5, 1.0),
            diagonal_covariance([1e-3; 5]),
            hits,
        )
    }

    fn event_tracks() -> Vec<Track> {
        vec![
            tracker_track(0, 3.0, 1.0, 1.3),
            tracker_track(1, 19.0, 0.52, 1.05),
            tracker_track(2, 20.0, -1.5, -2.0),
            tracker_track(3, 21.0, 0.48, 0.95),
            tracker_track(4, 10.0, 0.5, 2.5),
        ]
    }

    fn builder(config: BuilderConfig) -> GlobalMuonTrajectoryBuilder<FixedChi2Fitter> {
        GlobalMuonTrajectoryBuilder::new(
            config,
            FixedChi2Fitter {
                chi2_per_hit: vec![0.5, 2.0, 0.5, 1.0, 0.5],
            },
        )
        .unwrap()
    }

    #[test]
    fn test_best_candidate_selected() {
        let tracks = event_tracks();
        let event = EventContext::new(&tracks);
        for parallel in [true, false] {
            let config = BuilderConfig {
                parallel,
                ..BuilderConfig::default()
            };
            let best = builder(config).build_best(&standalone(), &event).unwrap();
            assert_eq!(best.tracker_index, 3);
            assert_eq!(best.tracker_id, 3);
            assert_eq!(best.standalone_id, 100);
            // 3 tracker + 3 muon two-dimensional hits
            assert_eq!(best.summary.ndof, 8);
            assert_eq!(best.summary.chi2, 6.0);
            assert_eq!(best.trajectory.valid_hit_count(), 6);
        }
    }

    #[test]
    fn test_candidate_set_reports_each_candidate() {
        let tracks = event_tracks();
        let set = builder(BuilderConfig::default())
            .build_candidates(&standalone(), &EventContext::new(&tracks))
            .unwrap();
        let indices: Vec<usize> = set.reports.iter().map(|r| r.tracker_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(set.scored().count(), 2);
    }

    #[test]
    fn test_muon_hits_option() {
        let sta = standalone();
        let count = |option| {
            builder(BuilderConfig {
                muon_hits_option: option,
                ..BuilderConfig::default()
            })
            .muon_hits_for_refit(&sta)
            .len()
        };
        assert_eq!(count(MuonHitsOption::TrackerOnly), 0);
        assert_eq!(count(MuonHitsOption::FirstStation), 2);
        assert_eq!(count(MuonHitsOption::AllStations), 3);

        let tracks = event_tracks();
        let best = builder(BuilderConfig {
            muon_hits_option: MuonHitsOption::TrackerOnly,
            ..BuilderConfig::default()
        })
        .build_best(&sta, &EventContext::new(&tracks))
        .unwrap();
        assert_eq!(best.summary.ndof, 2);
    }

    #[test]
    fn test_invalid_region_gives_no_candidate() {
        let tracks = event_tracks();
        let event = EventContext::new(&tracks);
        let mut sta = standalone();
        sta.parameters.pt = 0.0;
        let b = builder(BuilderConfig::default());
        assert!(matches!(
            b.build_candidates(&sta, &event),
            Err(BuildError::InvalidRegion(_))
        ));
        assert!(matches!(
            b.build_best(&sta, &event),
            Err(BuildError::NoCandidate)
        ));
    }

    #[test]
    fn test_expired_deadline() {
        let tracks = event_tracks();
        let past = Instant::now()
            .checked_sub(Duration::from_millis(10))
            .unwrap_or_else(Instant::now);
        let event = EventContext::new(&tracks).with_deadline(past);
        let b = builder(BuilderConfig::default());
        let set = b.build_candidates(&standalone(), &event).unwrap();
        assert!(set
            .reports
            .iter()
            .all(|r| matches!(r.result, Err(BuildError::DeadlineExceeded))));
        assert!(matches!(
            b.build_best(&standalone(), &event),
            Err(BuildError::NoCandidate)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BuilderConfig {
            grid_cell_size: -1.0,
            ..BuilderConfig::default()
        };
        assert!(GlobalMuonTrajectoryBuilder::from_config(config).is_err());
    }
}
