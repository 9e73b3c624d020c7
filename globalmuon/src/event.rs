//! Event-level processing of every standalone muon
//!
//! Without arbitration two standalone muons may end up combined with the
//! same tracker track. With `resolve_shared_tracks` the pairing is solved
//! as an assignment problem over (standalone, tracker) candidate scores.

use crate::builder::{EventContext, GlobalMuonTrajectoryBuilder, MuonCandidate, TrajectoryBuilder};
use crate::error::BuildError;
use crate::selector::ScoredCandidate;
use muontrack::{HitRef, HungarianSolver, Track, TrajectoryFitter};
use ndarray::Array2;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Combined muons of one event, one entry per standalone track
#[derive(Debug, Clone, Default)]
pub struct EventMuons {
    pub muons: Vec<Option<MuonCandidate>>,
}

impl EventMuons {
    pub fn found(&self) -> usize {
        self.muons.iter().filter(|m| m.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MuonCandidate> {
        self.muons.iter().flatten()
    }
}

pub struct EventProcessor<F: TrajectoryFitter> {
    builder: Arc<GlobalMuonTrajectoryBuilder<F>>,
}

impl<F: TrajectoryFitter> Clone for EventProcessor<F> {
    fn clone(&self) -> Self {
        Self {
            builder: Arc::clone(&self.builder),
        }
    }
}

impl<F: TrajectoryFitter> EventProcessor<F> {
    pub fn new(builder: Arc<GlobalMuonTrajectoryBuilder<F>>) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &GlobalMuonTrajectoryBuilder<F> {
        &self.builder
    }

    pub fn process(&self, standalone_tracks: &[Track], event: &EventContext<'_>) -> EventMuons {
        let muons = if self.builder.config().resolve_shared_tracks {
            self.process_resolved(standalone_tracks, event)
        } else {
            standalone_tracks
                .iter()
                .map(|sta| self.best_or_none(sta, event))
                .collect()
        };
        let result = EventMuons { muons };
        log::debug!(
            "Event: {} of {} standalone muons combined",
            result.found(),
            standalone_tracks.len()
        );
        result
    }

    /// Convenience entry point building the context from owned inputs
    pub fn process_tracks(
        &self,
        standalone_tracks: &[Track],
        tracker_tracks: &[Track],
        muon_measurements: &[HitRef],
    ) -> EventMuons {
        let event = EventContext::new(tracker_tracks).with_measurements(muon_measurements);
        self.process(standalone_tracks, &event)
    }

    fn best_or_none(&self, standalone: &Track, event: &EventContext<'_>) -> Option<MuonCandidate> {
        match self.builder.build_best(standalone, event) {
            Ok(muon) => Some(muon),
            Err(BuildError::NoCandidate) => None,
            Err(e) => {
                log::warn!("Standalone {}: {}", standalone.id, e);
                None
            }
        }
    }

    fn process_resolved(
        &self,
        standalone_tracks: &[Track],
        event: &EventContext<'_>,
    ) -> Vec<Option<MuonCandidate>> {
        let selector = self.builder.selector();
        let mut per_standalone: Vec<(Vec<ScoredCandidate>, BTreeSet<u32>)> =
            Vec::with_capacity(standalone_tracks.len());
        for sta in standalone_tracks {
            match self.builder.build_candidates(sta, event) {
                Ok(set) => {
                    let excluded = set.excluded_layers.clone();
                    let scored = set
                        .into_scored()
                        .into_iter()
                        .filter(|c| selector.is_acceptable(c))
                        .collect();
                    per_standalone.push((scored, excluded));
                }
                Err(e) => {
                    log::debug!("Standalone {}: {}", sta.id, e);
                    per_standalone.push((Vec::new(), BTreeSet::new()));
                }
            }
        }

        let num_tracks = event.tracker_tracks.len();
        let mut costs =
            Array2::<f32>::from_elem((standalone_tracks.len(), num_tracks), f32::INFINITY);
        for (row, (scored, _)) in per_standalone.iter().enumerate() {
            for c in scored {
                costs[[row, c.tracker_index]] = c.summary.score as f32;
            }
        }

        let assignment = HungarianSolver::solve(costs.view(), selector.prob_cut as f32);
        let columns = assignment.row_assignments(standalone_tracks.len());

        per_standalone
            .into_iter()
            .zip(standalone_tracks)
            .zip(columns)
            .map(|(((scored, excluded), sta), column)| {
                let column = column?;
                let best = scored.into_iter().find(|c| c.tracker_index == column)?;
                Some(self.builder.to_muon_candidate(sta, event, best, excluded))
            })
            .collect()
    }
}
