//! Best-trajectory selection among scored candidates

use crate::error::{BuildError, Result};
use crate::scorer::TrajectorySummary;
use muontrack::Trajectory;

/// A refit candidate with its score
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub tracker_index: usize,
    pub trajectory: Trajectory,
    pub summary: TrajectorySummary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySelector {
    /// Maximum accepted score (-ln P)
    pub prob_cut: f64,
    pub hit_threshold: usize,
}

impl Default for TrajectorySelector {
    fn default() -> Self {
        Self {
            prob_cut: 30.0,
            hit_threshold: 0,
        }
    }
}

impl TrajectorySelector {
    pub fn new(prob_cut: f64, hit_threshold: usize) -> Self {
        Self {
            prob_cut,
            hit_threshold,
        }
    }

    pub fn is_acceptable(&self, candidate: &ScoredCandidate) -> bool {
        let score = candidate.summary.score;
        score.is_finite()
            && score <= self.prob_cut
            && candidate.trajectory.valid_hit_count() >= self.hit_threshold
    }

    /// Candidate with the lowest score; the lowest tracker index wins ties
    pub fn select(&self, mut candidates: Vec<ScoredCandidate>) -> Result<ScoredCandidate> {
        candidates.sort_by_key(|c| c.tracker_index);

        let mut best: Option<ScoredCandidate> = None;
        for candidate in candidates {
            if !self.is_acceptable(&candidate) {
                log::debug!(
                    "Candidate {} rejected by selection (score {:.3}, {} hits)",
                    candidate.tracker_index,
                    candidate.summary.score,
                    candidate.trajectory.valid_hit_count()
                );
                continue;
            }
            let better = best
                .as_ref()
                .map(|b| candidate.summary.score < b.summary.score)
                .unwrap_or(true);
            if better {
                best = Some(candidate);
            }
        }
        best.ok_or(BuildError::NoCandidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::TrajectoryScorer;
    use muontrack::{
        DetId, GlobalPoint, Hit, PropagationDirection, TrajectoryMeasurement, TrajectoryState,
    };
    use nalgebra::{Matrix4, Vector4};

    fn candidate(tracker_index: usize, hits: usize, chi2_per_hit: f64) -> ScoredCandidate {
        let state = TrajectoryState {
            radius: 0.0,
            parameters: Vector4::zeros(),
            covariance: Matrix4::identity(),
        };
        let measurements = (0..hits)
            .map(|i| TrajectoryMeasurement {
                hit: Hit::new(
                    DetId::tracker(i as u8, 0),
                    GlobalPoint::new(10.0 * (i + 1) as f64, 0.0, 0.0),
                    [0.01, 0.01],
                )
                .into_ref(),
                predicted: state,
                updated: state,
                estimate: chi2_per_hit,
            })
            .collect();
        let trajectory = Trajectory::new(measurements, PropagationDirection::InsideOut, 4);
        let summary = TrajectoryScorer.score(&trajectory);
        ScoredCandidate {
            tracker_index,
            trajectory,
            summary,
        }
    }

    #[test]
    fn test_lowest_score_wins() {
        let selector = TrajectorySelector::default();
        let best = selector
            .select(vec![candidate(3, 6, 2.0), candidate(1, 6, 1.0)])
            .unwrap();
        assert_eq!(best.tracker_index, 1);
        assert_eq!(best.summary.chi2, 6.0);
    }

    #[test]
    fn test_ties_resolved_by_candidate_order() {
        let selector = TrajectorySelector::default();
        let best = selector
            .select(vec![
                candidate(5, 6, 1.0),
                candidate(2, 6, 1.0),
                candidate(9, 6, 1.0),
            ])
            .unwrap();
        assert_eq!(best.tracker_index, 2);
    }

    #[test]
    fn test_cuts() {
        // Two hits give ndof 0 and an infinite score
        let selector = TrajectorySelector::default();
        assert!(matches!(
            selector.select(vec![candidate(0, 2, 0.1)]),
            Err(BuildError::NoCandidate)
        ));
        assert!(matches!(selector.select(Vec::new()), Err(BuildError::NoCandidate)));

        // chi2 600 over ndof 8 scores far above 30
        let bad = candidate(0, 6, 100.0);
        assert!(bad.summary.score > 30.0);
        assert!(!selector.is_acceptable(&bad));

        let strict = TrajectorySelector::new(30.0, 7);
        assert!(strict.select(vec![candidate(0, 6, 1.0)]).is_err());
        assert_eq!(
            strict
                .select(vec![candidate(0, 6, 1.0), candidate(1, 8, 1.5)])
                .unwrap()
                .tracker_index,
            1
        );
    }
}
