//! Refit of a seed track with a chosen set of hits

use crate::error::{BuildError, Result};
use muontrack::hit::count_valid;
use muontrack::{HitRef, PropagationDirection, Track, Trajectory, TrajectoryFitter};
use std::sync::Arc;

/// Stable ordering of hits by distance from the origin
pub fn sort_hits(hits: &[HitRef], direction: PropagationDirection) -> Vec<HitRef> {
    let mut sorted = hits.to_vec();
    match direction {
        PropagationDirection::InsideOut => {
            sorted.sort_by(|a, b| a.radius().total_cmp(&b.radius()));
        }
        PropagationDirection::OutsideIn => {
            sorted.sort_by(|a, b| b.radius().total_cmp(&a.radius()));
        }
        PropagationDirection::Undefined => {}
    }
    sorted
}

pub struct TrajectoryRefitter<F: TrajectoryFitter> {
    fitter: Arc<F>,
    direction: PropagationDirection,
    min_hits: usize,
}

impl<F: TrajectoryFitter> Clone for TrajectoryRefitter<F> {
    fn clone(&self) -> Self {
        Self {
            fitter: Arc::clone(&self.fitter),
            direction: self.direction,
            min_hits: self.min_hits,
        }
    }
}

impl<F: TrajectoryFitter> TrajectoryRefitter<F> {
    pub fn new(fitter: Arc<F>, direction: PropagationDirection, min_hits: usize) -> Self {
        Self {
            fitter,
            direction,
            min_hits,
        }
    }

    pub fn fitter(&self) -> &F {
        &self.fitter
    }

    pub fn direction(&self) -> PropagationDirection {
        self.direction
    }

    pub fn refit(&self, seed: &Track, hits: &[HitRef]) -> Result<Trajectory> {
        self.refit_with(seed, hits, self.direction)
    }

    /// Fit `seed` to `hits` ordered along `direction`
    pub fn refit_with(
        &self,
        seed: &Track,
        hits: &[HitRef],
        direction: PropagationDirection,
    ) -> Result<Trajectory> {
        let valid = count_valid(hits);
        if valid < self.min_hits {
            return Err(BuildError::insufficient_hits(valid, self.min_hits));
        }

        let sorted = sort_hits(hits, direction);
        let trajectory = self.fitter.fit(seed, &sorted, direction)?;

        let fitted = trajectory.valid_hit_count();
        if fitted < self.min_hits {
            return Err(BuildError::insufficient_hits(fitted, self.min_hits));
        }
        if !trajectory.is_monotonic() {
            return Err(BuildError::refit(
                "fitted hits are not ordered along the propagation direction",
            ));
        }
        Ok(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muontrack::track::diagonal_covariance;
    use muontrack::{
        DetId, GlobalPoint, Hit, KalmanTrajectoryFitter, Provenance, Technology, TrackParameters,
        TrajectoryMeasurement, TrajectoryState,
    };
    use nalgebra::{Matrix4, Vector4};

    fn seed() -> Track {
        Track::new(
            1,
            Provenance::Tracker,
            TrackParameters::new(1, 1000.0, 0.0, 0.5),
            diagonal_covariance([1e-4, 1e-3, 1e-3, 1e-2, 1e-2]),
            Vec::new(),
        )
    }

    fn hit_at(radius: f64) -> HitRef {
        let det_id = if radius < 120.0 {
            DetId::tracker(radius as u8, 0)
        } else {
            DetId::muon(Technology::DriftTube, 1, 1, radius as u16)
        };
        Hit::new(
            det_id,
            GlobalPoint::from_cylindrical(radius, 0.5, 0.0),
            [0.01, 0.01],
        )
        .into_ref()
    }

    /// Keeps only the first two hits it is given
    struct DroppingFitter;

    impl TrajectoryFitter for DroppingFitter {
        fn fit(
            &self,
            _seed: &Track,
            hits: &[HitRef],
            direction: PropagationDirection,
        ) -> anyhow::Result<Trajectory> {
            let state = TrajectoryState {
                radius: 0.0,
                parameters: Vector4::zeros(),
                covariance: Matrix4::identity(),
            };
            let measurements = hits
                .iter()
                .take(2)
                .map(|h| TrajectoryMeasurement {
                    hit: h.clone(),
                    predicted: state,
                    updated: state,
                    estimate: 1.0,
                })
                .collect();
            Ok(Trajectory::new(measurements, direction, 4))
        }
    }

    /// Returns hits in the order given, whatever the direction
    struct UnorderedFitter;

    impl TrajectoryFitter for UnorderedFitter {
        fn fit(
            &self,
            _seed: &Track,
            hits: &[HitRef],
            direction: PropagationDirection,
        ) -> anyhow::Result<Trajectory> {
            let state = TrajectoryState {
                radius: 0.0,
                parameters: Vector4::zeros(),
                covariance: Matrix4::identity(),
            };
            let mut measurements: Vec<TrajectoryMeasurement> = hits
                .iter()
                .map(|h| TrajectoryMeasurement {
                    hit: h.clone(),
                    predicted: state,
                    updated: state,
                    estimate: 1.0,
                })
                .collect();
            measurements.swap(0, 1);
            Ok(Trajectory::new(measurements, direction, 4))
        }
    }

    #[test]
    fn test_sort_hits() {
        let hits = vec![hit_at(50.0), hit_at(10.0), hit_at(400.0), hit_at(30.0)];
        let radii = |hits: &[HitRef]| hits.iter().map(|h| h.radius().round()).collect::<Vec<_>>();
        assert_eq!(
            radii(&sort_hits(&hits, PropagationDirection::InsideOut)),
            vec![10.0, 30.0, 50.0, 400.0]
        );
        assert_eq!(
            radii(&sort_hits(&hits, PropagationDirection::OutsideIn)),
            vec![400.0, 50.0, 30.0, 10.0]
        );
        assert_eq!(
            radii(&sort_hits(&hits, PropagationDirection::Undefined)),
            vec![50.0, 10.0, 400.0, 30.0]
        );
    }

    #[test]
    fn test_refit_sorts_and_fits() {
        let refitter = TrajectoryRefitter::new(
            Arc::new(KalmanTrajectoryFitter::default()),
            PropagationDirection::InsideOut,
            3,
        );
        let hits = vec![hit_at(400.0), hit_at(30.0), hit_at(10.0), hit_at(50.0)];
        let trajectory = refitter.refit(&seed(), &hits).unwrap();
        assert!(trajectory.is_monotonic());
        assert_eq!(trajectory.valid_hit_count(), 4);
        assert_eq!(trajectory.ndof(), 4);

        // Refitting is repeatable
        let again = refitter.refit(&seed(), &hits).unwrap();
        assert_eq!(trajectory.chi2(), again.chi2());
    }

    #[test]
    fn test_too_few_hits_before_fit() {
        let refitter = TrajectoryRefitter::new(
            Arc::new(KalmanTrajectoryFitter::default()),
            PropagationDirection::InsideOut,
            3,
        );
        let err = refitter
            .refit(&seed(), &[hit_at(10.0), hit_at(30.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::InsufficientHits {
                found: 2,
                required: 3
            }
        ));
    }

    #[test]
    fn test_too_few_hits_after_fit() {
        let refitter =
            TrajectoryRefitter::new(Arc::new(DroppingFitter), PropagationDirection::InsideOut, 3);
        let hits = vec![hit_at(10.0), hit_at(30.0), hit_at(50.0), hit_at(400.0)];
        let err = refitter.refit(&seed(), &hits).unwrap_err();
        assert!(matches!(err, BuildError::InsufficientHits { found: 2, .. }));
    }

    #[test]
    fn test_fitter_errors_become_refit_failures() {
        let refitter = TrajectoryRefitter::new(
            Arc::new(KalmanTrajectoryFitter::default()),
            PropagationDirection::InsideOut,
            3,
        );
        let mut seed = seed();
        seed.parameters.phi = f64::NAN;
        let hits = vec![hit_at(10.0), hit_at(30.0), hit_at(50.0)];
        let err = refitter.refit(&seed, &hits).unwrap_err();
        assert!(matches!(err, BuildError::RefitFailure(_)));

        let refitter =
            TrajectoryRefitter::new(Arc::new(UnorderedFitter), PropagationDirection::InsideOut, 3);
        let err = refitter.refit(&self::seed(), &hits).unwrap_err();
        assert!(matches!(err, BuildError::RefitFailure(_)));
    }
}
