//! Fit quality score
//!
//! The score is `-ln P(chi2, ndof)` with P the upper-tail chi-square
//! probability. Lower is better. Trajectories without degrees of freedom
//! score `+inf` and are never selected.

use muontrack::{ln_chi_squared_probability, Trajectory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub chi2: f64,
    pub ndof: i32,
    pub probability: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrajectoryScorer;

impl TrajectoryScorer {
    pub fn score_values(&self, chi2: f64, ndof: i32) -> TrajectorySummary {
        let ln_p = ln_chi_squared_probability(chi2, ndof);
        let score = if ndof <= 0 || ln_p.is_nan() {
            f64::INFINITY
        } else {
            -ln_p
        };
        TrajectorySummary {
            chi2,
            ndof,
            probability: if score.is_finite() { ln_p.exp() } else { 0.0 },
            score,
        }
    }

    pub fn score(&self, trajectory: &Trajectory) -> TrajectorySummary {
        self.score_values(trajectory.chi2(), trajectory.ndof())
    }
}
