//! Track, hit and trajectory model for combined muon reconstruction
//!
//! This crate provides the building blocks used by the global muon
//! trajectory builder:
//!
//! - packed detector identifiers and global coordinates (`geometry`)
//! - hits, tracks and fitted trajectories
//! - a Kalman filter and the `TrajectoryFitter` refit service built on it
//! - chi-square tail probabilities computed in log space
//! - an (eta, phi) grid for large track collections
//! - a Hungarian assignment solver
//!
//! ```rust,ignore
//! use muontrack::{KalmanTrajectoryFitter, PropagationDirection, TrajectoryFitter};
//!
//! let fitter = KalmanTrajectoryFitter::default();
//! let trajectory = fitter.fit(&tracker_track, &hits, PropagationDirection::InsideOut)?;
//! println!("chi2/ndof = {}/{}", trajectory.chi2(), trajectory.ndof());
//! ```

pub mod fitter;
pub mod geometry;
pub mod hit;
pub mod hungarian; // Hungarian algorithm for optimal assignment
pub mod kalman;
pub mod probability;
pub mod spatial;
pub mod track;
pub mod trajectory;

pub use fitter::{FitterConfig, KalmanTrajectoryFitter, TrajectoryFitter, FIT_PARAMETERS};
pub use geometry::{delta_phi, DetId, GlobalPoint, Technology};
pub use hit::{Hit, HitRef};
pub use hungarian::{AssignmentResult, HungarianSolver};
pub use probability::{chi_squared_probability, ln_chi_squared_probability};
pub use spatial::EtaPhiGrid;
pub use track::{Provenance, Track, TrackParameters};
pub use trajectory::{
    FitSummary, PropagationDirection, Trajectory, TrajectoryMeasurement, TrajectoryState,
};
