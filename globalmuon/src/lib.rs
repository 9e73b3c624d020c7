//! Global muon trajectory builder
//!
//! Combines a standalone muon (outer muon-system hits only) with a
//! compatible tracker track (inner tracker hits only) into a single
//! refitted trajectory. For each standalone muon the builder defines a
//! region of interest, preselects tracker tracks inside it, refits every
//! candidate with the muon hits, drops poor-quality hits, refits again and
//! keeps the candidate with the best chi-square probability.
//!
//! ```rust,ignore
//! use globalmuon::{BuilderConfig, EventContext, GlobalMuonTrajectoryBuilder, TrajectoryBuilder};
//!
//! globalmuon::init_logging();
//! let builder = GlobalMuonTrajectoryBuilder::from_config(BuilderConfig::default())?;
//! let event = EventContext::new(&tracker_tracks).with_measurements(&muon_segments);
//! match builder.build_best(&standalone, &event) {
//!     Ok(muon) => println!("tracker track {} score {:.2}", muon.tracker_id, muon.summary.score),
//!     Err(e) => println!("{}", e),
//! }
//! ```

pub mod builder;
pub mod candidates;
pub mod config;
pub mod error;
pub mod event;
pub mod event_pool;
pub mod hit_filter;
pub mod occupancy;
pub mod refit;
pub mod region;
pub mod scorer;
pub mod selector;

pub use builder::{
    BuildStage, CandidateReport, CandidateSet, EventContext, GlobalMuonTrajectoryBuilder,
    MuonCandidate, TrajectoryBuilder,
};
pub use candidates::{CandidateFilter, TrackCand, TrackMatcher};
pub use config::{BuilderConfig, HitQualityConfig, MuonHitsOption, RegionConfig, TechnologyCut};
pub use error::{BuildError, Result};
pub use event::{EventMuons, EventProcessor};
pub use event_pool::{EventJob, EventResult, EventWorkerPool};
pub use hit_filter::{HitQualityFilter, HitSelection, RejectReason};
pub use occupancy::ChamberOccupancy;
pub use refit::TrajectoryRefitter;
pub use region::{RegionOfInterest, RegionSelector};
pub use scorer::{TrajectoryScorer, TrajectorySummary};
pub use selector::{ScoredCandidate, TrajectorySelector};

/// Install the `env_logger` backend, `info` unless `RUST_LOG` says otherwise
///
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
