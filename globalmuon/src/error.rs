//! Error types for the global muon trajectory builder

use thiserror::Error;

/// Result type alias for the builder
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur while building a combined muon trajectory.
///
/// Only `ConfigError`, `IoError` and `SerializationError` come from outside the event
/// loop; every other variant is local to one standalone track or one
/// candidate and degrades to "no combined trajectory".
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid region of interest: {0}")]
    InvalidRegion(String),

    #[error("Insufficient hits: {found} valid, at least {required} required")]
    InsufficientHits { found: usize, required: usize },

    #[error("Refit failed: {0}")]
    RefitFailure(String),

    #[error("Event deadline exceeded before the candidate was evaluated")]
    DeadlineExceeded,

    #[error("No muon trajectory found")]
    NoCandidate,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BuildError {
    pub fn invalid_region<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRegion(msg.into())
    }

    pub fn insufficient_hits(found: usize, required: usize) -> Self {
        Self::InsufficientHits { found, required }
    }

    pub fn refit<S: Into<String>>(msg: S) -> Self {
        Self::RefitFailure(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the error only removes one candidate from consideration
    pub fn is_candidate_local(&self) -> bool {
        matches!(
            self,
            Self::InsufficientHits { .. } | Self::RefitFailure(_) | Self::DeadlineExceeded
        )
    }
}

impl From<anyhow::Error> for BuildError {
    fn from(err: anyhow::Error) -> Self {
        Self::RefitFailure(format!("{:#}", err))
    }
}
