//! Error taxonomy shared by every envboot crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by scoring, search, negotiation, and case flows.
///
/// Scoring and search failures are deterministic for a given snapshot and
/// repository, so none of them are retried inside the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("repository not found or unreadable: {}", .0.display())]
    RepoNotFound(PathBuf),

    #[error("invalid complexity override: {0:?} (expected simple, moderate, heavy, or very_heavy)")]
    InvalidComplexityOverride(String),

    #[error("unknown zone: {0}")]
    UnknownZone(String),

    #[error("insufficient capacity: {required} nodes not available in any of [{}]", .checked_zones.join(", "))]
    InsufficientCapacity {
        required: u32,
        checked_zones: Vec<String>,
    },

    #[error("downgrade rejected: {0}")]
    DowngradeRejected(String),

    #[error("invalid duration: {0} hours (must be > 0)")]
    InvalidDuration(f64),

    #[error("lease backend error: {0}")]
    Backend(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid resource request: {0}")]
    InvalidRequest(String),

    #[error("invalid allocation snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error came from the lease backend rather than from the
    /// caller's input or the snapshot.
    pub fn is_backend(&self) -> bool {
        matches!(self, EngineError::Backend(_))
    }
}
