//! Error types for reconstruction

/// Fatal reconstruction errors. No partial result is produced.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructError {
    /// The batch holds no events at all.
    #[error("event store is empty")]
    EmptyEventStore,

    /// No direction has both entry and exit points configured.
    #[error("no entry/exit points configured for any direction")]
    NoEntryExitPoints,

    /// The point graph yields no entry-to-exit path in either direction.
    #[error("no path found in forward nor in reverse direction")]
    NoPaths,

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ReconstructError>;
