//! Error types for migration runs.

use dmx_core::CoreError;
use thiserror::Error;

/// Errors that can occur while planning, running or recording migrations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The registered steps do not form a valid plan.
    #[error("invalid migration plan for {module}: {reason}")]
    InvalidPlan { module: String, reason: String },

    /// A step failed; its transaction was rolled back and the revision was
    /// not recorded.
    #[error("migration {module}#{revision} ({name}) failed: {source}")]
    Failed {
        module: String,
        revision: u64,
        name: String,
        #[source]
        source: CoreError,
    },

    /// An attempt to record a revision at or below the one already recorded.
    #[error("revision of {module} cannot move from {current} to {attempted}")]
    Regression {
        module: String,
        current: u64,
        attempted: u64,
    },

    /// The revision file could not be parsed or written.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock protecting revision state was poisoned.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Failure inside the core outside of a migration step.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error during file-based revision tracking.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for migration operations.
pub type MigrateResult<T> = std::result::Result<T, MigrateError>;
