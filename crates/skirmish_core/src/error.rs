//! Error types for the decision core.

use thiserror::Error;

use crate::types::UnitTypeId;

/// Result type alias using [`AiError`].
pub type Result<T> = std::result::Result<T, AiError>;

/// Top-level error type for all decision-core errors.
///
/// Most runtime conditions (no buildsite, no constructor, off-map position)
/// are not errors: they degrade to `Option`/`bool` returns and are retried on
/// a later pass. The variants here cover the few conditions the host has to
/// hear about.
#[derive(Debug, Error)]
pub enum AiError {
    /// Failed to load the AI configuration. This is the only fatal
    /// initialization error: the AI stops acting, the host keeps running.
    #[error("Failed to load config '{path}': {message}")]
    ConfigLoad {
        /// Path to the file that failed to load.
        path: String,
        /// Error message.
        message: String,
    },

    /// An entity-type id that is not present in the catalog.
    #[error("Unknown unit type: {0:?}")]
    UnknownUnitType(UnitTypeId),

    /// Persisted file carries an incompatible version string. The caller
    /// discards the file and regenerates it.
    #[error("Version mismatch in '{path}': expected {expected}, found {found}")]
    VersionMismatch {
        /// Path to the stale file.
        path: String,
        /// Version this build writes.
        expected: String,
        /// Version found on disk.
        found: String,
    },

    /// Failed to read or parse a persisted learning/cache file.
    #[error("Failed to load data file '{path}': {message}")]
    DataLoad {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Failed to write a persisted learning/cache file.
    #[error("Failed to save data file '{path}': {message}")]
    DataSave {
        /// Path to the file that failed to save.
        path: String,
        /// Error message.
        message: String,
    },
}
