//! Error types and load result structures for rule loaders.

use std::path::PathBuf;

use attend_core::RuleId;

/// Errors that can occur during rule loading and management.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Rule validation error (e.g. missing name, duplicate IDs).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// Backing store could not be reached.
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Rule was successfully loaded.
    Loaded { rule_id: RuleId },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
