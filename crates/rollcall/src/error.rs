//! Error types for the rollcall library.

use std::path::PathBuf;
use thiserror::Error;

use crate::record::RecordRef;

/// Main error type for rollcall operations.
///
/// Per-record problems (unidentifiable or conflicting records) are normally
/// collected into operation reports; the variants for them exist so callers
/// that request all-or-nothing semantics can surface them as errors.
#[derive(Debug, Error)]
pub enum RollcallError {
    /// Incoming record has neither a stable id nor a declared sequence.
    #[error("Unidentifiable record in section '{section_key}': {detail}")]
    UnidentifiableRecord { section_key: String, detail: String },

    /// Same identity key claimed by materially different content.
    #[error("Identity conflict for {target}: {detail}")]
    IdentityConflict { target: RecordRef, detail: String },

    /// A record cannot be placed in the canonical total order.
    #[error("Renumber inconsistency: {0}")]
    RenumberInconsistency(String),

    /// Snapshot or publish I/O failure.
    #[error("Storage error for '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot bytes no longer match the digest recorded when taken.
    #[error("Snapshot {id} is corrupt: expected digest {expected}, found {actual}")]
    SnapshotCorrupt {
        id: u64,
        expected: String,
        actual: String,
    },

    /// A referenced record or snapshot does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid engine or section configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reading an input file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RollcallError {
    /// Wrap an I/O error raised while touching persisted state.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RollcallError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a whole operation rather than one record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RollcallError::UnidentifiableRecord { .. } | RollcallError::IdentityConflict { .. }
        )
    }
}

/// Result type alias for rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;
