//! Error taxonomy for parity-archive operations.
//!
//! Parse-level damage is recoverable (one bad packet never poisons the
//! set); encode and reconstruct calls are all-or-nothing and surface the
//! first hard failure through these variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{FileId, Md5Hash};

/// Errors produced by the library. Each variant is pattern-matchable so the
/// front end can map it onto its exit-code table.
#[derive(Debug, Error)]
pub enum ParError {
    /// A magic, hash or layout violation encountered while parsing.
    #[error("invalid format in {location}: {detail}")]
    InvalidFormat { location: String, detail: String },

    /// Not enough recovery shards are available to reconstruct the missing
    /// data shards.
    #[error("not enough recovery data to repair")]
    InsufficientRecovery,

    /// No usable packet set could be resolved from the loaded volumes.
    #[error("insufficient critical packet data: {0}")]
    InsufficientCriticalData(String),

    /// Shards passed to a single coder call had differing lengths.
    #[error("shard length mismatch: expected {expected} bytes, got {actual}")]
    ShardLengthMismatch { expected: usize, actual: usize },

    /// The caller asked for an impossible coder or encoder configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Two input files derived the same file ID.
    #[error("duplicate file id {file_id} for {filename}")]
    DuplicateFileId { file_id: FileId, filename: String },

    /// Any filesystem failure; `not_found` distinguishes the absent-file
    /// subcase so callers can treat it as a missing shard.
    #[error("i/o error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        not_found: bool,
        #[source]
        source: std::io::Error,
    },

    /// A repaired file's hash did not match its file description.
    #[error("repaired file {file_id} failed verification: expected {expected}, got {actual}")]
    RepairFailed {
        file_id: FileId,
        expected: Md5Hash,
        actual: Md5Hash,
    },

    /// Division or inversion by zero inside the field solver. Cannot occur
    /// for a well-formed system.
    #[error("zero divisor in field computation")]
    ZeroDivisor,

    /// The operation observed its cancellation signal and stopped.
    #[error("operation canceled")]
    Canceled,
}

impl ParError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let not_found = source.kind() == std::io::ErrorKind::NotFound;
        ParError::Io {
            path: path.into(),
            not_found,
            source,
        }
    }

    /// Whether this error is an absent-file I/O error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ParError::Io { not_found: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, ParError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_flag() {
        let err = ParError::io(
            "missing.dat",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());

        let err = ParError::io(
            "locked.dat",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn errors_format() {
        let err = ParError::InvalidFormat {
            location: "header".to_string(),
            detail: "bad magic".to_string(),
        };
        assert_eq!(err.to_string(), "invalid format in header: bad magic");
    }
}
