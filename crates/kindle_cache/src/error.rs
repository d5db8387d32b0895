//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur while reading or writing persistent build state.
///
/// A missing file is never an error: stores read absent data as empty. Any
/// variant other than [`CacheError::Io`] on a write path means persisted
/// data exists but cannot be trusted, which the engine treats as storage
/// corruption and answers with a full rebuild.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A source manifest could not be parsed as valid JSON.
    #[error("failed to parse source manifest {path}: {reason}")]
    ManifestParse {
        /// The manifest path.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A blob file has an invalid or missing header.
    #[error("invalid blob header in {path}: {reason}")]
    InvalidHeader {
        /// The blob file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The blob file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The blob format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The blob file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The actual format version found in the file.
        actual: u32,
    },

    /// A version stamp file does not hold an integer.
    #[error("unreadable version stamp {path}: {reason}")]
    InvalidStamp {
        /// The stamp file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error in {path}: {reason}")]
    Serialization {
        /// The file being encoded or decoded.
        path: PathBuf,
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    /// Returns `true` if persisted data exists but is unreadable.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, CacheError::Io { .. })
    }
}
