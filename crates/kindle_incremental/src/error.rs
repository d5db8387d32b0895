//! Errors raised while driving a build round.

use std::path::PathBuf;

use kindle_cache::CacheError;
use kindle_common::{InternalError, TargetId};

/// Failure of a build round.
///
/// [`EngineError::Cancelled`] is distinct from every other variant: it is
/// returned to the caller unchanged, skips persistence for the round, and
/// never counts as a failed round.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The build was cancelled at a suspension point.
    #[error("build cancelled")]
    Cancelled,

    /// The compiler emitted a class file without readable metadata.
    #[error("malformed compiler output {path}: {reason}")]
    MalformedArtifact {
        /// The offending output file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Persistent state could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// An invariant of the engine was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl EngineError {
    /// Returns `true` if persisted data exists but cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, EngineError::Cache(e) if e.is_corruption())
    }
}

/// The project model is inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// A source file lies under the source roots of two targets.
    #[error("source file {} belongs to both target '{first}' and target '{second}'", .file.display())]
    SharedSource {
        /// The file claimed twice.
        file: PathBuf,
        /// The target that claimed it first.
        first: TargetId,
        /// The target that claimed it again.
        second: TargetId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_is_detected_through_wrapper() {
        let err = EngineError::from(CacheError::InvalidStamp {
            path: PathBuf::from("format-version.txt"),
            reason: "not a number".to_string(),
        });
        assert!(err.is_corruption());
        assert!(!EngineError::Cancelled.is_corruption());
    }

    #[test]
    fn internal_error_display_is_transparent() {
        let err = EngineError::from(InternalError::new("cache missing for core"));
        assert_eq!(err.to_string(), "internal error: cache missing for core");
    }

    #[test]
    fn shared_source_names_both_targets() {
        let err = ProjectError::SharedSource {
            file: PathBuf::from("src/x.kt"),
            first: TargetId::new("core"),
            second: TargetId::new("app"),
        };
        assert_eq!(
            err.to_string(),
            "source file src/x.kt belongs to both target 'core' and target 'app'"
        );
    }
}
