//! Diagnostic severity levels ordered from least to most severe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity level of a build message.
///
/// Ordered from least severe (`Info`) to most severe (`InternalError`),
/// matching the derived `PartialOrd`/`Ord` implementation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Severity {
    /// Progress or informational output.
    Info,
    /// A potential issue that doesn't fail the build.
    Warning,
    /// An error in the code being compiled.
    Error,
    /// A defect in the build engine itself.
    InternalError,
}

impl Severity {
    /// Returns `true` if this severity fails the build.
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::InternalError)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::InternalError => write!(f, "internal error"),
        }
    }
}
