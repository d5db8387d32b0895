//! Common result and error types for the Kindle engine.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates a defect in the engine itself (a broken invariant),
/// never a problem in the user's sources. User errors are reported as
/// diagnostics and the build still returns a structured result.
pub type KindleResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in Kindle, not a user input problem.
///
/// Rendered with the internal-error severity so it is never confused with
/// an error in the code being compiled.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
