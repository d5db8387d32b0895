//! Structured build messages with severity, code, and optional location.

use crate::code::{Category, DiagnosticCode};
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A position in a source file, as reported by the external compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Path of the source file.
    pub path: PathBuf,
    /// 1-based line number, 0 if unknown.
    pub line: u32,
    /// 1-based column number, 0 if unknown.
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.path.display())
        } else {
            write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
        }
    }
}

/// A structured message emitted by the compiler or by the build engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of message.
    pub code: DiagnosticCode,
    /// The main message text.
    pub message: String,
    /// Where the message applies, if anywhere.
    pub location: Option<Location>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    /// Creates an informational message.
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, code, message)
    }

    /// Creates a warning.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    /// Creates an error in the code being compiled.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    /// Creates an internal error reporting a defect in the engine.
    ///
    /// Always carries the `X` category regardless of the number given.
    pub fn internal(number: u16, message: impl Into<String>) -> Self {
        Self::with_severity(
            Severity::InternalError,
            DiagnosticCode::new(Category::Internal, number),
            message,
        )
    }

    /// Attaches a source location.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_error() {
        let code = DiagnosticCode::new(Category::Error, 101);
        let diag = Diagnostic::error(code, "unresolved reference: foo");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(format!("{}", diag.code), "E101");
        assert!(diag.location.is_none());
    }

    #[test]
    fn internal_is_tagged_distinctly() {
        let diag = Diagnostic::internal(1, "dependent cache missing");
        assert_eq!(diag.severity, Severity::InternalError);
        assert_eq!(diag.code.category, Category::Internal);
    }

    #[test]
    fn builder_methods() {
        let code = DiagnosticCode::new(Category::Warning, 2);
        let diag = Diagnostic::warning(code, "deprecated call")
            .at(Location {
                path: PathBuf::from("src/a.kt"),
                line: 3,
                column: 7,
            })
            .with_note("replace with bar()");
        assert_eq!(diag.notes.len(), 1);
        assert_eq!(diag.location.unwrap().to_string(), "src/a.kt:3:7");
    }

    #[test]
    fn location_without_line() {
        let loc = Location {
            path: PathBuf::from("src/a.kt"),
            line: 0,
            column: 0,
        };
        assert_eq!(loc.to_string(), "src/a.kt");
    }
}
