//! Diagnostic rendering for console output.

use crate::diagnostic::Diagnostic;
use crate::severity::Severity;

/// Trait for rendering diagnostics into formatted output strings.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a rustc-style terminal format.
///
/// Produces output like:
/// ```text
/// error[E101]: unresolved reference: foo
///   --> src/app.kt:10:5
///    = note: ...
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn severity_label(&self, severity: Severity) -> String {
        if !self.color {
            return severity.to_string();
        }
        let ansi = match severity {
            Severity::Info => "1;34",
            Severity::Warning => "1;33",
            Severity::Error | Severity::InternalError => "1;31",
        };
        format!("\x1b[{ansi}m{severity}\x1b[0m")
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = format!(
            "{}[{}]: {}\n",
            self.severity_label(diag.severity),
            diag.code,
            diag.message
        );

        if let Some(location) = &diag.location {
            out.push_str(&format!("  --> {location}\n"));
        }

        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Category, DiagnosticCode};
    use crate::diagnostic::Location;
    use std::path::PathBuf;

    #[test]
    fn render_with_location_and_note() {
        let diag = Diagnostic::error(DiagnosticCode::new(Category::Error, 101), "type mismatch")
            .at(Location {
                path: PathBuf::from("src/app.kt"),
                line: 10,
                column: 5,
            })
            .with_note("expected Int");
        let out = TerminalRenderer::new(false).render(&diag);
        assert_eq!(
            out,
            "error[E101]: type mismatch\n  --> src/app.kt:10:5\n   = note: expected Int\n"
        );
    }

    #[test]
    fn render_internal_error() {
        let diag = Diagnostic::internal(2, "cache for target core was not loaded");
        let out = TerminalRenderer::new(false).render(&diag);
        assert!(out.starts_with("internal error[X002]:"));
    }

    #[test]
    fn color_wraps_severity() {
        let diag = Diagnostic::warning(DiagnosticCode::new(Category::Warning, 1), "cycle");
        let out = TerminalRenderer::new(true).render(&diag);
        assert!(out.starts_with("\x1b[1;33mwarning\x1b[0m[W001]"));
    }
}
