//! Structured build messages, severity management, and terminal rendering.
//!
//! This crate provides [`Diagnostic`] messages with a severity, a code, and an
//! optional source location. The thread-safe [`DiagnosticSink`] accumulates
//! messages while chunks build in parallel, and [`TerminalRenderer`] formats
//! them for the console.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::{Diagnostic, Location};
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
