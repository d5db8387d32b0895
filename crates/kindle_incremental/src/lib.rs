//! The incremental recompilation engine.
//!
//! Targets are grouped into chunks by the [`DependencyGraph`]. Each chunk
//! is compiled in rounds by a [`RoundController`]: a round compiles the
//! chunk's dirty sources through a [`Compiler`], records what changed in
//! the incremental caches, and marks the files affected by those changes
//! dirty for the next round. A chunk is done once a round marks nothing.

#![warn(missing_docs)]

pub mod compiler;
pub mod config;
pub mod controller;
pub mod dirty;
pub mod error;
pub mod graph;
pub mod project;
pub mod propagate;
pub mod providers;
pub mod state;
pub mod stats;

pub use compiler::{
    classify_outputs, CompileRequest, Compiler, CompilerOutput, GeneratedFile, GeneratedKind,
    InlineUsage, OutputItem,
};
pub use config::EngineConfig;
pub use controller::{ChunkOutcome, ExitCode, RoundController, RoundOutcome};
pub use dirty::{DirtyFileProvider, ManifestDirtyFiles, RoundDirtyFiles};
pub use error::{EngineError, ProjectError};
pub use graph::DependencyGraph;
pub use project::{Chunk, Project, Target};
pub use propagate::{ChangePropagator, RoundFiles};
pub use providers::{ArgumentProvider, StaticArguments};
pub use state::{BuildInvocationState, CancellationToken};
pub use stats::{BuildStatistics, StatisticsSnapshot};
