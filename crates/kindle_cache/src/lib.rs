//! Persistent incremental compilation state.
//!
//! This crate owns everything the build engine keeps on disk between
//! invocations: per-target incremental caches of ABI-relevant facts, the
//! global symbol lookup index, cache format version stamps, and per-target
//! source manifests used to detect dirty files. All data lives under a single
//! data directory described by [`DataPaths`].

#![warn(missing_docs)]

pub mod cache;
pub mod changes;
pub mod class;
pub mod error;
pub mod hasher;
pub mod incremental;
pub mod lookup;
pub mod manifest;
pub mod paths;
pub mod store;
pub mod version;

pub use cache::CacheSet;
pub use changes::{ChangeInfo, CompilationResult};
pub use class::{ClassSummary, MemberSignature, Visibility};
pub use error::CacheError;
pub use hasher::{ChangeSet, SourceHasher};
pub use incremental::{ClassEntry, IncrementalCache};
pub use lookup::{LookupStorage, LookupSymbol};
pub use manifest::SourceManifest;
pub use paths::DataPaths;
pub use store::BlobStore;
pub use version::{Action, CacheKind, CacheVersion, CacheVersionRegistry};
