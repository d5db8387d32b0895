//! Shared foundational types used across the Kindle incremental build engine.
//!
//! This crate provides content hashing, stable target identifiers, and the
//! internal error type used to flag defects in the engine itself.

#![warn(missing_docs)]

pub mod hash;
pub mod result;
pub mod target;

pub use hash::ContentHash;
pub use result::{InternalError, KindleResult};
pub use target::TargetId;
