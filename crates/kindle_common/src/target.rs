//! Stable identifiers for build targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a compilation target (module), stable across builds.
///
/// The identifier is the target's configured name. It keys per-target
/// persistent data, so it must not change between invocations.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    /// Creates a target identifier from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the target name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a name safe to use as a single directory component.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced with `_`.
    pub fn dir_name(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
