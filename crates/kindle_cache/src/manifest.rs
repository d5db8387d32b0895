//! Per-target source manifest recording the content hash of every source
//! file seen by the last build.
//!
//! The manifest is stored as pretty JSON so it can be inspected by hand.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kindle_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Content hashes of a target's source files as of the last build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceManifest {
    /// Source path -> content hash.
    pub files: BTreeMap<PathBuf, ContentHash>,
}

impl SourceManifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the manifest at `path`, or an empty one if the file is absent.
    ///
    /// A manifest that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&content).map_err(|e| CacheError::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Saves the manifest to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Records the hash of `path`.
    pub fn insert(&mut self, path: PathBuf, hash: ContentHash) {
        self.files.insert(path, hash);
    }

    /// Forgets `path`.
    pub fn remove(&mut self, path: &Path) {
        self.files.remove(path);
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no file is tracked.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
