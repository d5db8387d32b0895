//! Layout of the persistent data directory.

use std::path::{Path, PathBuf};

use kindle_common::TargetId;

/// Locations of every persisted file under the data directory.
///
/// ```text
/// <root>/
/// ├── lookups/
/// │   ├── lookups.bin
/// │   └── format-version.txt
/// └── targets/<target>/
///     ├── cache.bin
///     ├── experimental.bin
///     ├── format-version.txt
///     ├── experimental-format-version.txt
///     └── sources.json
/// ```
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Creates the layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the global lookup index (the data container).
    pub fn lookups_dir(&self) -> PathBuf {
        self.root.join("lookups")
    }

    /// Directory holding all persisted state of one target.
    pub fn target_dir(&self, target: &TargetId) -> PathBuf {
        self.root.join("targets").join(target.dir_name())
    }

    /// The per-target source manifest.
    pub fn source_manifest(&self, target: &TargetId) -> PathBuf {
        self.target_dir(target).join("sources.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_dir_uses_sanitized_name() {
        let paths = DataPaths::new("/p/.kindle");
        let dir = paths.target_dir(&TargetId::new("app tests"));
        assert_eq!(dir, PathBuf::from("/p/.kindle/targets/app_tests"));
    }

    #[test]
    fn manifest_lives_in_target_dir() {
        let paths = DataPaths::new("/p/.kindle");
        let target = TargetId::new("core");
        assert!(paths
            .source_manifest(&target)
            .starts_with(paths.target_dir(&target)));
        assert_eq!(paths.lookups_dir(), PathBuf::from("/p/.kindle/lookups"));
    }
}
