//! Source file hashing and change detection.
//!
//! Computes content hashes for source files and compares them against a
//! target's [`SourceManifest`] to identify which files are new, modified,
//! deleted, or unchanged since the last build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kindle_common::ContentHash;

use crate::error::CacheError;
use crate::manifest::SourceManifest;

/// Result of comparing current source hashes against a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Files that are not present in the manifest.
    pub new_files: Vec<PathBuf>,

    /// Files whose content hash differs from the manifest.
    pub modified_files: Vec<PathBuf>,

    /// Files present in the manifest but not in the current file set.
    pub deleted_files: Vec<PathBuf>,

    /// Files whose content hash matches the manifest.
    pub unchanged_files: Vec<PathBuf>,
}

impl ChangeSet {
    /// Returns `true` if there are no new, modified, or deleted files.
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Files that must be compiled: new and modified, sorted.
    pub fn dirty_files(&self) -> Vec<PathBuf> {
        let mut dirty: Vec<PathBuf> = self
            .new_files
            .iter()
            .chain(&self.modified_files)
            .cloned()
            .collect();
        dirty.sort();
        dirty
    }

    /// Returns the number of files that need compiling (new + modified).
    pub fn dirty_count(&self) -> usize {
        self.new_files.len() + self.modified_files.len()
    }
}

/// Computes content hashes of source files and diffs them against manifests.
pub struct SourceHasher;

impl SourceHasher {
    /// Computes the XXH3-128 content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Computes content hashes for multiple files.
    ///
    /// Files that cannot be read are skipped and so appear as deleted in
    /// the change set.
    pub fn hash_files(paths: &[PathBuf]) -> BTreeMap<PathBuf, ContentHash> {
        paths
            .iter()
            .filter_map(|path| Self::hash_file(path).ok().map(|hash| (path.clone(), hash)))
            .collect()
    }

    /// Categorizes `current` against `manifest`.
    pub fn detect_changes(
        current: &BTreeMap<PathBuf, ContentHash>,
        manifest: &SourceManifest,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for (path, hash) in current {
            match manifest.files.get(path) {
                Some(known) if known == hash => changes.unchanged_files.push(path.clone()),
                Some(_) => changes.modified_files.push(path.clone()),
                None => changes.new_files.push(path.clone()),
            }
        }
        changes.deleted_files = manifest
            .files
            .keys()
            .filter(|p| !current.contains_key(*p))
            .cloned()
            .collect();
        changes
    }

    /// Builds the manifest describing `current`.
    pub fn manifest_of(current: BTreeMap<PathBuf, ContentHash>) -> SourceManifest {
        SourceManifest { files: current }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.kt");
        std::fs::write(&path, "fun a() = 1").unwrap();

        let h1 = SourceHasher::hash_file(&path).unwrap();
        let h2 = SourceHasher::hash_file(&path).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_file_nonexistent_errors() {
        assert!(SourceHasher::hash_file(Path::new("/nonexistent/file.kt")).is_err());
    }

    #[test]
    fn hash_files_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.kt");
        std::fs::write(&a, "fun a() = 1").unwrap();
        let hashes = SourceHasher::hash_files(&[a.clone(), dir.path().join("gone.kt")]);
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains_key(&a));
    }

    #[test]
    fn detect_changes_categorizes() {
        let same = ContentHash::from_bytes(b"same");
        let mut manifest = SourceManifest::new();
        manifest.insert(PathBuf::from("same.kt"), same);
        manifest.insert(PathBuf::from("edited.kt"), ContentHash::from_bytes(b"old"));
        manifest.insert(PathBuf::from("deleted.kt"), ContentHash::from_bytes(b"x"));

        let current = BTreeMap::from([
            (PathBuf::from("same.kt"), same),
            (PathBuf::from("edited.kt"), ContentHash::from_bytes(b"new")),
            (PathBuf::from("added.kt"), ContentHash::from_bytes(b"y")),
        ]);

        let cs = SourceHasher::detect_changes(&current, &manifest);
        assert_eq!(cs.new_files, vec![PathBuf::from("added.kt")]);
        assert_eq!(cs.modified_files, vec![PathBuf::from("edited.kt")]);
        assert_eq!(cs.deleted_files, vec![PathBuf::from("deleted.kt")]);
        assert_eq!(cs.unchanged_files, vec![PathBuf::from("same.kt")]);
        assert_eq!(
            cs.dirty_files(),
            vec![PathBuf::from("added.kt"), PathBuf::from("edited.kt")]
        );
        assert!(!cs.is_empty());
    }

    #[test]
    fn unchanged_tree_is_empty() {
        let hash = ContentHash::from_bytes(b"content");
        let current = BTreeMap::from([(PathBuf::from("a.kt"), hash)]);
        let manifest = SourceHasher::manifest_of(current.clone());
        let cs = SourceHasher::detect_changes(&current, &manifest);
        assert!(cs.is_empty());
        assert_eq!(cs.dirty_count(), 0);
    }
}
