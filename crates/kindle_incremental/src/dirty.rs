//! Dirty-file tracking between rounds.
//!
//! The engine only asks for the current round's dirty and removed files and
//! marks files dirty for the next round. How changes are detected is up to
//! the [`DirtyFileProvider`] implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use kindle_cache::{CacheError, ChangeSet, DataPaths, SourceHasher, SourceManifest};
use kindle_common::TargetId;
use tracing::debug;

use crate::project::{Chunk, Project};

/// Source of a round's dirty and removed files.
pub trait DirtyFileProvider {
    /// Files of `target` to compile this round.
    fn dirty_files(&self, target: &TargetId) -> Vec<PathBuf>;

    /// Files of `target` deleted since they were last compiled.
    fn removed_files(&self, target: &TargetId) -> Vec<PathBuf>;

    /// Schedules `file` for compilation in the next round.
    fn mark_dirty(&mut self, file: &Path);

    /// Ends a round of `chunk`: its dirty and removed files are forgotten
    /// and the files marked during the round become dirty for their owners.
    fn start_next_round(&mut self, chunk: &Chunk);
}

/// In-memory dirty-file tracking over a fixed set of source owners.
#[derive(Debug, Default)]
pub struct RoundDirtyFiles {
    owners: BTreeMap<PathBuf, TargetId>,
    dirty: BTreeMap<TargetId, BTreeSet<PathBuf>>,
    removed: BTreeMap<TargetId, BTreeSet<PathBuf>>,
    marked: BTreeSet<PathBuf>,
}

impl RoundDirtyFiles {
    /// Tracks every compilable file of `project`.
    pub fn for_project(project: &Project) -> Self {
        Self {
            owners: project.source_owners(project.target_ids()),
            ..Self::default()
        }
    }

    /// Marks every known file dirty for the current round.
    pub fn mark_all_dirty(&mut self) {
        for (file, target) in &self.owners {
            self.dirty
                .entry(target.clone())
                .or_default()
                .insert(file.clone());
        }
    }

    /// Marks `file` of `target` dirty for the current round.
    pub fn set_dirty(&mut self, target: &TargetId, file: impl Into<PathBuf>) {
        let file = file.into();
        self.owners.insert(file.clone(), target.clone());
        self.dirty.entry(target.clone()).or_default().insert(file);
    }

    /// Marks `file` of `target` removed for the current round.
    pub fn set_removed(&mut self, target: &TargetId, file: impl Into<PathBuf>) {
        let file = file.into();
        self.owners.remove(&file);
        self.removed.entry(target.clone()).or_default().insert(file);
    }

    /// Files marked dirty for the next round so far.
    pub fn marked(&self) -> &BTreeSet<PathBuf> {
        &self.marked
    }

    /// Returns `true` if no file is dirty or removed this round.
    pub fn is_clean(&self) -> bool {
        self.dirty.values().all(BTreeSet::is_empty) && self.removed.values().all(BTreeSet::is_empty)
    }
}

impl DirtyFileProvider for RoundDirtyFiles {
    fn dirty_files(&self, target: &TargetId) -> Vec<PathBuf> {
        self.dirty
            .get(target)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn removed_files(&self, target: &TargetId) -> Vec<PathBuf> {
        self.removed
            .get(target)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn mark_dirty(&mut self, file: &Path) {
        self.marked.insert(file.to_path_buf());
    }

    fn start_next_round(&mut self, chunk: &Chunk) {
        for target in chunk.targets() {
            self.dirty.remove(target);
            self.removed.remove(target);
        }
        for file in std::mem::take(&mut self.marked) {
            match self.owners.get(&file) {
                Some(target) => {
                    self.dirty.entry(target.clone()).or_default().insert(file);
                }
                None => debug!(file = %file.display(), "dropping dirty mark for unknown file"),
            }
        }
    }
}

/// Dirty-file tracking by content hash against per-target manifests.
///
/// Files marked dirty are left out of the manifest written by
/// [`commit`](Self::commit), so a later invocation still sees them dirty.
#[derive(Debug, Default)]
pub struct ManifestDirtyFiles {
    changes: BTreeMap<TargetId, ChangeSet>,
    current: BTreeMap<TargetId, SourceManifest>,
    inner: RoundDirtyFiles,
}

impl ManifestDirtyFiles {
    /// Hashes every compilable file of `project` and diffs it against the
    /// manifests persisted under `paths`.
    pub fn scan(project: &Project, paths: &DataPaths) -> Result<Self, CacheError> {
        let mut scanned = Self {
            inner: RoundDirtyFiles::for_project(project),
            ..Self::default()
        };
        for target in project.target_ids() {
            let manifest = SourceManifest::load(&paths.source_manifest(target))?;
            let hashes = SourceHasher::hash_files(&project.compilable_files(target));
            let changes = SourceHasher::detect_changes(&hashes, &manifest);
            for file in changes.dirty_files() {
                scanned.inner.set_dirty(target, file);
            }
            for file in &changes.deleted_files {
                scanned.inner.set_removed(target, file.clone());
            }
            scanned.changes.insert(target.clone(), changes);
            scanned
                .current
                .insert(target.clone(), SourceHasher::manifest_of(hashes));
        }
        Ok(scanned)
    }

    /// The change set found for `target`.
    pub fn changes(&self, target: &TargetId) -> Option<&ChangeSet> {
        self.changes.get(target)
    }

    /// Persists the scanned hashes of `targets`, leaving out files still
    /// marked dirty.
    pub fn commit<'a>(
        &self,
        paths: &DataPaths,
        targets: impl IntoIterator<Item = &'a TargetId>,
    ) -> Result<(), CacheError> {
        for target in targets {
            let Some(manifest) = self.current.get(target) else {
                continue;
            };
            let mut manifest = manifest.clone();
            for file in self.inner.marked() {
                manifest.remove(file);
            }
            manifest.save(&paths.source_manifest(target))?;
        }
        Ok(())
    }
}

impl DirtyFileProvider for ManifestDirtyFiles {
    fn dirty_files(&self, target: &TargetId) -> Vec<PathBuf> {
        self.inner.dirty_files(target)
    }

    fn removed_files(&self, target: &TargetId) -> Vec<PathBuf> {
        self.inner.removed_files(target)
    }

    fn mark_dirty(&mut self, file: &Path) {
        self.inner.mark_dirty(file);
    }

    fn start_next_round(&mut self, chunk: &Chunk) {
        self.inner.start_next_round(chunk);
    }
}
