//! Cache format version stamps and invalidation actions.
//!
//! Every persisted cache kind carries an integer stamp naming the format
//! revision that wrote it. Before a chunk is compiled the stamps are compared
//! with the versions this build expects; each mismatch maps to an [`Action`]
//! describing how much state must be thrown away.

use std::collections::BTreeSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use kindle_common::TargetId;
use tracing::debug;

use crate::error::CacheError;
use crate::paths::DataPaths;
use crate::store::BLOB_FORMAT_VERSION;

/// What must happen to persisted state before a chunk can be compiled.
///
/// Variants are declared in increasing order of severity, so the derived
/// `Ord` gives `DoNothing < ... < RebuildAllModules`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Action {
    /// Stamps match; nothing to do.
    DoNothing,
    /// Drop the per-target experimental sections.
    CleanExperimentalCaches,
    /// Drop the global lookup index and its stamp.
    CleanDataContainer,
    /// Drop the per-target caches.
    CleanNormalCaches,
    /// Drop the chunk's caches and rebuild the chunk.
    RebuildChunk,
    /// Drop everything and rebuild every module in the project.
    RebuildAllModules,
}

impl Action {
    /// Returns `true` for actions that end the round with a rebuild request.
    pub fn is_rebuild(self) -> bool {
        matches!(self, Action::RebuildChunk | Action::RebuildAllModules)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::DoNothing => "do nothing",
            Action::CleanExperimentalCaches => "clean experimental caches",
            Action::CleanDataContainer => "clean data container",
            Action::CleanNormalCaches => "clean normal caches",
            Action::RebuildChunk => "rebuild chunk",
            Action::RebuildAllModules => "rebuild all modules",
        };
        f.write_str(name)
    }
}

/// The persisted cache kinds that carry a version stamp.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CacheKind {
    /// Per-target cache of signatures, inline bodies and constants.
    Normal,
    /// Per-target member-level data used by precise propagation.
    Experimental,
    /// The global lookup index shared by all targets.
    DataContainer,
}

impl CacheKind {
    /// Format revision of this kind's own data layout.
    fn own_version(self) -> u32 {
        match self {
            CacheKind::Normal => 4,
            CacheKind::Experimental => 2,
            CacheKind::DataContainer => 1,
        }
    }

    /// The stamp value a current build writes and expects.
    pub fn expected_version(self) -> u32 {
        self.own_version() * 1_000_000 + BLOB_FORMAT_VERSION
    }

    fn stamp_file(self) -> &'static str {
        match self {
            CacheKind::Normal | CacheKind::DataContainer => "format-version.txt",
            CacheKind::Experimental => "experimental-format-version.txt",
        }
    }

    fn when_version_changed(self) -> Action {
        match self {
            CacheKind::Normal | CacheKind::Experimental => Action::RebuildChunk,
            CacheKind::DataContainer => Action::RebuildAllModules,
        }
    }

    fn when_turned_on(self) -> Action {
        self.when_version_changed()
    }

    fn when_turned_off(self) -> Action {
        match self {
            CacheKind::Normal => Action::CleanNormalCaches,
            CacheKind::Experimental => Action::CleanExperimentalCaches,
            CacheKind::DataContainer => Action::CleanDataContainer,
        }
    }
}

/// One version stamp on disk, together with what this build expects of it.
#[derive(Debug, Clone)]
pub struct CacheVersion {
    kind: CacheKind,
    stamp_path: PathBuf,
    enabled: bool,
}

impl CacheVersion {
    /// Creates a stamp handle for `kind` stored at `stamp_path`.
    ///
    /// `enabled` says whether this build maintains the kind at all.
    pub fn new(kind: CacheKind, stamp_path: PathBuf, enabled: bool) -> Self {
        Self {
            kind,
            stamp_path,
            enabled,
        }
    }

    /// The cache kind this stamp belongs to.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Path of the stamp file.
    pub fn stamp_path(&self) -> &std::path::Path {
        &self.stamp_path
    }

    fn read_stamp(&self) -> Result<Option<u32>, CacheError> {
        let text = match std::fs::read_to_string(&self.stamp_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Io {
                    path: self.stamp_path.clone(),
                    source: e,
                })
            }
        };
        text.trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|e| CacheError::InvalidStamp {
                path: self.stamp_path.clone(),
                reason: e.to_string(),
            })
    }

    /// Compares the stamp on disk with the expected one.
    ///
    /// An unreadable stamp is storage corruption and maps to
    /// [`Action::RebuildAllModules`].
    pub fn check_version(&self) -> Action {
        let stamp = match self.read_stamp() {
            Ok(stamp) => stamp,
            Err(e) => {
                debug!(error = %e, "treating unreadable version stamp as corruption");
                return Action::RebuildAllModules;
            }
        };
        match (stamp, self.enabled) {
            (Some(actual), true) if actual != self.kind.expected_version() => {
                self.kind.when_version_changed()
            }
            (Some(_), true) => Action::DoNothing,
            (None, true) => self.kind.when_turned_on(),
            (Some(_), false) => self.kind.when_turned_off(),
            (None, false) => Action::DoNothing,
        }
    }

    /// Writes the expected stamp if the kind is enabled and the stamp on
    /// disk is missing or different.
    ///
    /// Returns `true` if the stamp was written.
    pub fn save_if_needed(&self) -> Result<bool, CacheError> {
        if !self.enabled {
            return Ok(false);
        }
        let expected = self.kind.expected_version();
        if matches!(self.read_stamp(), Ok(Some(actual)) if actual == expected) {
            return Ok(false);
        }
        if let Some(parent) = self.stamp_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&self.stamp_path, expected.to_string()).map_err(|e| CacheError::Io {
            path: self.stamp_path.clone(),
            source: e,
        })?;
        Ok(true)
    }

    /// Deletes the stamp file.
    pub fn clean(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.stamp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io {
                path: self.stamp_path.clone(),
                source: e,
            }),
        }
    }
}

/// Produces the version stamps relevant to a set of targets.
#[derive(Debug, Clone)]
pub struct CacheVersionRegistry {
    paths: DataPaths,
    incremental_enabled: bool,
    experimental: bool,
}

impl CacheVersionRegistry {
    /// Creates a registry for the given data layout and build mode.
    pub fn new(paths: DataPaths, incremental_enabled: bool, experimental: bool) -> Self {
        Self {
            paths,
            incremental_enabled,
            experimental,
        }
    }

    /// The per-target normal cache stamp.
    pub fn normal_version(&self, target: &TargetId) -> CacheVersion {
        let kind = CacheKind::Normal;
        CacheVersion::new(
            kind,
            self.paths.target_dir(target).join(kind.stamp_file()),
            self.incremental_enabled,
        )
    }

    /// The per-target experimental section stamp.
    pub fn experimental_version(&self, target: &TargetId) -> CacheVersion {
        let kind = CacheKind::Experimental;
        CacheVersion::new(
            kind,
            self.paths.target_dir(target).join(kind.stamp_file()),
            self.incremental_enabled && self.experimental,
        )
    }

    /// The global lookup index stamp.
    pub fn data_container_version(&self) -> CacheVersion {
        let kind = CacheKind::DataContainer;
        CacheVersion::new(
            kind,
            self.paths.lookups_dir().join(kind.stamp_file()),
            self.incremental_enabled && self.experimental,
        )
    }

    /// Every stamp relevant to `targets`: two per target plus the global one.
    pub fn all_versions<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a TargetId>,
    ) -> Vec<CacheVersion> {
        let mut versions = Vec::new();
        for target in targets {
            versions.push(self.normal_version(target));
            versions.push(self.experimental_version(target));
        }
        versions.push(self.data_container_version());
        versions
    }

    /// Checks every stamp and returns the distinct actions, sorted by severity.
    pub fn check_all<'a>(&self, targets: impl IntoIterator<Item = &'a TargetId>) -> BTreeSet<Action> {
        self.all_versions(targets)
            .iter()
            .map(CacheVersion::check_version)
            .collect()
    }

    /// Persists the stamps of every enabled kind that changed.
    ///
    /// Returns how many stamps were written.
    pub fn save_all<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a TargetId>,
    ) -> Result<usize, CacheError> {
        let mut written = 0;
        for version in self.all_versions(targets) {
            if version.save_if_needed()? {
                written += 1;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &tempfile::TempDir, enabled: bool, experimental: bool) -> CacheVersionRegistry {
        CacheVersionRegistry::new(DataPaths::new(dir.path()), enabled, experimental)
    }

    #[test]
    fn severity_ordering() {
        assert!(Action::DoNothing < Action::CleanExperimentalCaches);
        assert!(Action::CleanExperimentalCaches < Action::CleanDataContainer);
        assert!(Action::CleanDataContainer < Action::CleanNormalCaches);
        assert!(Action::CleanNormalCaches < Action::RebuildChunk);
        assert!(Action::RebuildChunk < Action::RebuildAllModules);
    }

    #[test]
    fn fresh_store_requests_chunk_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, false);
        let target = TargetId::new("core");
        let actions = reg.check_all([&target]);
        assert_eq!(actions.iter().next_back(), Some(&Action::RebuildChunk));
    }

    #[test]
    fn saved_stamps_check_clean() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, true);
        let target = TargetId::new("core");
        assert_eq!(reg.save_all([&target]).unwrap(), 3);
        let actions = reg.check_all([&target]);
        assert_eq!(actions.into_iter().collect::<Vec<_>>(), vec![Action::DoNothing]);
    }

    #[test]
    fn save_if_needed_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, false);
        let target = TargetId::new("core");
        assert_eq!(reg.save_all([&target]).unwrap(), 1);
        assert_eq!(reg.save_all([&target]).unwrap(), 0);
    }

    #[test]
    fn changed_normal_stamp_rebuilds_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, false);
        let target = TargetId::new("core");
        let version = reg.normal_version(&target);
        version.save_if_needed().unwrap();
        std::fs::write(version.stamp_path(), "1").unwrap();
        assert_eq!(version.check_version(), Action::RebuildChunk);
    }

    #[test]
    fn changed_data_container_stamp_rebuilds_all() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, true);
        let version = reg.data_container_version();
        version.save_if_needed().unwrap();
        std::fs::write(version.stamp_path(), "7").unwrap();
        assert_eq!(version.check_version(), Action::RebuildAllModules);
    }

    #[test]
    fn turning_experimental_off_cleans() {
        let dir = tempfile::tempdir().unwrap();
        let target = TargetId::new("core");
        registry(&dir, true, true).save_all([&target]).unwrap();

        let actions = registry(&dir, true, false).check_all([&target]);
        assert!(actions.contains(&Action::CleanExperimentalCaches));
        assert!(actions.contains(&Action::CleanDataContainer));
        assert!(!actions.iter().any(|a| a.is_rebuild()));
    }

    #[test]
    fn turning_incremental_off_cleans_normal() {
        let dir = tempfile::tempdir().unwrap();
        let target = TargetId::new("core");
        registry(&dir, true, false).save_all([&target]).unwrap();

        let actions = registry(&dir, false, false).check_all([&target]);
        assert_eq!(actions.iter().next_back(), Some(&Action::CleanNormalCaches));
    }

    #[test]
    fn garbage_stamp_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, false);
        let version = reg.normal_version(&TargetId::new("core"));
        std::fs::create_dir_all(version.stamp_path().parent().unwrap()).unwrap();
        std::fs::write(version.stamp_path(), "not a number").unwrap();
        assert_eq!(version.check_version(), Action::RebuildAllModules);
    }

    #[test]
    fn disabled_and_absent_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, false, false);
        let actions = reg.check_all([&TargetId::new("core")]);
        assert_eq!(actions.into_iter().collect::<Vec<_>>(), vec![Action::DoNothing]);
    }

    #[test]
    fn clean_removes_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, true, true);
        let version = reg.data_container_version();
        version.save_if_needed().unwrap();
        version.clean().unwrap();
        assert!(!version.stamp_path().exists());
        version.clean().unwrap();
    }
}
