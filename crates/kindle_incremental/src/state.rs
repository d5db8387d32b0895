//! State shared by every chunk of one build invocation.
//!
//! A [`BuildInvocationState`] is created when a build starts and passed by
//! reference to every round of every chunk. Chunks may build on separate
//! threads, so each set is behind its own lock and every update is a
//! test-and-set. The lookup index is global too: it is opened once per
//! invocation and every chunk reads and writes that one copy under its lock.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kindle_cache::{CacheError, LookupStorage};
use kindle_common::TargetId;

use crate::error::EngineError;
use crate::stats::BuildStatistics;

/// Cooperative cancellation flag, polled at round suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`EngineError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Process-wide bookkeeping for one build invocation.
#[derive(Debug, Default)]
pub struct BuildInvocationState {
    cleared_targets: Mutex<BTreeSet<TargetId>>,
    compiled_files: Mutex<BTreeSet<PathBuf>>,
    processed_removed: Mutex<BTreeSet<TargetId>>,
    lookups: Mutex<Option<LookupStorage>>,
    full_rebuild: bool,
    cancellation: CancellationToken,
    statistics: BuildStatistics,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BuildInvocationState {
    /// State for an incremental build.
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a forced rebuild of everything; version checks and
    /// propagation are skipped.
    pub fn full_rebuild() -> Self {
        Self {
            full_rebuild: true,
            ..Self::default()
        }
    }

    /// Uses `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns `true` for a forced full rebuild.
    pub fn is_full_rebuild(&self) -> bool {
        self.full_rebuild
    }

    /// The invocation's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The invocation's statistics.
    pub fn statistics(&self) -> &BuildStatistics {
        &self.statistics
    }

    /// Records that the caches of `targets` were cleared this build.
    ///
    /// Returns how many were not registered before.
    pub fn register_cleared<'a>(&self, targets: impl IntoIterator<Item = &'a TargetId>) -> usize {
        let mut cleared = lock(&self.cleared_targets);
        targets
            .into_iter()
            .filter(|t| cleared.insert((*t).clone()))
            .count()
    }

    /// Forgets that the caches of `targets` were cleared.
    pub fn unregister_cleared<'a>(&self, targets: impl IntoIterator<Item = &'a TargetId>) {
        let mut cleared = lock(&self.cleared_targets);
        for target in targets {
            cleared.remove(target);
        }
    }

    /// Returns `true` if every one of `targets` is registered as cleared.
    pub fn all_cleared<'a>(&self, targets: impl IntoIterator<Item = &'a TargetId>) -> bool {
        let cleared = lock(&self.cleared_targets);
        targets.into_iter().all(|t| cleared.contains(t))
    }

    /// Adds `files` to the files compiled so far in this build.
    pub fn add_compiled<'a>(&self, files: impl IntoIterator<Item = &'a PathBuf>) {
        lock(&self.compiled_files).extend(files.into_iter().cloned());
    }

    /// Returns `true` if `file` was compiled earlier in this build.
    pub fn is_compiled(&self, file: &Path) -> bool {
        lock(&self.compiled_files).contains(file)
    }

    /// A copy of the files compiled so far.
    pub fn compiled_files(&self) -> BTreeSet<PathBuf> {
        lock(&self.compiled_files).clone()
    }

    /// Forgets every compiled file.
    pub fn clear_compiled(&self) {
        lock(&self.compiled_files).clear();
    }

    /// Marks the removed files of `target` as handled.
    ///
    /// Returns `true` only for the first call per target.
    pub fn mark_removed_processed(&self, target: &TargetId) -> bool {
        lock(&self.processed_removed).insert(target.clone())
    }

    /// Runs `f` on the invocation's lookup index, opening it from `dir` on
    /// first use.
    ///
    /// The lock is held while `f` runs, so a read-modify-write inside `f`
    /// never interleaves with another chunk's.
    pub fn with_lookups<R>(
        &self,
        dir: &Path,
        f: impl FnOnce(&mut LookupStorage) -> Result<R, CacheError>,
    ) -> Result<R, CacheError> {
        let mut slot = lock(&self.lookups);
        let storage = match slot.take() {
            Some(storage) => storage,
            None => LookupStorage::open(dir)?,
        };
        f(slot.insert(storage))
    }

    /// Drops the in-memory index and deletes the persisted one in `dir`.
    pub fn clean_lookups(&self, dir: &Path) -> Result<(), CacheError> {
        let mut slot = lock(&self.lookups);
        *slot = None;
        LookupStorage::clean_persisted(dir)
    }
}
