//! The set of incremental caches taking part in one chunk's build.
//!
//! A [`CacheSet`] owns the caches of the chunk's targets and holds read-only
//! snapshots of every target that transitively depends on them. Dependent
//! relations are stored as target handles on each cache and resolved through
//! the set, so no cache holds a reference to another. Only the chunk's own
//! caches can be mutated or flushed; another chunk may be writing the
//! dependents at the same time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use kindle_common::TargetId;
use tracing::debug;

use crate::error::CacheError;
use crate::incremental::IncrementalCache;

/// Incremental caches keyed by target.
#[derive(Default)]
pub struct CacheSet {
    caches: BTreeMap<TargetId, IncrementalCache>,
    /// targets whose caches are read-only here
    snapshots: BTreeSet<TargetId>,
}

impl CacheSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cache owned by the chunk, replacing any previous cache of the
    /// same target.
    pub fn insert(&mut self, cache: IncrementalCache) {
        self.snapshots.remove(cache.target());
        self.caches.insert(cache.target().clone(), cache);
    }

    /// Adds a read-only cache of a dependent target.
    pub fn insert_snapshot(&mut self, cache: IncrementalCache) {
        self.snapshots.insert(cache.target().clone());
        self.caches.insert(cache.target().clone(), cache);
    }

    /// Returns `true` if the cache of `target` is a read-only snapshot.
    pub fn is_snapshot(&self, target: &TargetId) -> bool {
        self.snapshots.contains(target)
    }

    /// The cache of `target`.
    pub fn get(&self, target: &TargetId) -> Option<&IncrementalCache> {
        self.caches.get(target)
    }

    /// The cache of `target`, mutably. `None` for snapshots.
    pub fn get_mut(&mut self, target: &TargetId) -> Option<&mut IncrementalCache> {
        if self.snapshots.contains(target) {
            return None;
        }
        self.caches.get_mut(target)
    }

    /// Returns `true` if the set has a cache for `target`.
    pub fn contains(&self, target: &TargetId) -> bool {
        self.caches.contains_key(target)
    }

    /// Iterates caches in target order.
    pub fn iter(&self) -> impl Iterator<Item = &IncrementalCache> {
        self.caches.values()
    }

    /// Iterates the owned caches mutably in target order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut IncrementalCache> {
        let snapshots = &self.snapshots;
        self.caches
            .iter_mut()
            .filter(move |(target, _)| !snapshots.contains(*target))
            .map(|(_, cache)| cache)
    }

    /// Targets with a cache in the set.
    pub fn targets(&self) -> impl Iterator<Item = &TargetId> {
        self.caches.keys()
    }

    /// Number of caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Returns `true` if the set holds no cache.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Records that `dependent` depends on `target`.
    ///
    /// Does nothing if `target` has no cache in the set.
    pub fn wire_dependent(&mut self, target: &TargetId, dependent: &TargetId) {
        if let Some(cache) = self.caches.get_mut(target) {
            cache.add_dependent(dependent.clone());
        }
    }

    /// Files that inlined a function of `target` whose body changed.
    ///
    /// Usages are read from `target`'s own cache and from the caches of
    /// all its dependents.
    pub fn files_to_reinline(&self, target: &TargetId) -> BTreeSet<PathBuf> {
        let Some(cache) = self.caches.get(target) else {
            return BTreeSet::new();
        };
        let mut files = BTreeSet::new();
        let readers = std::iter::once(cache)
            .chain(cache.dependents().iter().filter_map(|d| self.caches.get(d)));
        for reader in readers {
            for (owner, functions) in cache.dirty_inline_functions() {
                for function in functions {
                    files.extend(reader.inline_usages(owner, function));
                }
            }
        }
        if !files.is_empty() {
            debug!(target_id = %target, files = files.len(), "files to reinline");
        }
        files
    }

    /// Clears the dirty inline function records of every owned cache.
    pub fn clean_all_dirty_inline_functions(&mut self) {
        for cache in self.iter_mut() {
            cache.clean_dirty_inline_functions();
        }
    }

    /// Flushes every owned cache, stopping at the first failure.
    pub fn flush_all(&mut self) -> Result<(), CacheError> {
        for cache in self.iter_mut() {
            cache.flush()?;
        }
        Ok(())
    }
}
