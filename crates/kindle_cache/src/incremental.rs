//! Per-target cache of binary-compatibility-relevant facts.
//!
//! Each target owns one [`IncrementalCache`]. It stores, per compiled class,
//! the facts whose change can break already-compiled callers: non-private
//! member signatures, inline function bodies, and constant values. Feeding
//! it new compiler output yields a [`CompilationResult`] describing what
//! changed since the previous snapshot.
//!
//! The cache has two sections. The normal section is always maintained.
//! The experimental section stores per-member hashes so signature changes
//! can name the exact members that changed; it is only kept when precise
//! propagation is enabled.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use kindle_common::{ContentHash, TargetId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changes::{ChangeInfo, CompilationResult};
use crate::class::ClassSummary;
use crate::error::CacheError;
use crate::paths::DataPaths;
use crate::store::BlobStore;

const NORMAL_BLOB: &str = "cache.bin";
const EXPERIMENTAL_BLOB: &str = "experimental.bin";

/// Stored facts about one compiled class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Source files that contributed to the class.
    pub sources: BTreeSet<PathBuf>,
    /// Hash over all non-private member signatures.
    pub signature: ContentHash,
    /// Names of the non-private members.
    pub members: BTreeSet<String>,
    /// Inline function name -> body hash.
    pub inline_functions: BTreeMap<String, ContentHash>,
    /// Constant name -> value hash.
    pub constants: BTreeMap<String, ContentHash>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NormalSection {
    classes: BTreeMap<String, ClassEntry>,
    source_to_classes: BTreeMap<PathBuf, BTreeSet<String>>,
    module_mapping: Option<ContentHash>,
    /// Classes whose sources are being recompiled; whatever is still here
    /// after the round produced no output and is purged.
    dirty_output_classes: BTreeSet<String>,
    /// owner class -> inline functions whose body changed this round
    dirty_inline_functions: BTreeMap<String, BTreeSet<String>>,
    /// owner class -> inline function -> files that inlined it
    inline_usages: BTreeMap<String, BTreeMap<String, BTreeSet<PathBuf>>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ExperimentalSection {
    /// class -> member name -> folded signature hash
    members: BTreeMap<String, BTreeMap<String, ContentHash>>,
}

/// The persistent incremental cache of a single target.
pub struct IncrementalCache {
    target: TargetId,
    store: BlobStore,
    normal: NormalSection,
    experimental: ExperimentalSection,
    track_members: bool,
    dependents: Vec<TargetId>,
    dirty: bool,
}

impl IncrementalCache {
    /// Opens the cache of `target`, or an empty one if nothing is persisted.
    ///
    /// `track_members` enables the experimental section.
    pub fn open(paths: &DataPaths, target: TargetId, track_members: bool) -> Result<Self, CacheError> {
        let store = BlobStore::new(&paths.target_dir(&target));
        let normal = store.read(NORMAL_BLOB)?.unwrap_or_default();
        let experimental = if track_members {
            store.read(EXPERIMENTAL_BLOB)?.unwrap_or_default()
        } else {
            ExperimentalSection::default()
        };
        Ok(Self {
            target,
            store,
            normal,
            experimental,
            track_members,
            dependents: Vec::new(),
            dirty: false,
        })
    }

    /// The target owning this cache.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Targets whose caches depend on this one.
    pub fn dependents(&self) -> &[TargetId] {
        &self.dependents
    }

    /// Registers `dependent` as depending on this cache's target.
    pub fn add_dependent(&mut self, dependent: TargetId) {
        if dependent != self.target && !self.dependents.contains(&dependent) {
            self.dependents.push(dependent);
        }
    }

    /// All cached classes by name.
    pub fn classes(&self) -> impl Iterator<Item = (&str, &ClassEntry)> {
        self.normal.classes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The cached entry for `class`.
    pub fn class(&self, class: &str) -> Option<&ClassEntry> {
        self.normal.classes.get(class)
    }

    /// Returns `true` if no class has been recorded.
    pub fn is_empty(&self) -> bool {
        self.normal.classes.is_empty()
    }

    /// Pre-invalidates the classes produced by `files`, which are about to
    /// be recompiled or were removed.
    ///
    /// The classes keep their previous snapshot for comparison but are
    /// flagged; any that the next round does not produce again are purged
    /// by [`clear_cache_for_removed_classes`](Self::clear_cache_for_removed_classes).
    /// Inline usages recorded for `files` are dropped since recompiling the
    /// files records them afresh.
    pub fn mark_output_classes_dirty<'a>(&mut self, files: impl IntoIterator<Item = &'a Path>) {
        for file in files {
            if let Some(classes) = self.normal.source_to_classes.remove(file) {
                debug!(
                    target_id = %self.target,
                    file = %file.display(),
                    classes = classes.len(),
                    "marking output classes dirty"
                );
                self.normal.dirty_output_classes.extend(classes);
                self.dirty = true;
            }
            for functions in self.normal.inline_usages.values_mut() {
                for callers in functions.values_mut() {
                    if callers.remove(file) {
                        self.dirty = true;
                    }
                }
            }
        }
        self.prune_inline_usages();
    }

    fn prune_inline_usages(&mut self) {
        for functions in self.normal.inline_usages.values_mut() {
            functions.retain(|_, callers| !callers.is_empty());
        }
        self.normal
            .inline_usages
            .retain(|_, functions| !functions.is_empty());
    }

    /// Stores a newly compiled class and classifies what changed against
    /// its previous snapshot.
    pub fn record_output(
        &mut self,
        summary: &ClassSummary,
        sources: impl IntoIterator<Item = PathBuf>,
    ) -> CompilationResult {
        let scope = summary.name.clone();
        let visible = summary.visible_members();
        let new_entry = ClassEntry {
            sources: sources.into_iter().collect(),
            signature: summary.signature_hash(),
            members: visible.keys().cloned().collect(),
            inline_functions: summary.inline_functions.clone(),
            constants: summary.constants.clone(),
        };

        let mut result = CompilationResult::NO_CHANGES;
        match self.normal.classes.get(&scope).cloned() {
            None => {
                if !new_entry.inline_functions.is_empty() {
                    result += ChangeInfo::InlineBodyAdded {
                        scope: scope.clone(),
                    };
                }
                if !new_entry.constants.is_empty() {
                    result += ChangeInfo::ConstantValueChanged {
                        scope: scope.clone(),
                    };
                }
                if !new_entry.members.is_empty() {
                    result += ChangeInfo::SignatureChanged {
                        members: new_entry.members.iter().cloned().collect(),
                        scope: scope.clone(),
                    };
                }
            }
            Some(old) => {
                result += self.diff_inline_functions(&scope, &old, &new_entry);
                if old.constants != new_entry.constants {
                    result += ChangeInfo::ConstantValueChanged {
                        scope: scope.clone(),
                    };
                }
                if old.signature != new_entry.signature {
                    let members = if self.track_members {
                        changed_members(self.experimental.members.get(&scope), &visible)
                    } else {
                        Vec::new()
                    };
                    result += ChangeInfo::SignatureChanged {
                        members,
                        scope: scope.clone(),
                    };
                }
            }
        }

        for source in &new_entry.sources {
            self.normal
                .source_to_classes
                .entry(source.clone())
                .or_default()
                .insert(scope.clone());
        }
        self.normal.dirty_output_classes.remove(&scope);
        if self.track_members {
            self.experimental.members.insert(scope.clone(), visible);
        }
        self.normal.classes.insert(scope.clone(), new_entry);
        self.dirty = true;

        if !result.is_empty() {
            debug!(target_id = %self.target, class = %scope, ?result, "class changed");
        }
        result
    }

    /// Compares inline function bodies and records changed or removed
    /// functions as dirty.
    fn diff_inline_functions(
        &mut self,
        scope: &str,
        old: &ClassEntry,
        new: &ClassEntry,
    ) -> CompilationResult {
        let mut added = false;
        let mut stale = BTreeSet::new();
        for (name, hash) in &new.inline_functions {
            match old.inline_functions.get(name) {
                None => added = true,
                Some(previous) if previous != hash => {
                    stale.insert(name.clone());
                }
                Some(_) => {}
            }
        }
        for name in old.inline_functions.keys() {
            if !new.inline_functions.contains_key(name) {
                stale.insert(name.clone());
            }
        }

        let mut result = CompilationResult::NO_CHANGES;
        if added {
            result += ChangeInfo::InlineBodyAdded {
                scope: scope.to_string(),
            };
        }
        if !stale.is_empty() {
            self.normal
                .dirty_inline_functions
                .entry(scope.to_string())
                .or_default()
                .extend(stale);
            result += ChangeInfo::InlineBodyChanged {
                scope: scope.to_string(),
            };
        }
        result
    }

    /// Stores the hash of the target's module mapping.
    ///
    /// A changed mapping is reported as a signature change without members.
    pub fn record_module_mapping(&mut self, bytes: &[u8]) -> CompilationResult {
        let hash = ContentHash::from_bytes(bytes);
        let previous = self.normal.module_mapping.replace(hash);
        if previous == Some(hash) {
            return CompilationResult::NO_CHANGES;
        }
        self.dirty = true;
        debug!(target_id = %self.target, "module mapping changed");
        CompilationResult::signature_only()
    }

    /// Records that `caller` inlined `function` of `owner`.
    pub fn record_inline_usage(&mut self, owner: &str, function: &str, caller: PathBuf) {
        let inserted = self
            .normal
            .inline_usages
            .entry(owner.to_string())
            .or_default()
            .entry(function.to_string())
            .or_default()
            .insert(caller);
        self.dirty |= inserted;
    }

    /// Files recorded as having inlined `function` of `owner`.
    pub fn inline_usages(&self, owner: &str, function: &str) -> BTreeSet<PathBuf> {
        self.normal
            .inline_usages
            .get(owner)
            .and_then(|functions| functions.get(function))
            .cloned()
            .unwrap_or_default()
    }

    /// Inline functions whose bodies changed or were removed, by owner class.
    pub fn dirty_inline_functions(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.normal.dirty_inline_functions
    }

    /// Forgets the dirty inline functions once their callers were handled.
    pub fn clean_dirty_inline_functions(&mut self) {
        if !self.normal.dirty_inline_functions.is_empty() {
            self.normal.dirty_inline_functions.clear();
            self.dirty = true;
        }
    }

    /// Purges classes that were pre-invalidated and not produced again.
    ///
    /// Each purged class reports a constant change and a signature change
    /// covering all of its non-private members.
    pub fn clear_cache_for_removed_classes(&mut self) -> CompilationResult {
        let removed = std::mem::take(&mut self.normal.dirty_output_classes);
        let mut result = CompilationResult::NO_CHANGES;
        for class in removed {
            self.experimental.members.remove(&class);
            let Some(entry) = self.normal.classes.remove(&class) else {
                continue;
            };
            debug!(target_id = %self.target, class = %class, "purging removed class");
            for source in &entry.sources {
                if let Some(classes) = self.normal.source_to_classes.get_mut(source) {
                    classes.remove(&class);
                    if classes.is_empty() {
                        self.normal.source_to_classes.remove(source);
                    }
                }
            }
            result += ChangeInfo::ConstantValueChanged {
                scope: class.clone(),
            };
            result += ChangeInfo::SignatureChanged {
                members: entry.members.into_iter().collect(),
                scope: class,
            };
            self.dirty = true;
        }
        result
    }

    /// Deletes the persisted sections of `target` without opening them.
    ///
    /// Works on blobs that no longer decode.
    pub fn clean_persisted(paths: &DataPaths, target: &TargetId) -> Result<(), CacheError> {
        let store = BlobStore::new(&paths.target_dir(target));
        store.remove(NORMAL_BLOB)?;
        store.remove(EXPERIMENTAL_BLOB)
    }

    /// Deletes the persisted experimental section of `target`.
    pub fn clean_persisted_experimental(
        paths: &DataPaths,
        target: &TargetId,
    ) -> Result<(), CacheError> {
        BlobStore::new(&paths.target_dir(target)).remove(EXPERIMENTAL_BLOB)
    }

    /// Drops both sections and deletes their blobs.
    pub fn clean(&mut self) -> Result<(), CacheError> {
        debug!(target_id = %self.target, "cleaning incremental cache");
        self.normal = NormalSection::default();
        self.store.remove(NORMAL_BLOB)?;
        self.clean_experimental()?;
        self.dirty = false;
        Ok(())
    }

    /// Drops the experimental section and deletes its blob.
    pub fn clean_experimental(&mut self) -> Result<(), CacheError> {
        self.experimental = ExperimentalSection::default();
        self.store.remove(EXPERIMENTAL_BLOB)
    }

    /// Writes the cache to disk if it changed since it was opened.
    pub fn flush(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        self.store.write(NORMAL_BLOB, &self.normal)?;
        if self.track_members {
            self.store.write(EXPERIMENTAL_BLOB, &self.experimental)?;
        }
        self.dirty = false;
        Ok(())
    }
}

fn changed_members(
    old: Option<&BTreeMap<String, ContentHash>>,
    new: &BTreeMap<String, ContentHash>,
) -> Vec<String> {
    let Some(old) = old else {
        return new.keys().cloned().collect();
    };
    let mut changed: BTreeSet<String> = new
        .iter()
        .filter(|(name, hash)| old.get(*name) != Some(*hash))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(old.keys().filter(|name| !new.contains_key(*name)).cloned());
    changed.into_iter().collect()
}
