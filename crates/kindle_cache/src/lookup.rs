//! Persistent index of which files referenced which symbols.
//!
//! During compilation the external compiler records every `(name, scope)`
//! pair it resolved and the file that resolved it. Precise propagation uses
//! this index to find the files affected by a changed member.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CacheError;
use crate::store::BlobStore;

const LOOKUPS_BLOB: &str = "lookups.bin";

/// A looked-up name together with the scope it was resolved in.
///
/// The pair is the storage key: the same symbol always maps to the same
/// entry across builds.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct LookupSymbol {
    /// The referenced member or class name.
    pub name: String,
    /// Fully qualified name of the owning scope.
    pub scope: String,
}

impl LookupSymbol {
    /// Creates a symbol key.
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for LookupSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.name)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LookupTable {
    /// symbol -> files that referenced it
    symbols: BTreeMap<LookupSymbol, BTreeSet<PathBuf>>,
    /// file -> symbols it referenced; makes removal proportional to the
    /// file's own entries
    files: BTreeMap<PathBuf, BTreeSet<LookupSymbol>>,
}

/// The global symbol lookup index (the "data container").
///
/// Entries are file-scoped: a file's previous entries must be removed with
/// [`remove_lookups_from`](Self::remove_lookups_from) before its new lookups
/// are added, so no stale references accumulate.
#[derive(Debug)]
pub struct LookupStorage {
    store: BlobStore,
    table: LookupTable,
    dirty: bool,
}

impl LookupStorage {
    /// Opens the index stored in `dir`, or an empty one if none exists.
    ///
    /// Fails if the persisted index exists but cannot be read.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        let store = BlobStore::new(dir);
        let table = store.read(LOOKUPS_BLOB)?.unwrap_or_default();
        Ok(Self {
            store,
            table,
            dirty: false,
        })
    }

    /// Deletes the persisted index in `dir` without opening it.
    pub fn clean_persisted(dir: &Path) -> Result<(), CacheError> {
        BlobStore::new(dir).remove(LOOKUPS_BLOB)
    }

    /// Records that every file in `files` referenced `symbol`.
    pub fn add(&mut self, symbol: LookupSymbol, files: impl IntoIterator<Item = PathBuf>) {
        for file in files {
            self.table
                .files
                .entry(file.clone())
                .or_default()
                .insert(symbol.clone());
            self.table
                .symbols
                .entry(symbol.clone())
                .or_default()
                .insert(file);
            self.dirty = true;
        }
    }

    /// Returns the files known to reference `symbol`.
    ///
    /// An empty set means no known referrers.
    pub fn get(&self, symbol: &LookupSymbol) -> BTreeSet<PathBuf> {
        self.table.symbols.get(symbol).cloned().unwrap_or_default()
    }

    /// Removes every entry recorded for `file`.
    pub fn remove_lookups_from(&mut self, file: &Path) {
        let Some(symbols) = self.table.files.remove(file) else {
            return;
        };
        for symbol in symbols {
            if let Some(referrers) = self.table.symbols.get_mut(&symbol) {
                referrers.remove(file);
                if referrers.is_empty() {
                    self.table.symbols.remove(&symbol);
                }
            }
        }
        self.dirty = true;
    }

    /// Number of distinct symbols in the index.
    pub fn symbol_count(&self) -> usize {
        self.table.symbols.len()
    }

    /// Returns `true` if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.symbols.is_empty()
    }

    /// Drops every entry and deletes the persisted index.
    pub fn clean(&mut self) -> Result<(), CacheError> {
        debug!(dir = %self.store.dir().display(), "cleaning lookup storage");
        self.table = LookupTable::default();
        self.dirty = false;
        self.store.remove(LOOKUPS_BLOB)
    }

    /// Writes the index to disk if it changed since it was opened.
    pub fn flush(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        self.store.write(LOOKUPS_BLOB, &self.table)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn add_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = LookupStorage::open(dir.path()).unwrap();
        let foo = LookupSymbol::new("foo", "Widget");
        storage.add(foo.clone(), paths(&["y.kt", "z.kt"]));

        let files = storage.get(&foo);
        assert_eq!(files.len(), 2);
        assert!(files.contains(Path::new("y.kt")));
        assert!(storage.get(&LookupSymbol::new("foo", "Other")).is_empty());
    }

    #[test]
    fn remove_lookups_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = LookupStorage::open(dir.path()).unwrap();
        let foo = LookupSymbol::new("foo", "Widget");
        let bar = LookupSymbol::new("bar", "Widget");
        storage.add(foo.clone(), paths(&["y.kt", "z.kt"]));
        storage.add(bar.clone(), paths(&["y.kt"]));

        storage.remove_lookups_from(Path::new("y.kt"));
        assert_eq!(
            storage.get(&foo).into_iter().collect::<Vec<_>>(),
            paths(&["z.kt"])
        );
        assert!(storage.get(&bar).is_empty());
        assert_eq!(storage.symbol_count(), 1);
    }

    #[test]
    fn remove_unknown_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = LookupStorage::open(dir.path()).unwrap();
        storage.remove_lookups_from(Path::new("never.kt"));
        assert!(storage.is_empty());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let foo = LookupSymbol::new("foo", "Widget");
        {
            let mut storage = LookupStorage::open(dir.path()).unwrap();
            storage.add(foo.clone(), paths(&["y.kt"]));
            storage.flush().unwrap();
        }
        let storage = LookupStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get(&foo).len(), 1);
    }

    #[test]
    fn clean_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let foo = LookupSymbol::new("foo", "Widget");
        let mut storage = LookupStorage::open(dir.path()).unwrap();
        storage.add(foo.clone(), paths(&["y.kt"]));
        storage.flush().unwrap();
        storage.clean().unwrap();
        assert!(storage.is_empty());

        let reopened = LookupStorage::open(dir.path()).unwrap();
        assert!(reopened.get(&foo).is_empty());
    }

    #[test]
    fn corrupt_index_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOOKUPS_BLOB), b"\x01\x00\x00\x00?").unwrap();
        let err = LookupStorage::open(dir.path()).err().unwrap();
        assert!(err.is_corruption());
    }

    #[test]
    fn clean_persisted_recovers_from_corruption() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOOKUPS_BLOB), b"garbage").unwrap();
        LookupStorage::clean_persisted(dir.path()).unwrap();
        assert!(LookupStorage::open(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn symbol_display() {
        assert_eq!(LookupSymbol::new("foo", "app.Widget").to_string(), "app.Widget#foo");
    }
}
