//! Checksummed binary blob storage.
//!
//! Caches and the lookup index are persisted as `bincode` blobs inside a
//! directory. Each blob has a header containing magic bytes, the blob format
//! version, and a checksum of the payload, so a truncated or foreign file is
//! reported as corruption instead of being decoded into garbage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kindle_common::ContentHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a Kindle blob.
const BLOB_MAGIC: [u8; 4] = *b"KNDL";

/// Current blob format version. Increment on breaking changes to the header
/// or to any persisted payload type; it is folded into every cache version
/// stamp so a bump invalidates all caches.
pub const BLOB_FORMAT_VERSION: u32 = 1;

/// Header prepended to every blob for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobHeader {
    magic: [u8; 4],
    format_version: u32,
    checksum: ContentHash,
}

/// A directory of named, checksummed `bincode` blobs.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Creates a blob store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Returns the directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path of the blob with the given name.
    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Serializes `value` and writes it as the named blob.
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.blob_path(name);

        let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        std::fs::write(&path, &output).map_err(|e| CacheError::Io { path, source: e })
    }

    /// Reads and decodes the named blob.
    ///
    /// Returns `Ok(None)` if the blob does not exist. A blob that exists but
    /// fails header, version, or checksum validation is an error.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CacheError> {
        let path = self.blob_path(name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };

        if raw.len() < 4 {
            return Err(CacheError::InvalidHeader {
                path,
                reason: "file too short for header length".to_string(),
            });
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if raw.len() < 4 + header_len {
            return Err(CacheError::InvalidHeader {
                path,
                reason: format!("header length {header_len} exceeds file size"),
            });
        }

        let (header, _): (BlobHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| CacheError::InvalidHeader {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

        if header.magic != BLOB_MAGIC {
            return Err(CacheError::InvalidHeader {
                path,
                reason: "missing magic bytes".to_string(),
            });
        }
        if header.format_version != BLOB_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path,
                expected: BLOB_FORMAT_VERSION,
                actual: header.format_version,
            });
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        let (value, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Some(value))
    }

    /// Removes the named blob. Removing a missing blob is not an error.
    pub fn remove(&self, name: &str) -> Result<(), CacheError> {
        let path = self.blob_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn make_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(&dir.path().join("blobs"));
        (dir, store)
    }

    fn write_raw(store: &BlobStore, name: &str, header: &BlobHeader, payload: &[u8]) {
        std::fs::create_dir_all(store.dir()).unwrap();
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        std::fs::write(store.blob_path(name), output).unwrap();
    }

    #[test]
    fn write_and_read_map() {
        let (_dir, store) = make_store();
        let mut value = BTreeMap::new();
        value.insert("Widget".to_string(), vec!["a.kt".to_string()]);
        store.write("table.bin", &value).unwrap();

        let back: BTreeMap<String, Vec<String>> = store.read("table.bin").unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn read_missing_is_none() {
        let (_dir, store) = make_store();
        let value: Option<Vec<u32>> = store.read("absent.bin").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn read_garbage_is_error() {
        let (_dir, store) = make_store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.blob_path("bad.bin"), b"garbage data").unwrap();
        let err = store.read::<Vec<u32>>("bad.bin").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn read_truncated_is_error() {
        let (_dir, store) = make_store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.blob_path("short.bin"), b"AB").unwrap();
        assert!(matches!(
            store.read::<Vec<u32>>("short.bin"),
            Err(CacheError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn read_wrong_magic_is_error() {
        let (_dir, store) = make_store();
        let header = BlobHeader {
            magic: *b"BAAD",
            format_version: BLOB_FORMAT_VERSION,
            checksum: ContentHash::from_bytes(b"data"),
        };
        write_raw(&store, "magic.bin", &header, b"data");
        assert!(matches!(
            store.read::<Vec<u32>>("magic.bin"),
            Err(CacheError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn read_old_format_is_error() {
        let (_dir, store) = make_store();
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: 999,
            checksum: ContentHash::from_bytes(b"data"),
        };
        write_raw(&store, "old.bin", &header, b"data");
        assert!(matches!(
            store.read::<Vec<u32>>("old.bin"),
            Err(CacheError::VersionMismatch { actual: 999, .. })
        ));
    }

    #[test]
    fn read_tampered_payload_is_error() {
        let (_dir, store) = make_store();
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            checksum: ContentHash::from_bytes(b"data"),
        };
        write_raw(&store, "tampered.bin", &header, b"tampered");
        assert!(matches!(
            store.read::<Vec<u32>>("tampered.bin"),
            Err(CacheError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = make_store();
        store.write("x.bin", &42u32).unwrap();
        store.remove("x.bin").unwrap();
        store.remove("x.bin").unwrap();
        assert!(store.read::<u32>("x.bin").unwrap().is_none());
    }
}
