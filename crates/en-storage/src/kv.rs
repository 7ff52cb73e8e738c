//! # Key-Value Store Port
//!
//! The raw byte-level store beneath [`crate::state::StateStore`]. Two
//! adapters ship with the crate: an in-memory map for tests and a file-backed
//! map that persists atomically on every mutation.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Abstract interface for key-value persistence.
///
/// Keys are the stable strings from the shared-types catalog; values are
/// opaque serialized bytes. Implementations must persist each mutation before
/// returning so a crash never observes a half-applied write.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value under a key, replacing any previous value.
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<(), StorageError>;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// In-memory key-value store for unit tests and the demo runtime.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: HashMap<String, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }
}

/// Magic bytes opening the store file.
const STORE_MAGIC: &[u8; 4] = b"ENKV";

/// Bumped when the on-disk layout changes.
const STORE_FORMAT_VERSION: u8 = 1;

/// File-backed key-value store.
///
/// Holds the whole map in memory and rewrites the backing file on every
/// mutation: serialize, write to a temp file, fsync, rename over the old
/// file. The store is small (a dozen keys), so rewriting wholesale is cheaper
/// than being clever.
pub struct FileBackedKvStore {
    data: HashMap<String, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKvStore {
    /// Open the store at `path`, loading existing contents if present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let data = match std::fs::metadata(&path) {
            Ok(metadata) => {
                let data = Self::load_from_file(&path)?;
                tracing::info!(
                    "[en-storage] loaded {} keys from {} ({} bytes)",
                    data.len(),
                    path.display(),
                    metadata.len()
                );
                data
            }
            Err(_) => {
                tracing::info!("[en-storage] no store file at {}, starting empty", path.display());
                HashMap::new()
            }
        };

        Ok(Self { data, path })
    }

    fn load_from_file(path: &Path) -> Result<HashMap<String, Vec<u8>>, StorageError> {
        let mut file = std::fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < 5 || &bytes[0..4] != STORE_MAGIC {
            return Err(StorageError::CorruptStore("bad magic".to_owned()));
        }
        if bytes[4] != STORE_FORMAT_VERSION {
            return Err(StorageError::CorruptStore(format!(
                "unsupported format version {}",
                bytes[4]
            )));
        }

        Ok(bincode::deserialize(&bytes[5..])?)
    }

    fn save_to_file(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(STORE_MAGIC);
        bytes.push(STORE_FORMAT_VERSION);
        bytes.extend_from_slice(&bincode::serialize(&self.data)?);

        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

impl KeyValueStore for FileBackedKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.insert(key.to_owned(), value);
        self.save_to_file()
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        self.save_to_file()
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }
}
