//! # Key Set Blob Store
//!
//! Downloaded key sets live as `<identifier>.sig` / `<identifier>.bin` pairs
//! in one directory until the detection pipeline has consumed them. The
//! [`BlobStore`] owns the naming and relocation rules; the [`FileSystem`]
//! port keeps the actual filesystem swappable in tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use shared_types::entities::KeySetHolder;

use crate::error::StorageError;

/// Abstract interface for the few filesystem operations the client needs:
/// relocating downloaded blobs and deleting consumed ones.
pub trait FileSystem: Send + Sync {
    /// Whether a file exists at the path.
    fn exists(&self, path: &Path) -> bool;

    /// Move a file, replacing the destination if present.
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Remove a file. Removing an absent file is not an error.
    fn remove_file(&self, path: &Path) -> Result<(), StorageError>;

    /// Create a directory and its parents.
    fn create_dir_all(&self, path: &Path) -> Result<(), StorageError>;
}

/// Production adapter over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        match std::fs::rename(from, to) {
            Ok(()) => Ok(()),
            // Staging directories can live on another filesystem; fall back
            // to copy + remove when rename cannot cross the boundary.
            Err(_) => {
                std::fs::copy(from, to)?;
                std::fs::remove_file(from)?;
                Ok(())
            }
        }
    }

    fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        Ok(std::fs::create_dir_all(path)?)
    }
}

/// In-memory filesystem for unit tests: a set of "existing" paths plus a
/// record of every move, and a switch to make moves fail.
#[derive(Default)]
pub struct MockFileSystem {
    files: Mutex<HashSet<PathBuf>>,
    moves: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail_moves: AtomicBool,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a file exists.
    pub fn touch(&self, path: impl Into<PathBuf>) {
        self.files.lock().insert(path.into());
    }

    /// Whether the mock currently holds the path.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().contains(path)
    }

    /// Every `(from, to)` move performed so far.
    pub fn moves(&self) -> Vec<(PathBuf, PathBuf)> {
        self.moves.lock().clone()
    }

    /// Make every subsequent move fail.
    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains(path)
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(StorageError::Io(format!("mock move failure: {}", from.display())));
        }
        let mut files = self.files.lock();
        if !files.remove(from) {
            return Err(StorageError::Io(format!("no such file: {}", from.display())));
        }
        files.insert(to.to_path_buf());
        self.moves.lock().push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Blob storage for downloaded key sets.
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    /// Directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Absolute paths of a holder's signature and binary files, if both file
    /// names are known. Says nothing about whether the files exist.
    pub fn blob_paths(&self, holder: &KeySetHolder) -> Option<(PathBuf, PathBuf)> {
        holder
            .file_names()
            .map(|(sig, bin)| (self.path_of(sig), self.path_of(bin)))
    }

    /// Whether both of a holder's files are actually on disk. State alone is
    /// not trusted for selection.
    pub fn has_blobs(&self, holder: &KeySetHolder) -> bool {
        match self.blob_paths(holder) {
            Some((sig, bin)) => self.fs.exists(&sig) && self.fs.exists(&bin),
            None => false,
        }
    }

    /// Move a staged download into permanent storage under the identifier's
    /// canonical names, replacing stale files left from an earlier attempt.
    /// Returns the final `(signature, binary)` file names.
    pub fn adopt_download(
        &self,
        identifier: &str,
        staged_signature: &Path,
        staged_binary: &Path,
    ) -> Result<(String, String), StorageError> {
        self.fs.create_dir_all(&self.root)?;

        let signature_name = format!("{identifier}.sig");
        let binary_name = format!("{identifier}.bin");

        for (staged, name) in [(staged_signature, &signature_name), (staged_binary, &binary_name)] {
            let destination = self.path_of(name);
            if self.fs.exists(&destination) {
                self.fs.remove_file(&destination)?;
            }
            self.fs.move_file(staged, &destination)?;
        }

        Ok((signature_name, binary_name))
    }

    /// Delete a holder's files. Failures are logged and swallowed; a leaked
    /// blob is reclaimed on a later cycle, while a failed pipeline run is not.
    pub fn remove_blobs(&self, holder: &KeySetHolder) {
        let Some((sig, bin)) = self.blob_paths(holder) else {
            return;
        };
        for path in [sig, bin] {
            if let Err(error) = self.fs.remove_file(&path) {
                tracing::warn!(
                    "[en-storage] could not remove blob {}: {}",
                    path.display(),
                    error
                );
            }
        }
    }
}
