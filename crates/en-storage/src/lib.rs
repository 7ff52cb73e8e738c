//! # Storage Crate
//!
//! Persistence for the exposure-notification client:
//!
//! - [`kv`]: the raw [`kv::KeyValueStore`] port with in-memory and
//!   file-backed adapters.
//! - [`state`]: the typed [`state::StateStore`] every component goes through,
//!   including the exclusive-access guard that serializes compound
//!   read-modify-write sections process-wide.
//! - [`blob`]: the [`blob::BlobStore`] for downloaded key set files and the
//!   [`blob::FileSystem`] port it drives.

pub mod blob;
pub mod error;
pub mod kv;
pub mod state;

pub use blob::{BlobStore, FileSystem, MockFileSystem, StdFileSystem};
pub use error::StorageError;
pub use kv::{FileBackedKvStore, InMemoryKvStore, KeyValueStore};
pub use state::{StateGuard, StateStore};
