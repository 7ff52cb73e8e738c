//! # Typed State Store
//!
//! The store every component actually talks to. Values are serialized as
//! JSON under the typed keys from the shared-types catalog, and all compound
//! read-modify-write sections run under one async mutex: a caller asks for
//! [`StateStore::exclusive`], works on the returned guard, and releases it by
//! dropping it. That single lock is what keeps a concurrent acquisition and
//! detection run from losing each other's updates.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use shared_types::keys::StorageKey;

use crate::error::StorageError;
use crate::kv::{InMemoryKvStore, KeyValueStore};

/// Shared handle to the persistent store. Cheap to clone.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Mutex<Box<dyn KeyValueStore>>>,
}

impl StateStore {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    /// Fresh in-memory store, for tests and the demo runtime.
    pub fn in_memory() -> Self {
        Self::new(InMemoryKvStore::new())
    }

    /// Read one value. Takes the lock only for the duration of the read.
    pub async fn read<T: DeserializeOwned>(
        &self,
        key: StorageKey<T>,
    ) -> Result<Option<T>, StorageError> {
        self.inner.lock().await.as_ref().read_value(key)
    }

    /// Write one value. Takes the lock only for the duration of the write.
    pub async fn write<T: Serialize>(
        &self,
        key: StorageKey<T>,
        value: &T,
    ) -> Result<(), StorageError> {
        self.inner.lock().await.as_mut().write_value(key, value)
    }

    /// Delete one value.
    pub async fn remove<T>(&self, key: StorageKey<T>) -> Result<(), StorageError> {
        self.inner.lock().await.delete(key.name())
    }

    /// Whether anything is stored under the key.
    pub async fn contains<T>(&self, key: StorageKey<T>) -> Result<bool, StorageError> {
        self.inner.lock().await.exists(key.name())
    }

    /// Acquire exclusive access for a compound read-modify-write. The guard
    /// holds the store lock until dropped; every other accessor waits.
    pub async fn exclusive(&self) -> StateGuard<'_> {
        StateGuard {
            guard: self.inner.lock().await,
        }
    }
}

/// Exclusive access to the store. Reads and writes through the guard are one
/// uninterruptible critical section.
pub struct StateGuard<'a> {
    guard: MutexGuard<'a, Box<dyn KeyValueStore>>,
}

impl StateGuard<'_> {
    pub fn read<T: DeserializeOwned>(&self, key: StorageKey<T>) -> Result<Option<T>, StorageError> {
        self.guard.as_ref().read_value(key)
    }

    pub fn write<T: Serialize>(&mut self, key: StorageKey<T>, value: &T) -> Result<(), StorageError> {
        self.guard.as_mut().write_value(key, value)
    }

    pub fn remove<T>(&mut self, key: StorageKey<T>) -> Result<(), StorageError> {
        self.guard.delete(key.name())
    }
}

/// Typed serde_json codec over the byte-level store, shared by both access
/// paths so they can never disagree on encoding.
trait TypedAccess {
    fn read_value<T: DeserializeOwned>(&self, key: StorageKey<T>) -> Result<Option<T>, StorageError>;
}

trait TypedAccessMut {
    fn write_value<T: Serialize>(&mut self, key: StorageKey<T>, value: &T) -> Result<(), StorageError>;
}

impl TypedAccess for dyn KeyValueStore {
    fn read_value<T: DeserializeOwned>(&self, key: StorageKey<T>) -> Result<Option<T>, StorageError> {
        match self.get(key.name())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl TypedAccessMut for dyn KeyValueStore {
    fn write_value<T: Serialize>(&mut self, key: StorageKey<T>, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key.name(), bytes)
    }
}
