//! # Storage Errors

use thiserror::Error;

use shared_types::errors::ExposureError;

/// Failures of the persistence layer. Callers outside this crate map these
/// to the domain taxonomy's internal-error kind.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A value could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The underlying file or directory operation failed.
    #[error("io failure: {0}")]
    Io(String),

    /// The on-disk store file is not in a shape this build understands.
    #[error("store file corrupt: {0}")]
    CorruptStore(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        StorageError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(error: bincode::Error) -> Self {
        StorageError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        StorageError::Io(error.to_string())
    }
}

impl From<StorageError> for ExposureError {
    fn from(error: StorageError) -> Self {
        ExposureError::internal(error.to_string())
    }
}
