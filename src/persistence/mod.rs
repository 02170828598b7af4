//! Persistence for keep-alive registries
//!
//! Each world stores its whole registry under one key. The stored blob is a
//! tagged record tree wrapped in a checksummed header, and it is always
//! written whole: a failed write leaves the previous blob in place.

pub mod error;
pub mod region_serializer;
pub mod store;
pub mod tag;

pub use error::{atomic_write, corrupted_data, version_mismatch, PersistenceErrorContext};
pub use region_serializer::{RegionSerializer, FORMAT_VERSION};
pub use store::{DurableStore, FileStore, MemoryStore};
pub use tag::{CompoundTag, Tag};

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur during persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    IoError(std::io::Error),
    SerializationError(String),
    DeserializationError(String),
    VersionMismatch { expected: u32, found: u32 },
    CorruptedData(String),
    MissingField(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(e) => write!(f, "IO error: {}", e),
            PersistenceError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            PersistenceError::DeserializationError(e) => write!(f, "Deserialization error: {}", e),
            PersistenceError::VersionMismatch { expected, found } => {
                write!(f, "Version mismatch: expected {}, found {}", expected, found)
            }
            PersistenceError::CorruptedData(e) => write!(f, "Corrupted data: {}", e),
            PersistenceError::MissingField(e) => write!(f, "Missing field: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::IoError(err)
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(err: bincode::Error) -> Self {
        PersistenceError::SerializationError(err.to_string())
    }
}
