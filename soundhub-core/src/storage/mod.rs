use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

mod range;
pub use range::*;

/// A stream of file contents
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;
pub type ArcedStorage = Arc<dyn Storage>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("{0} is not a valid storage path")]
    InvalidPath(String),
    #[error("Range is not satisfiable for a file of {length} bytes")]
    RangeNotSatisfiable { length: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The contents of a stored file, or a part of it
pub struct StoredBytes {
    pub stream: ByteStream,
    /// The length of the whole file
    pub length: u64,
    /// The part of the file being read, if a range was requested
    pub range: Option<ResolvedRange>,
}

impl StoredBytes {
    /// How many bytes the stream will yield
    pub fn content_length(&self) -> u64 {
        self.range.map(|r| r.len()).unwrap_or(self.length)
    }
}

/// Represents a binary object store addressed by relative paths.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
    /// Writes a file, replacing anything already stored at the path
    async fn write(&self, path: &str, content: Bytes) -> Result<(), StorageError>;
    /// Deletes a file, returning false if there was nothing to delete
    async fn delete(&self, path: &str) -> Result<bool, StorageError>;
    async fn read(&self, path: &str, range: Option<ByteRange>)
        -> Result<StoredBytes, StorageError>;
}

/// Ensures a path is relative and stays inside the storage root
pub fn check_path(path: &str) -> Result<(), StorageError> {
    let is_valid = !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.contains('\0')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if is_valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}
