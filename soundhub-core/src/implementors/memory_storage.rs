use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use parking_lot::Mutex;

use crate::{check_path, ByteRange, Storage, StorageError, StoredBytes};

/// A storage that keeps every file in memory.
/// Useful in tests, and anywhere files don't need to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the contents of a file, if it exists
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.files.lock().get(path).cloned()
    }

    /// Returns every stored path, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        check_path(path)?;
        Ok(self.files.lock().contains_key(path))
    }

    async fn write(&self, path: &str, content: Bytes) -> Result<(), StorageError> {
        check_path(path)?;
        self.files.lock().insert(path.to_string(), content);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool, StorageError> {
        check_path(path)?;
        Ok(self.files.lock().remove(path).is_some())
    }

    async fn read(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> Result<StoredBytes, StorageError> {
        check_path(path)?;

        let content = self
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;

        let length = content.len() as u64;
        let range = range.map(|r| r.resolve(length)).transpose()?;

        let slice = match range {
            Some(r) => content.slice(r.start as usize..=r.end as usize),
            None => content,
        };

        Ok(StoredBytes {
            stream: stream::once(future::ready(Ok(slice))).boxed(),
            length,
            range,
        })
    }
}

#[cfg(test)]
mod test {
    use futures_util::TryStreamExt;

    use super::*;

    async fn collect(stored: StoredBytes) -> Vec<u8> {
        let chunks: Vec<Bytes> = stored.stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn write_read_delete() {
        let storage = MemoryStorage::new();
        storage
            .write("a/b.mp3", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        assert!(storage.exists("a/b.mp3").await.unwrap());

        let full = storage.read("a/b.mp3", None).await.unwrap();
        assert_eq!(full.content_length(), 10);
        assert_eq!(collect(full).await, b"0123456789");

        let part = storage
            .read("a/b.mp3", Some(ByteRange::Bounded { start: 2, end: 4 }))
            .await
            .unwrap();
        assert_eq!(part.content_length(), 3);
        assert_eq!(collect(part).await, b"234");

        assert!(storage.delete("a/b.mp3").await.unwrap());
        assert!(!storage.delete("a/b.mp3").await.unwrap());
        assert!(matches!(
            storage.read("a/b.mp3", None).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_invalid_paths() {
        let storage = MemoryStorage::new();

        assert!(matches!(
            storage.write("../x", Bytes::new()).await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
