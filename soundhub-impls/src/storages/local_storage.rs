use std::{
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use log::debug;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

use soundhub_core::{check_path, ByteRange, Storage, StorageError, StoredBytes};

/// Implements [Storage] on top of a directory in the local filesystem
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        check_path(path)?;
        Ok(self.root.join(path))
    }
}

/// Where a file is written before it is moved into place
fn partial_path(full_path: &Path) -> PathBuf {
    let mut partial = full_path.as_os_str().to_owned();
    partial.push(".partial");
    partial.into()
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full_path = self.resolve(path)?;

        match fs::metadata(&full_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, content: Bytes) -> Result<(), StorageError> {
        let full_path = self.resolve(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write next to the target first, so readers never see a partial file
        let partial_path = partial_path(&full_path);
        let written = match fs::write(&partial_path, &content).await {
            Ok(()) => fs::rename(&partial_path, &full_path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            fs::remove_file(&partial_path).await.ok();
            return Err(e.into());
        }

        debug!("Stored {} ({} bytes)", path, content.len());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool, StorageError> {
        let full_path = self.resolve(path)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!("Deleted {}", path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> Result<StoredBytes, StorageError> {
        let full_path = self.resolve(path)?;

        let mut file = File::open(&full_path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => e.into(),
        })?;

        let length = file.metadata().await?.len();
        let range = range.map(|r| r.resolve(length)).transpose()?;

        let stream = match range {
            Some(r) => {
                file.seek(SeekFrom::Start(r.start)).await?;
                ReaderStream::new(file.take(r.len())).boxed()
            }
            None => ReaderStream::new(file).boxed(),
        };

        Ok(StoredBytes {
            stream,
            length,
            range,
        })
    }
}

#[cfg(test)]
mod test {
    use futures_util::TryStreamExt;
    use tempfile::TempDir;

    use super::*;

    async fn read_all(storage: &LocalStorage, path: &str, range: Option<ByteRange>) -> Vec<u8> {
        let stored = storage.read(path, range).await.unwrap();
        let chunks: Vec<Bytes> = stored.stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn writes_into_nested_directories() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage
            .write("track/bob/bob-Intro.mp3", Bytes::from_static(b"ID3 audio"))
            .await
            .unwrap();

        assert!(dir.path().join("track/bob/bob-Intro.mp3").is_file());
        assert!(!dir.path().join("track/bob/bob-Intro.partial").exists());
        assert!(storage.exists("track/bob/bob-Intro.mp3").await.unwrap());
        assert!(!storage.exists("track/bob").await.unwrap());
    }

    #[test]
    fn partial_files_keep_the_extension() {
        assert_ne!(
            partial_path(Path::new("album/bob/Winter.png")),
            partial_path(Path::new("album/bob/Winter.jpg"))
        );
        assert_eq!(
            partial_path(Path::new("album/bob/Winter.png")),
            Path::new("album/bob/Winter.png.partial")
        );
    }

    #[tokio::test]
    async fn failed_writes_leave_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        // A directory in the way makes the final rename fail
        std::fs::create_dir_all(dir.path().join("album/bob/Winter.png/taken")).unwrap();

        let result = storage
            .write("album/bob/Winter.png", Bytes::from_static(b"png"))
            .await;

        assert!(result.is_err());
        assert!(!dir.path().join("album/bob/Winter.png.partial").exists());
    }

    #[tokio::test]
    async fn reads_whole_files_and_ranges() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage
            .write("a.mp3", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        assert_eq!(read_all(&storage, "a.mp3", None).await, b"0123456789");
        assert_eq!(
            read_all(&storage, "a.mp3", Some(ByteRange::From(7))).await,
            b"789"
        );
        assert_eq!(
            read_all(&storage, "a.mp3", Some(ByteRange::Suffix(2))).await,
            b"89"
        );

        assert!(matches!(
            storage.read("a.mp3", Some(ByteRange::From(10))).await,
            Err(StorageError::RangeNotSatisfiable { length: 10 })
        ));
    }

    #[tokio::test]
    async fn deleting_missing_files_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(!storage.delete("nothing/here.png").await.unwrap());

        storage
            .write("x.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(storage.delete("x.png").await.unwrap());
        assert!(!storage.exists("x.png").await.unwrap());
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(matches!(
            storage.read("gone.mp3", None).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
