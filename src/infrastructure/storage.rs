//! Object storage for attachment content.
//!
//! Objects are addressed by slash-separated keys such as
//! `{owner}/{todo_id}/{file_name}`. Writes never overwrite: putting an
//! existing key fails with [`StorageError::AlreadyExists`].

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

// =============================================================================
// Storage Error
// =============================================================================

/// Errors returned by object storage backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The key is empty, absolute, or climbs out of the storage root.
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage I/O error: {0}")]
    Io(String),
}

// =============================================================================
// Object Storage Trait
// =============================================================================

/// Binary object store.
pub trait ObjectStorage: Send + Sync {
    /// Stores `content` under `key`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the key is taken.
    fn put<'a>(&'a self, key: &'a str, content: Bytes) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Reads an object. Returns `Ok(None)` if the key is absent.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>>;

    /// Removes an object. Returns `Ok(false)` if the key was absent.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>>;

    /// Returns the backend name for logging.
    fn backend_name(&self) -> &'static str;
}

// =============================================================================
// Local Filesystem Storage
// =============================================================================

/// Stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a key to a file below the root, rejecting keys that would leave it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let mut resolved = self.root.clone();
        let mut depth = 0_usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath(key.to_string()));
                }
            }
        }
        if depth == 0 {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(resolved)
    }
}

fn io_error(error: &std::io::Error) -> StorageError {
    StorageError::Io(error.to_string())
}

/// Writes `content` to a freshly created file, removing the file if the write
/// does not complete.
async fn write_or_discard<W>(path: &Path, mut file: W, content: &[u8]) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(content).await {
        Ok(()) => file.flush().await,
        Err(error) => Err(error),
    };
    if let Err(error) = written {
        drop(file);
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                error = %cleanup,
                path = %path.display(),
                "Failed to remove partial object"
            );
        }
        return Err(io_error(&error));
    }
    Ok(())
}

impl ObjectStorage for LocalObjectStorage {
    fn put<'a>(&'a self, key: &'a str, content: Bytes) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let path = self.resolve(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|error| io_error(&error))?;
            }
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map_err(|error| match error.kind() {
                    ErrorKind::AlreadyExists => StorageError::AlreadyExists(key.to_string()),
                    _ => io_error(&error),
                })?;
            write_or_discard(&path, file, &content).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>> {
        Box::pin(async move {
            let path = self.resolve(key)?;
            match tokio::fs::read(&path).await {
                Ok(content) => Ok(Some(Bytes::from(content))),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
                Err(error) => Err(io_error(&error)),
            }
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            let path = self.resolve(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
                Err(error) => Err(io_error(&error)),
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

// =============================================================================
// In-Memory Storage
// =============================================================================

/// Keeps objects in a shared map. Used for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStorage {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl InMemoryObjectStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|part| !part.is_empty() && part != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(key.to_string()))
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn put<'a>(&'a self, key: &'a str, content: Bytes) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            let mut guard = self.objects.write().await;
            if guard.contains_key(key) {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            guard.insert(key.to_string(), content);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            Ok(self.objects.read().await.get(key).cloned())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            Ok(self.objects.write().await.remove(key).is_some())
        })
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // -------------------------------------------------------------------------
    // LocalObjectStorage
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_local_storage_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(directory.path());

        storage
            .put("owner/1/notes.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert!(directory.path().join("owner/1/notes.txt").exists());
        assert_eq!(
            storage.get("owner/1/notes.txt").await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert!(storage.remove("owner/1/notes.txt").await.unwrap());
        assert!(!storage.remove("owner/1/notes.txt").await.unwrap());
        assert_eq!(storage.get("owner/1/notes.txt").await.unwrap(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_local_storage_does_not_overwrite() {
        let directory = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(directory.path());
        storage.put("a/b.txt", Bytes::from_static(b"first")).await.unwrap();

        let result = storage.put("a/b.txt", Bytes::from_static(b"second")).await;

        assert_eq!(result, Err(StorageError::AlreadyExists("a/b.txt".to_string())));
        assert_eq!(
            storage.get("a/b.txt").await.unwrap(),
            Some(Bytes::from_static(b"first"))
        );
    }

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
            _: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("disk full")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_object() {
        let directory = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(directory.path());
        let path = directory.path().join("a/b.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"par").unwrap();

        let result = write_or_discard(&path, FailingWriter, b"partial").await;

        assert_eq!(result, Err(StorageError::Io("disk full".to_string())));
        assert!(!path.exists());
        storage.put("a/b.txt", Bytes::from_static(b"whole")).await.unwrap();
        assert_eq!(
            storage.get("a/b.txt").await.unwrap(),
            Some(Bytes::from_static(b"whole"))
        );
    }

    #[rstest]
    #[case("../escape.txt")]
    #[case("/etc/passwd")]
    #[case("a/../../b")]
    #[case("")]
    #[tokio::test]
    async fn test_local_storage_rejects_escaping_keys(#[case] key: &str) {
        let directory = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(directory.path());

        let result = storage.put(key, Bytes::from_static(b"x")).await;

        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    // -------------------------------------------------------------------------
    // InMemoryObjectStorage
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_in_memory_storage_round_trip() {
        let storage = InMemoryObjectStorage::new();

        storage.put("o/1/f.bin", Bytes::from_static(b"\x00\x01")).await.unwrap();
        let duplicate = storage.put("o/1/f.bin", Bytes::new()).await;

        assert!(matches!(duplicate, Err(StorageError::AlreadyExists(_))));
        assert_eq!(storage.len().await, 1);
        assert!(storage.remove("o/1/f.bin").await.unwrap());
        assert!(storage.is_empty().await);
    }

    #[rstest]
    #[case("../x")]
    #[case("/x")]
    #[case("a//b")]
    #[tokio::test]
    async fn test_in_memory_storage_rejects_invalid_keys(#[case] key: &str) {
        let storage = InMemoryObjectStorage::new();
        assert!(matches!(
            storage.get(key).await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
