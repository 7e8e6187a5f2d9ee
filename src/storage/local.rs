//! Local filesystem object store.
//!
//! Serves files under a configurable root directory.  The object path is
//! used directly as a relative path (e.g., "images/photo.jpg").  Content
//! types are guessed from the file extension.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio_util::io::ReaderStream;

use super::backend::{
    ObjectMetadata, ObjectReader, ObjectStore, StorageError, StorageResult,
};

/// Serves objects from the local filesystem.
pub struct LocalObjectStore {
    /// Root directory for all objects.
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a new `LocalObjectStore` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve an object path to a file path under the root.
    ///
    /// Rejects absolute paths and any `..` component, then checks that an
    /// existing target still canonicalizes inside the root (symlinks).
    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(StorageError::Backend(anyhow::anyhow!(
                        "Path traversal detected in object path: {key}"
                    )))
                }
            }
        }
        let path = self.root.join(key);
        if path.exists() {
            let canonical_root = self
                .root
                .canonicalize()
                .map_err(|e| StorageError::Backend(e.into()))?;
            let canonical_path = path
                .canonicalize()
                .map_err(|e| StorageError::Backend(e.into()))?;
            if !canonical_path.starts_with(&canonical_root) {
                return Err(StorageError::Backend(anyhow::anyhow!(
                    "Path traversal detected in object path: {key}"
                )));
            }
        }
        Ok(path)
    }

    fn content_type(path: &Path) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    /// Stat `path`, mapping missing files and directories to `NotFound`.
    async fn stat(key: &str, path: &Path) -> StorageResult<std::fs::Metadata> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Backend(
                anyhow::Error::new(e).context(format!("stat {}", path.display())),
            )),
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn head_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectMetadata>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            let meta = Self::stat(&key, &path).await?;
            let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
            Ok(ObjectMetadata {
                content_type: Self::content_type(&path),
                size: Some(meta.len()),
                last_modified,
            })
        })
    }

    fn get_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectReader>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            let meta = Self::stat(&key, &path).await?;
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound { key: key.clone() }
                } else {
                    StorageError::Backend(
                        anyhow::Error::new(e).context(format!("open {}", path.display())),
                    )
                }
            })?;
            Ok(ObjectReader::new(
                Self::content_type(&path),
                Some(meta.len()),
                ReaderStream::new(file).boxed(),
            ))
        })
    }
}
