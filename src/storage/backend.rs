//! Abstract object store trait.
//!
//! Every object store must implement [`ObjectStore`].  Reads are exposed
//! as a metadata lookup plus an incremental byte stream, so callers never
//! hold a full object in memory.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Default content type when the backend does not report one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Failure modes of an object store call.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object exists at the requested key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The backend could not be reached or answered with an error.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata for a stored object, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: String,
    /// Length in bytes, `None` when the backend does not report it.
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A single-use handle over an object's bytes.
///
/// The handle owns the backend stream.  Dropping it (or the stream
/// returned by [`ObjectReader::into_stream`]) releases the underlying
/// connection or file descriptor.
pub struct ObjectReader {
    content_type: String,
    size: Option<u64>,
    body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl ObjectReader {
    pub fn new(
        content_type: impl Into<String>,
        size: Option<u64>,
        body: BoxStream<'static, std::io::Result<Bytes>>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            size,
            body,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Length in bytes, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Consume the handle, yielding the byte stream.
    pub fn into_stream(self) -> BoxStream<'static, std::io::Result<Bytes>> {
        self.body
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Async read-only object store contract.
///
/// Implementations do not retry; a failed call is reported to the caller
/// immediately.
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch metadata for the object at `key`.
    fn head_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectMetadata>> + Send + '_>>;

    /// Open a streaming reader over the object at `key`.
    fn get_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectReader>> + Send + '_>>;
}
