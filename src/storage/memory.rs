//! In-memory object store.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>`.  Used by the
//! test suite and for local demos where no bucket is available.
//!
//! Every reader handed out is counted until its stream is dropped, which
//! lets tests assert that handles are released on all paths.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use super::backend::{
    ObjectMetadata, ObjectReader, ObjectStore, StorageError, StorageResult,
};

/// Chunk size used when streaming stored bytes.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    /// path -> object.
    objects: tokio::sync::RwLock<HashMap<String, MemoryObject>>,
    /// Readers handed out and not yet dropped.
    open_readers: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) an object.
    pub async fn insert(&self, path: &str, content_type: &str, data: impl Into<Bytes>) {
        let object = MemoryObject {
            data: data.into(),
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        self.objects.write().await.insert(path.to_string(), object);
    }

    /// Remove an object, returning whether it existed.
    pub async fn remove(&self, path: &str) -> bool {
        self.objects.write().await.remove(path).is_some()
    }

    /// Number of readers whose streams are still alive.
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }
}

/// Stream wrapper that decrements the open-reader count when dropped.
struct TrackedStream<S> {
    inner: S,
    open: Arc<AtomicUsize>,
}

impl<S> TrackedStream<S> {
    fn new(inner: S, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { inner, open }
    }
}

impl<S> Drop for TrackedStream<S> {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: Stream + Unpin> Stream for TrackedStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Split `data` into cheap `Bytes` slices of at most [`CHUNK_SIZE`].
fn chunks(data: Bytes) -> Vec<std::io::Result<Bytes>> {
    let mut out = Vec::with_capacity(data.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        out.push(Ok(data.slice(offset..end)));
        offset = end;
    }
    out
}

impl ObjectStore for MemoryObjectStore {
    fn head_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectMetadata>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            let object = objects
                .get(&key)
                .ok_or_else(|| StorageError::NotFound { key: key.clone() })?;
            Ok(ObjectMetadata {
                content_type: object.content_type.clone(),
                size: Some(object.data.len() as u64),
                last_modified: Some(object.last_modified),
            })
        })
    }

    fn get_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectReader>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let object = self
                .objects
                .read()
                .await
                .get(&key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound { key: key.clone() })?;

            let size = Some(object.data.len() as u64);
            let body = TrackedStream::new(
                stream::iter(chunks(object.data)),
                Arc::clone(&self.open_readers),
            );
            Ok(ObjectReader::new(object.content_type, size, body.boxed()))
        })
    }
}
