//! Abstract secret cache trait.
//!
//! A [`SecretCache`] stores short strings under string keys with a TTL.
//! Expiry is the store's job; callers never sweep.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Failure modes of a cache call.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No live value is stored under the key.
    #[error("cache key not found: {key}")]
    NotFound { key: String },

    /// The cache could not be reached or answered with an error.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Async key-value contract with per-key TTL.
///
/// Per-key operations must be atomic; concurrent `set` calls on the same
/// key resolve as last-writer-wins.
pub trait SecretCache: Send + Sync + 'static {
    /// Store `value` under `key`, replacing any previous value and TTL.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = CacheResult<()>> + Send + '_>>;

    /// Fetch the live value under `key`.
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = CacheResult<String>> + Send + '_>>;

    /// Remove `key`.  Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = CacheResult<()>> + Send + '_>>;
}
