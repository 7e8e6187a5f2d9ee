//! In-memory secret cache.
//!
//! Entries live in a `tokio::sync::RwLock<HashMap<...>>` together with
//! their deadline.  Expired entries are treated as absent on read and
//! removed lazily.  The deadline is computed from an injected [`Clock`],
//! so tests can move time forward deterministically.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::backend::{CacheError, CacheResult, SecretCache};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory [`SecretCache`] with TTL.
pub struct MemorySecretCache {
    entries: tokio::sync::RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySecretCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemorySecretCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: tokio::sync::RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, live or not yet collected.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl SecretCache for MemorySecretCache {
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let ttl = TimeDelta::from_std(ttl)
                .map_err(|e| CacheError::Backend(anyhow::anyhow!("ttl out of range: {e}")))?;
            let expires_at = self.clock.now() + ttl;
            self.entries
                .write()
                .await
                .insert(key, Entry { value, expires_at });
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = CacheResult<String>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let now = self.clock.now();
            {
                let entries = self.entries.read().await;
                match entries.get(&key) {
                    Some(entry) if now < entry.expires_at => return Ok(entry.value.clone()),
                    Some(_) => {}
                    None => return Err(CacheError::NotFound { key }),
                }
            }
            // Expired: collect it, unless a concurrent set refreshed it.
            let mut entries = self.entries.write().await;
            match entries.get(&key) {
                Some(entry) if now < entry.expires_at => Ok(entry.value.clone()),
                _ => {
                    entries.remove(&key);
                    Err(CacheError::NotFound { key })
                }
            }
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.entries.write().await.remove(&key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn cache_at_fixed_time() -> (Arc<FixedClock>, MemorySecretCache) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 9, 13, 12, 0, 0).unwrap(),
        ));
        let cache = MemorySecretCache::new(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_clock, cache) = cache_at_fixed_time();
        cache
            .set("image-auth:a.jpg", "s1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("image-auth:a.jpg").await.unwrap(), "s1");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_clock, cache) = cache_at_fixed_time();
        let err = cache.get("image-auth:nope").await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { key } if key == "image-auth:nope"));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (clock, cache) = cache_at_fixed_time();
        cache.set("k", "v", Duration::from_secs(10)).await.unwrap();

        clock.advance(TimeDelta::seconds(9));
        assert_eq!(cache.get("k").await.unwrap(), "v");

        clock.advance(TimeDelta::seconds(1));
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::NotFound { .. })
        ));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let (clock, cache) = cache_at_fixed_time();
        cache.set("k", "old", Duration::from_secs(5)).await.unwrap();
        cache.set("k", "new", Duration::from_secs(60)).await.unwrap();

        clock.advance(TimeDelta::seconds(30));
        assert_eq!(cache.get("k").await.unwrap(), "new");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_clock, cache) = cache_at_fixed_time();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.is_err());
    }
}
