//! Secret cache adapters.
//!
//! The [`backend::SecretCache`] trait stores per-object share secrets with
//! a TTL.  Implementations: Redis and an in-memory map.

pub mod backend;
pub mod memory;
pub mod redis_cache;

use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;
use crate::config::CacheConfig;
use backend::SecretCache;

/// Build the secret cache selected by `config.backend`.
pub async fn connect(
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn SecretCache>> {
    match config.backend.as_str() {
        "redis" => Ok(Arc::new(redis_cache::RedisSecretCache::connect(&config.redis).await?)),
        "memory" => {
            warn!("Using in-memory secret cache; shares are lost on exit");
            Ok(Arc::new(memory::MemorySecretCache::new(clock)))
        }
        other => anyhow::bail!("unknown cache.backend '{other}' (expected redis or memory)"),
    }
}
