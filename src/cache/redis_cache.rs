//! Redis secret cache.
//!
//! Values are written with `SET key value PX <ttl-ms>`, so expiry is
//! enforced by Redis itself.  A [`ConnectionManager`] keeps one
//! multiplexed connection and reconnects transparently.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use redis::aio::ConnectionManager;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{CacheError, CacheResult, SecretCache};
use crate::config::RedisConfig;

/// [`SecretCache`] backed by Redis.
pub struct RedisSecretCache {
    conn: ConnectionManager,
}

impl RedisSecretCache {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = connection_url(config);
        let client = redis::Client::open(url.as_str())
            .map_err(|e| anyhow::anyhow!("invalid redis address '{}': {e}", config.addr))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to redis at {}: {e}", config.addr))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("redis PING failed: {e}"))?;
        debug!("redis PING -> {}", pong);

        info!(
            "Redis secret cache connected: addr={} db={} tls={}",
            config.addr, config.db, config.tls_enabled
        );
        Ok(Self { conn })
    }

    /// Map a Redis error to an anyhow error with context.
    fn map_redis_error(context: &str, err: redis::RedisError) -> CacheError {
        CacheError::Backend(anyhow::anyhow!("redis {context}: {err}"))
    }
}

/// Build a `redis://` (or `rediss://` with TLS) URL from config.
fn connection_url(config: &RedisConfig) -> String {
    let scheme = if config.tls_enabled { "rediss" } else { "redis" };
    let auth = if config.password.is_empty() {
        String::new()
    } else {
        format!(
            ":{}@",
            utf8_percent_encode(&config.password, NON_ALPHANUMERIC)
        )
    };
    format!("{scheme}://{auth}{}/{}", config.addr, config.db)
}

/// Redis `PX` takes whole milliseconds and rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl SecretCache for RedisSecretCache {
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| Self::map_redis_error("SET", e))
        })
    }

    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = CacheResult<String>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::map_redis_error("GET", e))?;
            value.ok_or(CacheError::NotFound { key })
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = CacheResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| Self::map_redis_error("DEL", e))
        })
    }
}
