//! Share authorization engine.
//!
//! [`ShareService`] mints share links, validates presented secrets, and
//! hands out object readers.  It holds no mutable state of its own: the
//! path -> secret mapping lives in the [`SecretCache`], and the objects in
//! the [`ObjectStore`].
//!
//! Path safety is checked before either adapter is touched, and the
//! canonical spelling of a path is what gets cached and fetched, so two
//! spellings of the same object cannot hold different secrets.

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::cache::backend::{CacheError, SecretCache};
use crate::clock::Clock;
use crate::errors::ShareError;
use crate::link;
use crate::storage::backend::{ObjectMetadata, ObjectReader, ObjectStore, StorageError};

/// Namespace prefix for share secrets in the cache.
pub const CACHE_KEY_PREFIX: &str = "image-auth:";

/// Bytes of randomness in a minted secret (hex-encoded to twice as many chars).
const SECRET_BYTES: usize = 16;

/// Engine settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Public base URL links are built from.
    pub base_url: String,
    /// Longest lifetime a share may be minted with (`None` = no cap).
    pub max_age: Option<TimeDelta>,
}

impl ShareConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        let days = config.share.max_age_days;
        Self {
            base_url: config.server.base_url.clone(),
            max_age: (days > 0).then(|| TimeDelta::days(i64::from(days))),
        }
    }
}

/// A request to mint a share link.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub object_path: String,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

/// A minted share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub max_age: Duration,
}

/// An object path that passed the safety check, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Canonicalize and validate a user-supplied path.
    ///
    /// Rejects a leading `/`, any `..` segment, and paths that collapse to
    /// nothing.  `.` segments and repeated separators are removed.
    pub fn parse(raw: &str) -> Result<Self, ShareError> {
        let invalid = || ShareError::InvalidPath {
            path: raw.to_string(),
        };
        if raw.starts_with('/') {
            return Err(invalid());
        }
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(invalid()),
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(invalid());
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The cache key holding this path's secret.
    pub fn cache_key(&self) -> String {
        format!("{CACHE_KEY_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a random share secret from the OS-seeded CSPRNG.
pub fn mint_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Exact string equality without an early exit on the first mismatch.
fn secrets_match(stored: &str, presented: &str) -> bool {
    stored.len() == presented.len() && bool::from(stored.as_bytes().ct_eq(presented.as_bytes()))
}

fn storage_error(path: &ObjectPath, err: StorageError) -> ShareError {
    match err {
        StorageError::NotFound { .. } => ShareError::NotFound {
            path: path.to_string(),
        },
        StorageError::Backend(cause) => ShareError::ObjectFetchFailed(cause),
    }
}

/// The share authorization engine.
pub struct ShareService {
    storage: Arc<dyn ObjectStore>,
    cache: Arc<dyn SecretCache>,
    clock: Arc<dyn Clock>,
    config: ShareConfig,
}

impl ShareService {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        cache: Arc<dyn SecretCache>,
        clock: Arc<dyn Clock>,
        config: ShareConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            clock,
            config,
        }
    }

    /// Current time according to the engine's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    /// Mint a share link for an existing object.
    ///
    /// Overwrites any secret previously stored for the same path.
    pub async fn create_share(&self, req: &ShareRequest) -> Result<ShareResponse, ShareError> {
        let path = ObjectPath::parse(&req.object_path)?;
        if req.secret.is_empty() {
            return Err(ShareError::InvalidRequest {
                message: "secret is required".to_string(),
            });
        }
        // Clients normalize these segments away, so the link would never match.
        if req.secret == "." || req.secret == ".." {
            return Err(ShareError::InvalidRequest {
                message: "secret must not be \".\" or \"..\"".to_string(),
            });
        }

        self.storage
            .head_object(path.as_str())
            .await
            .map_err(|e| storage_error(&path, e))?;

        let max_age = req.expires_at - self.clock.now();
        if max_age <= TimeDelta::zero() {
            return Err(ShareError::InvalidExpiry {
                message: "expiration time must be in the future".to_string(),
            });
        }
        if let Some(limit) = self.config.max_age {
            if max_age > limit {
                return Err(ShareError::InvalidExpiry {
                    message: format!(
                        "expiration exceeds the maximum of {} days",
                        limit.num_days()
                    ),
                });
            }
        }
        let ttl = max_age.to_std().map_err(|e| ShareError::InvalidExpiry {
            message: format!("expiration out of range: {e}"),
        })?;

        self.cache
            .set(&path.cache_key(), &req.secret, ttl)
            .await
            .map_err(|e| ShareError::CacheWriteFailed(e.into()))?;

        let url = link::build_url(&self.config.base_url, &req.expires_at, &req.secret, path.as_str());
        info!(path = %path, expires_at = %req.expires_at, ttl_secs = ttl.as_secs(), "share created");

        Ok(ShareResponse {
            url,
            expires_at: req.expires_at,
            max_age: ttl,
        })
    }

    /// Check a presented secret against the one stored for `object_path`.
    ///
    /// An unknown path and a wrong secret both yield `Unauthorized`.
    pub async fn validate_share(&self, object_path: &str, secret: &str) -> Result<(), ShareError> {
        let path = ObjectPath::parse(object_path)?;

        let stored = match self.cache.get(&path.cache_key()).await {
            Ok(stored) => stored,
            Err(CacheError::NotFound { .. }) => {
                debug!(path = %path, "no share secret stored");
                return Err(ShareError::Unauthorized);
            }
            Err(CacheError::Backend(cause)) => return Err(ShareError::CacheReadFailed(cause)),
        };

        if !secrets_match(&stored, secret) {
            warn!(path = %path, "share secret mismatch");
            return Err(ShareError::Unauthorized);
        }
        Ok(())
    }

    /// Open a reader over the object at `object_path`.
    ///
    /// Performs no authorization; call [`ShareService::validate_share`]
    /// first.
    pub async fn get_object(&self, object_path: &str) -> Result<ObjectReader, ShareError> {
        let path = ObjectPath::parse(object_path)?;
        self.storage
            .get_object(path.as_str())
            .await
            .map_err(|e| storage_error(&path, e))
    }

    /// Look up an object's metadata without opening it.  Used for `HEAD`.
    pub async fn object_metadata(&self, object_path: &str) -> Result<ObjectMetadata, ShareError> {
        let path = ObjectPath::parse(object_path)?;
        self.storage
            .head_object(path.as_str())
            .await
            .map_err(|e| storage_error(&path, e))
    }

    /// Delete the secret stored for `object_path`, revoking its link.
    pub async fn revoke_share(&self, object_path: &str) -> Result<(), ShareError> {
        let path = ObjectPath::parse(object_path)?;
        self.cache
            .delete(&path.cache_key())
            .await
            .map_err(|e| ShareError::CacheWriteFailed(e.into()))?;
        info!(path = %path, "share revoked");
        Ok(())
    }
}
