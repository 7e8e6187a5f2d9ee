//! Configuration loading and types for s3share.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then environment variables are layered on top
//! (see [`Config::apply_env_overrides`]).  Each subsection governs a
//! different part of the system: networking, the object store, the secret
//! cache, share policy, logging, and observability.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Object store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Secret cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Share link policy.
    #[serde(default)]
    pub share: ShareSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + OpenAPI document).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL that share links are built from (no trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds, up to the response headers.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `aws`, `local`, `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// AWS S3 configuration.
    #[serde(default)]
    pub aws: AwsStorageConfig,

    /// Local filesystem configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            aws: AwsStorageConfig::default(),
            local: LocalStorageConfig::default(),
        }
    }
}

/// AWS S3 configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// S3 bucket holding the shared objects.
    #[serde(default)]
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix in the bucket.
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

impl Default for AwsStorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            prefix: String::new(),
            endpoint_url: String::new(),
            use_path_style: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory that object paths are resolved against.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// Secret cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Backend type: `redis` or `memory`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Redis connection settings.
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis: RedisConfig::default(),
        }
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// `host:port`.
    #[serde(default = "default_redis_addr")]
    pub addr: String,
    #[serde(default)]
    pub password: String,
    /// Logical database index.
    #[serde(default)]
    pub db: i64,
    /// Connect with `rediss://`.
    #[serde(default)]
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: default_redis_addr(),
            password: String::new(),
            db: 0,
            tls_enabled: false,
        }
    }
}

/// Share link policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ShareSettings {
    /// Longest lifetime a share may be minted with, in days (0 = no cap).
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Lifetime used when a create request omits `expires_at`, in hours.
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u32,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            default_ttl_hours: default_ttl_hours(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls the Prometheus `/metrics` endpoint and the `/openapi.json`
/// document.  Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Serve the OpenAPI document at `/openapi.json`.
    #[serde(default = "default_true")]
    pub openapi: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            openapi: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_storage_backend() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_cache_backend() -> String {
    "redis".to_string()
}

fn default_redis_addr() -> String {
    "localhost:6379".to_string()
}

fn default_max_age_days() -> u32 {
    90
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Environment overrides ---------------------------------------------------

/// Parse a duration such as `30s`, `2m`, `1h`, `500ms`, or bare seconds.
pub fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration '{value}'"))?;
    let duration = match unit {
        "" | "s" => Duration::from_secs(n),
        "ms" => Duration::from_millis(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        _ => anyhow::bail!("invalid duration unit in '{value}'"),
    };
    Ok(duration)
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => anyhow::bail!("{key}: expected a boolean, got '{value}'"),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key}: expected a number, got '{value}'"))
}

impl Config {
    /// Layer environment variables over the loaded values.
    ///
    /// `lookup` returns the value of a variable, or `None` when unset.
    /// Empty values are treated as unset.  Pass `|k| std::env::var(k).ok()`
    /// in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("PORT") {
            self.server.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = get("BASE_URL") {
            self.server.base_url = v;
        }
        if let Some(v) = get("REQUEST_TIMEOUT") {
            self.server.request_timeout = parse_duration(&v)?.as_secs().max(1);
        }
        if let Some(v) = get("SHUTDOWN_TIMEOUT") {
            self.server.shutdown_timeout = parse_duration(&v)?.as_secs();
        }
        if let Some(v) = get("STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some(v) = get("AWS_REGION") {
            self.storage.aws.region = v;
        }
        if let Some(v) = get("S3_BUCKET") {
            self.storage.aws.bucket = v;
        }
        if let Some(v) = get("S3_PREFIX") {
            self.storage.aws.prefix = v;
        }
        if let Some(v) = get("S3_ENDPOINT_URL") {
            self.storage.aws.endpoint_url = v;
        }
        if let Some(v) = get("CACHE_BACKEND") {
            self.cache.backend = v;
        }
        if let Some(v) = get("REDIS_ADDR") {
            self.cache.redis.addr = v;
        }
        if let Some(v) = get("REDIS_PASSWORD") {
            self.cache.redis.password = v;
        }
        if let Some(v) = get("REDIS_DB") {
            self.cache.redis.db = parse_number("REDIS_DB", &v)?;
        }
        if let Some(v) = get("REDIS_TLS_ENABLED") {
            self.cache.redis.tls_enabled = parse_bool("REDIS_TLS_ENABLED", &v)?;
        }
        if let Some(v) = get("MAX_AGE_DAYS") {
            self.share.max_age_days = parse_number("MAX_AGE_DAYS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    /// Check cross-field requirements that serde defaults cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.storage.backend.as_str() {
            "aws" if self.storage.aws.bucket.is_empty() => {
                anyhow::bail!("storage.aws.bucket (S3_BUCKET) is required for the aws backend")
            }
            "aws" | "local" | "memory" => {}
            other => anyhow::bail!("unknown storage.backend '{other}'"),
        }
        match self.cache.backend.as_str() {
            "redis" | "memory" => {}
            other => anyhow::bail!("unknown cache.backend '{other}'"),
        }
        if self.server.base_url.trim_end_matches('/').is_empty() {
            anyhow::bail!("server.base_url must not be empty");
        }
        if self.share.default_ttl_hours == 0 {
            anyhow::bail!("share.default_ttl_hours must be positive");
        }
        if self.server.request_timeout == 0 {
            anyhow::bail!("server.request_timeout must be positive");
        }
        Ok(())
    }
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Resolve the effective configuration: optional YAML file, then the
/// process environment, then validation.
pub fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => Config::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
