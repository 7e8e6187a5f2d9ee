//! AWS S3 object store.
//!
//! Reads objects from a single S3 bucket.  Object paths are mapped to
//! upstream keys as `{prefix}{path}`.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::Client;
use chrono::DateTime;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::backend::{
    ObjectMetadata, ObjectReader, ObjectStore, StorageError, StorageResult, DEFAULT_CONTENT_TYPE,
};
use crate::config::AwsStorageConfig;

/// Object store backed by an AWS S3 (or S3-compatible) bucket.
pub struct S3ObjectStore {
    /// AWS S3 SDK client.
    client: Client,
    /// The upstream bucket name.
    bucket: String,
    /// Key prefix for all objects in the upstream bucket.
    prefix: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store from configuration.
    ///
    /// Loads AWS credentials from the default credential chain unless the
    /// config carries an explicit access key pair.
    pub async fn new(config: &AwsStorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "s3share-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 object store initialized: bucket={} region={} prefix='{}'",
            config.bucket, config.region, config.prefix
        );

        Ok(Self::with_client(
            client,
            config.bucket.clone(),
            config.prefix.clone(),
        ))
    }

    /// Wrap an already-configured SDK client.
    pub fn with_client(client: Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Map an object path to an upstream S3 key.
    fn s3_key(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }
}

/// Pick the reported content type, or fall back to octet-stream.
fn content_type_or_default(content_type: Option<&str>) -> String {
    match content_type {
        Some(ct) if !ct.is_empty() => ct.to_string(),
        _ => DEFAULT_CONTENT_TYPE.to_string(),
    }
}

/// Negative or missing lengths are reported as unknown.
fn content_length(len: Option<i64>) -> Option<u64> {
    len.and_then(|l| u64::try_from(l).ok())
}

impl ObjectStore for S3ObjectStore {
    fn head_object(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectMetadata>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!("AWS head_object: bucket={} key={}", self.bucket, s3_key);

            let resp = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_not_found() {
                        StorageError::NotFound { key: key.clone() }
                    } else {
                        StorageError::Backend(Self::map_sdk_error("head_object", service_err))
                    }
                })?;

            let last_modified = resp
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));

            Ok(ObjectMetadata {
                content_type: content_type_or_default(resp.content_type()),
                size: content_length(resp.content_length()),
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
            let s3_key = self.s3_key(&key);

            debug!("AWS get_object: bucket={} key={}", self.bucket, s3_key);

            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        StorageError::NotFound { key: key.clone() }
                    } else {
                        StorageError::Backend(Self::map_sdk_error("get_object", service_err))
                    }
                })?;

            let content_type = content_type_or_default(resp.content_type());
            let size = content_length(resp.content_length());
            let stream = ReaderStream::new(resp.body.into_async_read()).boxed();

            Ok(ObjectReader::new(content_type, size, stream))
        })
    }
}
