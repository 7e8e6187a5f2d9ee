//! s3share library: time-limited share links for objects in an S3 bucket.
//!
//! This crate provides the share authorization engine, the share-link
//! codec, pluggable object store and secret cache adapters, and the HTTP
//! router that serves links.

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod link;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod share;
pub mod storage;

use crate::config::Config;
use crate::share::ShareService;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The share authorization engine.
    pub shares: ShareService,
}
