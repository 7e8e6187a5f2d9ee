//! Object store adapters.
//!
//! The [`backend::ObjectStore`] trait abstracts over where shared objects
//! live.  Implementations include AWS S3, the local filesystem, and an
//! in-memory store.

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StorageConfig;
use backend::ObjectStore;

/// Build the object store selected by `config.backend`.
pub async fn connect(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.backend.as_str() {
        "aws" => {
            let store = aws::S3ObjectStore::new(&config.aws).await?;
            Ok(Arc::new(store))
        }
        "local" => {
            let store = local::LocalObjectStore::new(&config.local.root_dir)?;
            info!(
                "Local object store initialized at {}",
                config.local.root_dir
            );
            Ok(Arc::new(store))
        }
        "memory" => {
            warn!("Using in-memory object store; it starts empty and is lost on exit");
            Ok(Arc::new(memory::MemoryObjectStore::new()))
        }
        other => anyhow::bail!("unknown storage.backend '{other}' (expected aws, local or memory)"),
    }
}
