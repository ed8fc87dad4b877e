//! Object store access.
//!
//! The pipeline talks to storage only through [`ObjectStore`], so the same
//! code runs against S3-compatible services ([`S3Store`]) and the in-memory
//! [`MemoryStore`] used by tests and dry runs.
//!
//! | Operation | Used by |
//! |---|---|
//! | [`list`](ObjectStore::list) | inventory of the originals bucket |
//! | [`put`](ObjectStore::put) | derivative uploads |
//! | [`put_file`](ObjectStore::put_file) | original uploads |

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Store, StoreConfig};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to configure store client: {0}")]
    Config(String),

    #[error("Store unavailable while listing {bucket}: {message}")]
    Unavailable { bucket: String, message: String },

    #[error("Write of {bucket}/{key} failed: {message}")]
    Write {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unavailable(bucket: &str, msg: impl Into<String>) -> Self {
        Self::Unavailable {
            bucket: bucket.to_string(),
            message: msg.into(),
        }
    }

    pub fn write(bucket: &str, key: &str, msg: impl Into<String>) -> Self {
        Self::Write {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: msg.into(),
        }
    }
}

/// One listed object and its store-provided fingerprint (raw ETag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub etag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List every object in `bucket`, following pagination to the end.
    async fn list(&self, bucket: &str) -> StoreResult<Vec<ObjectEntry>>;

    /// Write `body` under `key`, replacing any existing object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()>;

    /// Write a local file under `key`.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StoreResult<()> {
        let body = tokio::fs::read(path).await?;
        self.put(bucket, key, body, content_type).await
    }
}
