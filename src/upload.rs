//! Uploads to the two buckets.
//!
//! Derivatives go to the processed bucket as soon as they are encoded; the
//! original goes to the originals bucket last. The originals bucket doubles
//! as the record of completed images, so callers must only call
//! [`Uploader::upload_original`] once every variant of the image is stored.

use std::sync::Arc;

use tracing::{debug, info};

use crate::naming::{content_type, originals_key};
use crate::store::{ObjectStore, StoreResult};
use crate::walk::LocalImageFile;
use crate::worker::TranscodeResult;

pub struct Uploader<S: ?Sized> {
    store: Arc<S>,
    originals_bucket: Arc<str>,
    processed_bucket: Arc<str>,
}

impl<S: ?Sized> Clone for Uploader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            originals_bucket: Arc::clone(&self.originals_bucket),
            processed_bucket: Arc::clone(&self.processed_bucket),
        }
    }
}

impl<S: ObjectStore + ?Sized> Uploader<S> {
    pub fn new(store: Arc<S>, originals_bucket: &str, processed_bucket: &str) -> Self {
        Self {
            store,
            originals_bucket: originals_bucket.into(),
            processed_bucket: processed_bucket.into(),
        }
    }

    /// Store one encoded variant, consuming its buffer. Returns the key.
    pub async fn upload_variant(&self, result: TranscodeResult) -> StoreResult<String> {
        let TranscodeResult {
            output_key, bytes, ..
        } = result;
        debug!(key = %output_key, bytes = bytes.len(), "Uploading variant");
        self.store
            .put(
                &self.processed_bucket,
                &output_key,
                bytes,
                content_type(&output_key),
            )
            .await?;
        Ok(output_key)
    }

    /// Store the unmodified source file, marking the image as synced.
    pub async fn upload_original(&self, file: &LocalImageFile) -> StoreResult<String> {
        let key = originals_key(&file.relative_path);
        self.store
            .put_file(
                &self.originals_bucket,
                &key,
                &file.absolute_path,
                content_type(&key),
            )
            .await?;
        info!(key = %key, "Original uploaded");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::OutputFormat;
    use crate::store::{MemoryStore, StoreError};
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    fn result(key: &str, bytes: &[u8]) -> TranscodeResult {
        TranscodeResult {
            variant: "small-square".into(),
            format: OutputFormat::Webp,
            output_key: key.into(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn variant_goes_to_processed_bucket_with_content_type() {
        let store = Arc::new(MemoryStore::new());
        let uploader = Uploader::new(store.clone(), "originals", "processed");

        let key = uploader
            .upload_variant(result("dir/a-small-square.webp", b"webp"))
            .await
            .unwrap();
        assert_eq!(key, "dir/a-small-square.webp");

        let stored = store.get("processed", "dir/a-small-square.webp").unwrap();
        assert_eq!(stored.body, b"webp");
        assert_eq!(stored.content_type, "image/webp");
        assert!(store.keys("originals").is_empty());
    }

    #[tokio::test]
    async fn original_goes_to_originals_bucket() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("dir/a.jpg"), b"jpeg bytes");
        let store = Arc::new(MemoryStore::new());
        let uploader = Uploader::new(store.clone(), "originals", "processed");

        let file = LocalImageFile {
            relative_path: "dir/a.jpg".into(),
            absolute_path: tmp.path().join("dir/a.jpg"),
        };
        assert_eq!(uploader.upload_original(&file).await.unwrap(), "dir/a.jpg");

        let stored = store.get("originals", "dir/a.jpg").unwrap();
        assert_eq!(stored.body, b"jpeg bytes");
        assert_eq!(stored.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn rejected_write_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_to("a-small-square.webp");
        let uploader = Uploader::new(store, "originals", "processed");

        let err = uploader
            .upload_variant(result("a-small-square.webp", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }

    #[tokio::test]
    async fn works_through_a_trait_object() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let uploader = Uploader::new(store, "originals", "processed");
        assert!(uploader.upload_variant(result("k.webp", b"x")).await.is_ok());
    }
}
