//! In-memory store.
//!
//! Behaves like an S3 bucket set for the operations the pipeline uses:
//! objects get a quoted MD5 ETag, and listing returns every object of a
//! bucket. Every accepted write is appended to a log so callers can assert
//! on ordering. Failures can be injected per bucket (listing) or per key
//! (writes).

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ObjectEntry, ObjectStore, StoreError, StoreResult};
use crate::fingerprint::fingerprint_bytes;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub etag: String,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    writes: Mutex<Vec<(String, String)>>,
    unavailable_buckets: Mutex<HashSet<String>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, without recording it in the write log.
    pub fn seed(&self, bucket: &str, key: &str, body: &[u8]) {
        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.to_vec(),
                content_type: "application/octet-stream".into(),
                etag: format!("\"{}\"", fingerprint_bytes(body)),
            },
        );
    }

    /// Make every listing of `bucket` fail.
    pub fn fail_listing(&self, bucket: &str) {
        lock(&self.unavailable_buckets).insert(bucket.to_string());
    }

    /// Make every write to `key` (in any bucket) fail.
    pub fn fail_writes_to(&self, key: &str) {
        lock(&self.failing_keys).insert(key.to_string());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys currently stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Successful writes as `(bucket, key)`, in the order they happened.
    pub fn writes(&self) -> Vec<(String, String)> {
        lock(&self.writes).clone()
    }

    /// Successful writes to `bucket`, in order.
    pub fn writes_to(&self, bucket: &str) -> Vec<String> {
        lock(&self.writes)
            .iter()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, bucket: &str) -> StoreResult<Vec<ObjectEntry>> {
        if lock(&self.unavailable_buckets).contains(bucket) {
            return Err(StoreError::unavailable(bucket, "injected listing failure"));
        }
        Ok(lock(&self.objects)
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, key), obj)| ObjectEntry {
                key: key.clone(),
                etag: obj.etag.clone(),
            })
            .collect())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        if lock(&self.failing_keys).contains(key) {
            return Err(StoreError::write(bucket, key, "injected write failure"));
        }
        let etag = format!("\"{}\"", fingerprint_bytes(&body));
        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                etag,
            },
        );
        lock(&self.writes).push((bucket.to_string(), key.to_string()));
        Ok(())
    }
}
