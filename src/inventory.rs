//! Remote inventory of the originals bucket.
//!
//! Built once per run and then only read by the coordinator, so it needs no
//! locking. Only the originals bucket is ever inventoried: an image counts as
//! synced when its original is there with the same fingerprint, regardless of
//! what the processed bucket holds.

use std::collections::HashMap;

use tracing::info;

use crate::fingerprint::normalize_etag;
use crate::store::{ObjectEntry, ObjectStore, StoreResult};

/// Object key → normalized fingerprint.
#[derive(Debug, Clone, Default)]
pub struct RemoteInventory {
    fingerprints: HashMap<String, String>,
}

impl RemoteInventory {
    pub fn from_entries(entries: impl IntoIterator<Item = ObjectEntry>) -> Self {
        let fingerprints = entries
            .into_iter()
            .map(|entry| (entry.key, normalize_etag(&entry.etag)))
            .collect();
        Self { fingerprints }
    }

    /// Fingerprint stored for `key`, if the object exists.
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.fingerprints.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// List `bucket` and build its inventory.
pub async fn fetch_inventory<S>(store: &S, bucket: &str) -> StoreResult<RemoteInventory>
where
    S: ObjectStore + ?Sized,
{
    let entries = store.list(bucket).await?;
    let inventory = RemoteInventory::from_entries(entries);
    info!(bucket, objects = inventory.len(), "Fetched remote inventory");
    Ok(inventory)
}
