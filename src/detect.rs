//! Change detection.
//!
//! Decides, per local file, whether it needs transcoding. The checks run
//! cheapest first and short-circuit:
//!
//! 1. extension the backend cannot decode → [`Classification::Unsupported`]
//!    (the file is never read);
//! 2. MD5 of the file contents, streamed from disk;
//! 3. lookup of the originals key in the remote inventory: missing or with a
//!    different fingerprint → [`Classification::NeedsProcessing`], equal →
//!    [`Classification::Unchanged`].

use std::fmt;

use crate::fingerprint::fingerprint_file_async;
use crate::imaging::ImageBackend;
use crate::inventory::RemoteInventory;
use crate::naming::originals_key;
use crate::walk::LocalImageFile;

/// Why an image is being (re)processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// No original with this key in the remote store.
    New,
    /// The remote original has a different fingerprint.
    Changed,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::New => f.write_str("new"),
            ChangeReason::Changed => f.write_str("changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Unsupported,
    Unchanged,
    NeedsProcessing(ChangeReason),
    /// The file could not be read for fingerprinting.
    Unreadable(String),
}

/// Compare a local fingerprint against the inventory entry for `key`.
pub fn compare(key: &str, fingerprint: &str, inventory: &RemoteInventory) -> Classification {
    match inventory.fingerprint(key) {
        None => Classification::NeedsProcessing(ChangeReason::New),
        Some(remote) if remote.eq_ignore_ascii_case(fingerprint) => Classification::Unchanged,
        Some(_) => Classification::NeedsProcessing(ChangeReason::Changed),
    }
}

/// Classify one local file. Hashing runs on the blocking pool.
pub async fn classify<B>(
    file: &LocalImageFile,
    backend: &B,
    inventory: &RemoteInventory,
) -> Classification
where
    B: ImageBackend + ?Sized,
{
    if !backend.supports(&file.absolute_path) {
        return Classification::Unsupported;
    }
    match fingerprint_file_async(file.absolute_path.clone()).await {
        Ok(fingerprint) => compare(
            &originals_key(&file.relative_path),
            &fingerprint,
            inventory,
        ),
        Err(e) => Classification::Unreadable(e.to_string()),
    }
}
