//! # imgsync
//!
//! Keeps an object store in step with a local tree of images. Every image is
//! uploaded unmodified to an *originals* bucket and, alongside it, as a matrix
//! of resized and re-encoded derivatives to a *processed* bucket.
//!
//! # Architecture: Diff, Schedule, Transcode, Upload
//!
//! ```text
//! 1. Inventory   originals bucket  →  key → ETag map
//! 2. Detect      local file        →  unchanged | new | changed
//! 3. Schedule    changed files     →  at most N images in flight
//! 4. Transcode   one image         →  stream of encoded variants
//! 5. Upload      variants first, original last
//! ```
//!
//! The originals bucket is the only record of what has been synced. An
//! original is written after all of its variants, so an image whose run was
//! interrupted has no original and is picked up again next time. There is no
//! local cache or lock file.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Variant matrix and encoding settings (TOML or JSON), validation, stock config |
//! | [`matrix`] | Expands sizes × aspect ratios × formats into variant specs |
//! | [`naming`] | Object keys and content types |
//! | [`walk`] | Recursive discovery of local files, tolerant of unreadable directories |
//! | [`fingerprint`] | Streaming MD5 of local files, ETag normalization |
//! | [`store`] | `ObjectStore` trait with S3 and in-memory implementations |
//! | [`inventory`] | Snapshot of the originals bucket taken once per run |
//! | [`detect`] | Classifies a local file against the inventory |
//! | [`scheduler`] | Bounded job set with completion-order draining |
//! | [`worker`] | Isolated per-image transcoding on the blocking pool |
//! | [`imaging`] | Pure-Rust decode, resize, encode behind `ImageBackend` |
//! | [`upload`] | Writes variants and originals to their buckets |
//! | [`pipeline`] | Ties the stages together and emits progress events |
//! | [`report`] | Per-image outcomes and totals |
//! | [`output`] | CLI formatting of events, reports, and the variant matrix |
//!
//! # Design Decisions
//!
//! ## Change Detection by ETag
//!
//! A local file is unchanged when the hex MD5 of its bytes equals the ETag of
//! the object with the same key in the originals bucket. Single-part S3
//! uploads use the MD5 as ETag, so no metadata beyond what `ListObjectsV2`
//! returns is needed. Multipart ETags never match and are re-synced.
//!
//! ## Worker Isolation
//!
//! Each image is decoded and encoded on its own blocking task. A decoder
//! panic or a failed encode ends that image's job only; the rest of the run
//! continues and the failure is listed in the report.
//!
//! ## Streaming Variants
//!
//! A worker hands each encoded variant to the uploader through a channel
//! sized to the variant count, so buffers are released as soon as their
//! upload finishes instead of the whole matrix being held in memory.

pub mod config;
pub mod detect;
pub mod fingerprint;
pub mod imaging;
pub mod inventory;
pub mod matrix;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod upload;
pub mod walk;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;
