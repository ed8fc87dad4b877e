//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations a transcode worker
//! needs: tell whether a file can be decoded, decode it once, and render any
//! number of variants from the decoded pixels.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! [`MockBackend`](tests::MockBackend) below, which records every call and
//! can be told to fail, panic or stall.

use super::params::RenderParams;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported format: {0}")]
    Unsupported(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across the blocking worker threads and
/// the rayon pool, hence `Send + Sync + 'static`.
pub trait ImageBackend: Send + Sync + 'static {
    /// Whether `path` has an extension this backend can decode.
    fn supports(&self, path: &Path) -> bool;

    /// Decode the source image.
    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError>;

    /// Resize and encode one output, returning the encoded bytes.
    fn render(&self, image: &DynamicImage, params: &RenderParams) -> Result<Vec<u8>, BackendError>;
}
