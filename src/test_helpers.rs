//! Shared test utilities for the imgsync test suite.
//!
//! Writes small real images and fixture trees into temp directories, and
//! builds tiny configurations so a run renders only a handful of variants.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_test_jpeg(&tmp.path().join("a.jpg"), 120, 80);
//! let config = tiny_config(&[("small", 100)], &[("square", Some(1.0))], &[OutputFormat::Webp]);
//! ```

use std::fs;
use std::path::Path;

use image::{ImageEncoder, RgbImage};

use crate::config::{AspectRatio, SyncConfig};
use crate::matrix::OutputFormat;

// =========================================================================
// Image files
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Create a small valid JPEG file with the given dimensions.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let img = gradient(width, height);
    let file = fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create a small valid PNG file with the given dimensions.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    gradient(width, height).save(path).unwrap();
}

/// Write arbitrary bytes, creating parent directories.
pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

// =========================================================================
// Configuration
// =========================================================================

/// A configuration with exactly the given matrix and stock encoder settings.
pub fn tiny_config(
    sizes: &[(&str, u32)],
    variations: &[(&str, Option<f64>)],
    formats: &[OutputFormat],
) -> SyncConfig {
    SyncConfig {
        sizes: sizes.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
        variations: variations
            .iter()
            .map(|(n, r)| {
                let ratio = r.map(AspectRatio::ratio).unwrap_or(AspectRatio::PRESERVE);
                (n.to_string(), ratio)
            })
            .collect(),
        formats: formats.to_vec(),
        ..SyncConfig::default()
    }
}
