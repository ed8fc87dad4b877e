//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Decode (AVIF) | `avif-parse` + `rav1d`, see [`avif_decoder`](super::avif_decoder) |
//! | Resize, ratio kept | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Resize, fixed ratio | `image::DynamicImage::resize_to_fill` (center crop) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy at the configured quality) |
//! | Encode → JPEG / PNG / TIFF | `image` crate encoders |
//!
//! JPEG output is baseline: `image::codecs::jpeg::JpegEncoder` cannot write
//! progressive scans.

use super::avif_decoder::{decode_avif, is_avif};
use super::backend::{BackendError, ImageBackend};
use super::calculations::{ResizePlan, plan_resize};
use super::params::{Codec, RenderParams};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is not listed: the `image` crate's `"avif"` feature only enables the
/// **encoder** (rav1e), yet `ImageFormat::reading_enabled()` returns `true`
/// for it. AVIF goes through the rav1d decoder instead.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut exts: Vec<&'static str> = PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect();
    exts.push("avif");
    exts
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn resize(img: &DynamicImage, params: &RenderParams) -> DynamicImage {
    match plan_resize((img.width(), img.height()), params.width, params.height) {
        ResizePlan::Scale { width, height } if (width, height) == (img.width(), img.height()) => {
            img.clone()
        }
        ResizePlan::Scale { width, height } => img.resize_exact(width, height, FilterType::Lanczos3),
        ResizePlan::Fill { width, height } => img.resize_to_fill(width, height, FilterType::Lanczos3),
    }
}

/// Drop to 8 bits per channel, keeping alpha only when the source has it.
fn to_8bit(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn encode_failed(codec: Codec, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("{codec} encode failed: {e}"))
}

/// Encode into an in-memory buffer.
fn encode(img: DynamicImage, params: &RenderParams) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let codec = params.codec;
    match codec {
        Codec::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(
                &mut buf,
                params.speed,
                params.quality.value() as u8,
            );
            to_8bit(img)
                .write_with_encoder(encoder)
                .map_err(|e| encode_failed(codec, e))?;
        }
        Codec::Webp => {
            let img = to_8bit(img);
            let encoder = webp::Encoder::from_image(&img).map_err(|e| {
                BackendError::ProcessingFailed(format!("{codec} encode failed: {e}"))
            })?;
            buf.extend_from_slice(&encoder.encode(params.quality.value() as f32));
        }
        Codec::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, params.quality.value() as u8);
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| encode_failed(codec, e))?;
        }
        Codec::Png => {
            let encoder = PngEncoder::new(&mut buf);
            img.write_with_encoder(encoder)
                .map_err(|e| encode_failed(codec, e))?;
        }
        Codec::Tiff => {
            let mut cursor = Cursor::new(&mut buf);
            to_8bit(img)
                .write_to(&mut cursor, ImageFormat::Tiff)
                .map_err(|e| encode_failed(codec, e))?;
        }
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                supported_input_extensions()
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        if is_avif(path) {
            return decode_avif(path);
        }
        ImageReader::open(path)
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
            })
    }

    fn render(&self, image: &DynamicImage, params: &RenderParams) -> Result<Vec<u8>, BackendError> {
        encode(resize(image, params), params)
    }
}
