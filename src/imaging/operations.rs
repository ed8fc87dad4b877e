//! High-level image operations.
//!
//! These functions combine a variant definition with the encoder settings
//! and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::params::{Codec, Quality, RenderParams};
use crate::config::EncodingConfig;
use crate::matrix::{ImageVariantSpec, OutputFormat};
use image::DynamicImage;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Codec used to write `format` for a source with extension `source_ext`.
///
/// `[original]` re-encodes in the source's own codec.
pub fn codec_for(format: OutputFormat, source_ext: &str) -> Result<Codec> {
    match format {
        OutputFormat::Original => Codec::from_extension(source_ext).ok_or_else(|| {
            BackendError::Unsupported(format!("no encoder for .{source_ext} sources"))
        }),
        OutputFormat::Webp => Ok(Codec::Webp),
        OutputFormat::Avif => Ok(Codec::Avif),
        OutputFormat::Jpeg => Ok(Codec::Jpeg),
        OutputFormat::Png => Ok(Codec::Png),
    }
}

/// Plan the render of one variant without executing it.
pub fn plan_render(
    variant: &ImageVariantSpec,
    source_ext: &str,
    encoding: &EncodingConfig,
) -> Result<RenderParams> {
    let codec = codec_for(variant.format, source_ext)?;
    let quality = match codec {
        Codec::Avif => encoding.avif_quality,
        Codec::Webp => encoding.webp_quality,
        Codec::Jpeg | Codec::Png | Codec::Tiff => encoding.original_quality,
    };
    Ok(RenderParams {
        width: variant.width,
        height: variant.height(),
        codec,
        quality: Quality::new(quality),
        speed: encoding.avif_speed,
    })
}

/// Render one variant of an already decoded image.
pub fn render_variant(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    variant: &ImageVariantSpec,
    source_ext: &str,
    encoding: &EncodingConfig,
) -> Result<Vec<u8>> {
    let params = plan_render(variant, source_ext, encoding)?;
    backend.render(image, &params)
}
