//! Size/format matrix resolution.
//!
//! Expands the configured width buckets × aspect variations × output formats
//! into the flat list of variants rendered for every image. The expansion is
//! pure: the same configuration always yields the same list in the same
//! order (bucket, then variation, then format, each in declaration order).
//!
//! ```text
//! sizes      { small: 600, large: 1500 }
//! variations { original: preserve, square: 1.0 }
//! formats    [ webp, avif ]
//!
//! small-original webp   600 × auto
//! small-original avif   600 × auto
//! small-square   webp   600 × 600
//! small-square   avif   600 × 600
//! large-original webp  1500 × auto
//! ...
//! ```

use crate::config::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Re-encode in the source file's own format.
    #[serde(rename = "[original]", alias = "original")]
    Original,
    Webp,
    Avif,
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension for this format, or `None` for [`OutputFormat::Original`]
    /// (which reuses the source extension).
    pub fn extension(self) -> Option<&'static str> {
        match self {
            OutputFormat::Original => None,
            OutputFormat::Webp => Some("webp"),
            OutputFormat::Avif => Some("avif"),
            OutputFormat::Jpeg => Some("jpg"),
            OutputFormat::Png => Some("png"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.extension() {
            Some(ext) => f.write_str(ext),
            None => f.write_str("[original]"),
        }
    }
}

/// One cell of the matrix: a width bucket, an aspect variation and a format.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageVariantSpec {
    /// `"{bucket}-{variation}"`, used in the processed object key.
    pub name: String,
    pub width: u32,
    /// `None` keeps the source aspect ratio; otherwise height = width / ratio.
    pub height_ratio: Option<f64>,
    pub format: OutputFormat,
}

impl ImageVariantSpec {
    /// Requested height, or `None` when the source aspect ratio is kept.
    pub fn height(&self) -> Option<u32> {
        self.height_ratio
            .filter(|r| r.is_finite() && *r > 0.0)
            .map(|r| ((self.width as f64 / r).round() as u32).max(1))
    }
}

/// Expand the configuration into the ordered variant list.
pub fn resolve_variants(config: &SyncConfig) -> Vec<ImageVariantSpec> {
    let mut variants =
        Vec::with_capacity(config.sizes.len() * config.variations.len() * config.formats.len());
    for (bucket, &width) in &config.sizes {
        for (variation, ratio) in &config.variations {
            for &format in &config.formats {
                variants.push(ImageVariantSpec {
                    name: format!("{bucket}-{variation}"),
                    width,
                    height_ratio: ratio.value().filter(|r| r.is_finite()),
                    format,
                });
            }
        }
    }
    variants
}
