//! Parameter types for image operations.
//!
//! These structs describe *what* to render, not *how*. They sit between
//! [`operations`](super::operations) (which maps a variant and the encoder
//! settings to parameters) and the [`backend`](super::backend) (which does
//! the pixel work), so a mock backend can stand in during tests.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Codec`]: Concrete encoder an output is written with.
//! - [`RenderParams`]: Target box, codec and encoder knobs for one variant.

use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoder used for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Jpeg,
    Png,
    Tiff,
    Webp,
    Avif,
}

impl Codec {
    /// Codec matching a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Codec::Jpeg),
            "png" => Some(Codec::Png),
            "tif" | "tiff" => Some(Codec::Tiff),
            "webp" => Some(Codec::Webp),
            "avif" => Some(Codec::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::Jpeg => "jpeg",
            Codec::Png => "png",
            Codec::Tiff => "tiff",
            Codec::Webp => "webp",
            Codec::Avif => "avif",
        };
        f.write_str(name)
    }
}

/// Parameters for rendering one variant from a decoded source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// Target width before the never-enlarge clamp.
    pub width: u32,
    /// Target height, or `None` to follow the source aspect ratio.
    pub height: Option<u32>,
    pub codec: Codec,
    pub quality: Quality,
    /// AVIF encoder speed (1-10). Ignored by other codecs.
    pub speed: u8,
}
