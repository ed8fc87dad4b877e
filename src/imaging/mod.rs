//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader`; AVIF via `avif-parse` + `rav1d` |
//! | **Resize** | Lanczos3, never above the source size |
//! | **Encode** | AVIF (rav1e), JPEG, PNG, TIFF via `image`; lossy WebP via `webp` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a render
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Variant → render parameters, then backend call

mod avif_decoder;
pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{ResizePlan, plan_resize};
pub use operations::{codec_for, plan_render, render_variant};
pub use params::{Codec, Quality, RenderParams};
pub use rust_backend::RustBackend;
