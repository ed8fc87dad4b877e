//! Object key conventions for both buckets.
//!
//! ```text
//! local:      <root>/reviews/2021/cover.jpg
//! originals:  reviews/2021/cover.jpg
//! processed:  reviews/2021/cover-small-square.webp
//!             reviews/2021/cover-small-square.jpg     ([original] format)
//! ```
//!
//! Keys always use `/` separators and never start with one. Files directly
//! under the root have no directory part (`cover-small-square.webp`).

use crate::matrix::ImageVariantSpec;

/// Normalize a relative path into an originals-bucket key.
pub fn originals_key(relative_path: &str) -> String {
    relative_path
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}

/// Split a key into `(directory, stem, extension)`.
///
/// The extension excludes the dot and is empty when the file has none.
/// Dotfiles are not split (`.hidden` has stem `.hidden`).
fn split_key(key: &str) -> (&str, &str, &str) {
    let (dir, file) = match key.rfind('/') {
        Some(pos) => (&key[..pos], &key[pos + 1..]),
        None => ("", key),
    };
    match file.rfind('.') {
        Some(pos) if pos > 0 => (dir, &file[..pos], &file[pos + 1..]),
        _ => (dir, file, ""),
    }
}

/// Extension of a relative path, without the dot.
pub fn source_extension(relative_path: &str) -> &str {
    split_key(relative_path).2
}

/// Processed-bucket key for one variant of an image.
///
/// The extension is the variant format's, or the source's own extension
/// (case preserved) for `[original]`.
pub fn variant_key(relative_path: &str, variant: &ImageVariantSpec) -> String {
    let key = originals_key(relative_path);
    let (dir, stem, source_ext) = split_key(&key);
    let ext = variant.format.extension().unwrap_or(source_ext);
    let file = if ext.is_empty() {
        format!("{stem}-{}", variant.name)
    } else {
        format!("{stem}-{}.{ext}", variant.name)
    };
    if dir.is_empty() {
        file
    } else {
        format!("{dir}/{file}")
    }
}

/// MIME type for an object key, from its extension.
pub fn content_type(key: &str) -> &'static str {
    let ext = split_key(key).2.to_ascii_lowercase();
    match ext.as_str() {
        "webp" => "image/webp",
        "avif" => "image/avif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
