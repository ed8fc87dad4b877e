//! Pure calculation functions for output dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! Outputs are never larger than the source in either dimension.

/// How a decoded source is brought to its output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Scale to exactly these dimensions, keeping the source proportions.
    Scale { width: u32, height: u32 },
    /// Scale to cover, then center-crop to exactly these dimensions.
    Fill { width: u32, height: u32 },
}

impl ResizePlan {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ResizePlan::Scale { width, height } | ResizePlan::Fill { width, height } => {
                (width, height)
            }
        }
    }
}

/// Work out the output box for a source of `source` dimensions.
///
/// # Arguments
/// * `source` - Decoded image dimensions (width, height)
/// * `target_width` - Requested width
/// * `target_height` - Requested height, `None` to keep the source ratio
///
/// # Examples
/// ```
/// # use imgsync::imaging::{ResizePlan, plan_resize};
/// // 2000x1000 → 600 wide, ratio kept
/// assert_eq!(
///     plan_resize((2000, 1000), 600, None),
///     ResizePlan::Scale { width: 600, height: 300 }
/// );
///
/// // 300x200 asked for 1500x1500 → never enlarged, cropped to 200x200
/// assert_eq!(
///     plan_resize((300, 200), 1500, Some(1500)),
///     ResizePlan::Fill { width: 200, height: 200 }
/// );
/// ```
pub fn plan_resize(source: (u32, u32), target_width: u32, target_height: Option<u32>) -> ResizePlan {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    let target_width = target_width.max(1);

    match target_height {
        None => {
            let width = target_width.min(src_w);
            let height = scaled(src_h, width as f64 / src_w as f64);
            ResizePlan::Scale { width, height }
        }
        Some(target_height) => {
            let target_height = target_height.max(1);
            // Largest box of the target proportions that fits inside the source
            let scale = (src_w as f64 / target_width as f64)
                .min(src_h as f64 / target_height as f64)
                .min(1.0);
            ResizePlan::Fill {
                width: scaled(target_width, scale).min(src_w),
                height: scaled(target_height, scale).min(src_h),
            }
        }
    }
}

fn scaled(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}
