//! AVIF decoding.
//!
//! The `image` crate's `"avif"` feature only provides the encoder (rav1e).
//! Its decoder needs `"avif-native"`, which links the C library dav1d. AVIF
//! sources are instead unpacked with `avif-parse` (container) and decoded
//! with `rav1d` (pure Rust port of dav1d), then converted from YUV to RGB8.
//!
//! Alpha planes are ignored: the primary item is decoded as opaque RGB.

use super::backend::BackendError;
use image::{DynamicImage, RgbImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as dav1d;
use std::io::Cursor;
use std::mem::MaybeUninit;
use std::path::Path;
use std::ptr::NonNull;

pub(super) fn is_avif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

/// Decode an AVIF file from disk.
pub(super) fn decode_avif(path: &Path) -> Result<DynamicImage, BackendError> {
    let file_data = std::fs::read(path).map_err(BackendError::Io)?;
    let avif = avif_parse::read_avif(&mut Cursor::new(&file_data)).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to parse AVIF {}: {e:?}", path.display()))
    })?;
    let av1_bytes: &[u8] = &avif.primary_item;
    decode_av1(av1_bytes).map_err(|message| {
        BackendError::ProcessingFailed(format!(
            "Failed to decode AVIF {}: {message}",
            path.display()
        ))
    })
}

/// Decode a single AV1 frame into RGB8.
fn decode_av1(av1_bytes: &[u8]) -> Result<DynamicImage, String> {
    let mut settings = MaybeUninit::<Dav1dSettings>::uninit();
    unsafe { dav1d::dav1d_default_settings(NonNull::from(&mut settings).cast()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(format!("rav1d open failed ({})", rc.0));
    }

    // The context is closed below on every path
    let decoded = (|| {
        let mut data = Dav1dData::default();
        let buf_ptr = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
        if buf_ptr.is_null() {
            return Err("rav1d data_create failed".to_string());
        }
        unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

        let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { dav1d::dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(format!("rav1d send_data failed ({})", rc.0));
        }

        let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
        if rc.0 != 0 {
            return Err(format!("rav1d get_picture failed ({})", rc.0));
        }

        let image = picture_to_rgb(&pic);
        unsafe { dav1d::dav1d_picture_unref(NonNull::new(&mut pic)) };
        image
    })();

    unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
    decoded
}

fn picture_to_rgb(pic: &Dav1dPicture) -> Result<DynamicImage, String> {
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    let layout = pic.p.layout;

    let plane = |i: usize| {
        pic.data[i]
            .map(|p| p.as_ptr() as *const u8)
            .ok_or_else(|| format!("decoded picture has no plane {i}"))
    };
    let y_ptr = plane(0)?;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width,
            height,
            bpc,
            ss_x: false,
            ss_y: false,
            monochrome: true,
        }
    } else {
        let (ss_x, ss_y) = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (true, true),
            DAV1D_PIXEL_LAYOUT_I422 => (true, false),
            DAV1D_PIXEL_LAYOUT_I444 => (false, false),
            _ => return Err(format!("unsupported pixel layout {layout}")),
        };
        YuvPlanes {
            y_ptr,
            u_ptr: plane(1)?,
            v_ptr: plane(2)?,
            y_stride: pic.stride[0],
            uv_stride: pic.stride[1],
            width,
            height,
            bpc,
            ss_x,
            ss_y,
            monochrome: false,
        }
    };

    RgbImage::from_raw(width, height, planes.to_rgb())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| "decoded buffer does not match picture size".to_string())
}

/// Borrowed YUV planes of a decoded picture.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling: horizontal, vertical (I420 = true, true)
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];
        for row in 0..self.height {
            for col in 0..self.width {
                let y = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);

                let (r, g, b) = if self.monochrome {
                    let v = (y * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let c_col = if self.ss_x { col / 2 } else { col };
                    let c_row = if self.ss_y { row / 2 } else { row };
                    let cb = read_sample(self.u_ptr, self.uv_stride, c_col, c_row, self.bpc) - center;
                    let cr = read_sample(self.v_ptr, self.uv_stride, c_col, c_row, self.bpc) - center;
                    (
                        ((y + 1.402 * cr) * scale).clamp(0.0, 255.0),
                        ((y - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0),
                        ((y + 1.772 * cb) * scale).clamp(0.0, 255.0),
                    )
                };

                let idx = ((row * self.width + col) * 3) as usize;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }
        rgb
    }
}

/// One sample from a plane; 10- and 12-bit depths are stored as u16.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { *(ptr.offset(byte_offset) as *const u16) }) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::avif::AvifEncoder;

    fn write_test_avif(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 96])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut buf, 10, 80))
            .unwrap();
        std::fs::write(path, buf).unwrap();
    }

    #[test]
    fn detects_avif_extension() {
        assert!(is_avif(Path::new("a/b.avif")));
        assert!(is_avif(Path::new("B.AVIF")));
        assert!(!is_avif(Path::new("b.avi")));
        assert!(!is_avif(Path::new("avif")));
    }

    #[test]
    fn decode_avif_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.avif");
        write_test_avif(&path, 64, 48);

        let decoded = decode_avif(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn garbage_avif_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.avif");
        std::fs::write(&path, b"not an avif").unwrap();
        assert!(matches!(
            decode_avif(&path),
            Err(BackendError::ProcessingFailed(_))
        ));
    }

    #[test]
    fn missing_avif_is_io_error() {
        assert!(matches!(
            decode_avif(Path::new("/nonexistent/a.avif")),
            Err(BackendError::Io(_))
        ));
    }
}
