//! Pixel copy primitives for the backing buffer.
//!
//! Every destination rectangle is clipped against the target image; a
//! placement partially or fully outside the buffer copies what fits and
//! never panics. Extraction runs row by row so a disposed buffer stops
//! mid-copy.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::status::CancelToken;

const CHANNELS: usize = 4;

/// Rectangle shared by a source and an extracted frame after clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clip {
    src_x: usize,
    src_y: usize,
    dst_x: usize,
    dst_y: usize,
    width: usize,
    height: usize,
}

/// Clip a `width x height` rectangle placed at `(x, y)` to `bounds`.
fn clip(bounds: (u32, u32), width: u64, height: u64, x: i64, y: i64) -> Option<Clip> {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width as i64).min(bounds.0 as i64);
    let y1 = (y + height as i64).min(bounds.1 as i64);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(Clip {
        src_x: (x0 - x) as usize,
        src_y: (y0 - y) as usize,
        dst_x: x0 as usize,
        dst_y: y0 as usize,
        width: (x1 - x0) as usize,
        height: (y1 - y0) as usize,
    })
}

/// Copy `src` into `dst` with its top-left corner at `(x, y)`.
pub fn blit(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    imageops::replace(dst, src, x, y);
}

/// Nearest-neighbour scale of `src` to `size x size`, placed at `(x, y)`.
///
/// The scaled block always covers the full footprint, whether or not `size`
/// is a multiple of the source size.
pub fn blit_resized(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, size: u32) {
    if size == 0 || src.width() == 0 || src.height() == 0 {
        return;
    }
    if src.dimensions() == (size, size) {
        blit(dst, src, x, y);
        return;
    }
    let scaled = imageops::resize(src, size, size, FilterType::Nearest);
    imageops::replace(dst, &scaled, x, y);
}

/// Clear a rectangle to transparent.
pub fn clear(dst: &mut RgbaImage, x: i64, y: i64, width: u32, height: u32) {
    imageops::replace(dst, &RgbaImage::new(width, height), x, y);
}

/// Copy the region of `src` at `(x, y)` with the size of `out` into `out`.
///
/// Checks `cancel` before each row. Returns `false` if cancelled.
pub fn extract(src: &RgbaImage, x: u32, y: u32, out: &mut RgbaImage, cancel: &CancelToken) -> bool {
    let Some(r) = clip(
        src.dimensions(),
        out.width() as u64,
        out.height() as u64,
        x as i64,
        y as i64,
    ) else {
        return true;
    };
    let src_stride = src.width() as usize * CHANNELS;
    let out_stride = out.width() as usize * CHANNELS;
    let len = r.width * CHANNELS;

    let src_raw = src.as_raw();
    let out_raw: &mut [u8] = out;
    for row in 0..r.height {
        if cancel.is_cancelled() {
            return false;
        }
        let s = (r.dst_y + row) * src_stride + r.dst_x * CHANNELS;
        let d = row * out_stride;
        out_raw[d..d + len].copy_from_slice(&src_raw[s..s + len]);
    }
    true
}

/// Half-resolution extraction: each output pixel averages the colour of
/// `src(x + 2i, y + 2j)` and `src(x + 2i + 1, y + 2j + 1)`.
///
/// Alpha is taken from the first sample. Returns `false` if cancelled.
pub fn downsample_half(
    src: &RgbaImage,
    x: u32,
    y: u32,
    out: &mut RgbaImage,
    cancel: &CancelToken,
) -> bool {
    let (width, height) = out.dimensions();
    for j in 0..height {
        if cancel.is_cancelled() {
            return false;
        }
        let sy = y + j * 2;
        if sy + 1 >= src.height() {
            break;
        }
        for i in 0..width {
            let sx = x + i * 2;
            if sx + 1 >= src.width() {
                break;
            }
            let a = src.get_pixel(sx, sy);
            let b = src.get_pixel(sx + 1, sy + 1);
            out.put_pixel(
                i,
                j,
                Rgba([
                    ((a[0] as u16 + b[0] as u16) / 2) as u8,
                    ((a[1] as u16 + b[1] as u16) / 2) as u8,
                    ((a[2] as u16 + b[2] as u16) / 2) as u8,
                    a[3],
                ]),
            );
        }
    }
    true
}
