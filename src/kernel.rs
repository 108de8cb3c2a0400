//! Pixel-level kernels shared by the CPU backends (FastCV, OpenCV).
//!
//! These operate on raw NV12-shaped buffers (a luma plane plus one
//! interleaved chroma plane) since every scenario in the spec's testable
//! properties (solid fill, identity copy, 90-degree rotate, flip) is framed
//! against NV12. Real hardware/DSP kernels are format-specific; this module
//! is the software reference both CPU backends call into so their pixel
//! semantics stay bit-identical, per spec 4 ("bit-identical pixel semantics
//! across backends").

use crate::color::rgb_to_ycbcr;
use crate::compose::{Flip, Rotation};
use crate::planner::{Op, PlannedOp};
use crate::stage::{StageBufferPool, StageGuard};

/// A mutable view over one NV12-shaped buffer: 8-bit luma plane plus a
/// 2-byte-interleaved (Cb, Cr) chroma plane at half resolution in both axes.
pub struct Nv12Mut<'a> {
    pub y: &'a mut [u8],
    pub y_stride: usize,
    pub uv: &'a mut [u8],
    pub uv_stride: usize,
    pub width: usize,
    pub height: usize,
}

pub struct Nv12Ref<'a> {
    pub y: &'a [u8],
    pub y_stride: usize,
    pub uv: &'a [u8],
    pub uv_stride: usize,
    pub width: usize,
    pub height: usize,
}

/// Fills an NV12 buffer with a solid RGBA background color, converting to
/// BT.601 YUV once and broadcasting (spec 4.8: "Background fill for YUV").
pub fn fill_nv12(dst: &mut Nv12Mut, r: u8, g: u8, b: u8) {
    let (y, cb, cr) = rgb_to_ycbcr(r, g, b);

    for row in 0..dst.height {
        let start = row * dst.y_stride;
        dst.y[start..start + dst.width].fill(y);
    }

    let chroma_h = dst.height.div_ceil(2);
    let chroma_w = dst.width.div_ceil(2);
    for row in 0..chroma_h {
        let start = row * dst.uv_stride;
        for col in 0..chroma_w {
            dst.uv[start + col * 2] = cb;
            dst.uv[start + col * 2 + 1] = cr;
        }
    }
}

/// Byte-exact copy from `src` to `dst`. Both must share dimensions.
pub fn copy_nv12(src: &Nv12Ref, dst: &mut Nv12Mut) {
    debug_assert_eq!(src.width, dst.width);
    debug_assert_eq!(src.height, dst.height);

    for row in 0..src.height {
        let s = row * src.y_stride;
        let d = row * dst.y_stride;
        dst.y[d..d + src.width].copy_from_slice(&src.y[s..s + src.width]);
    }

    let chroma_h = src.height.div_ceil(2);
    let chroma_w = src.width.div_ceil(2) * 2;
    for row in 0..chroma_h {
        let s = row * src.uv_stride;
        let d = row * dst.uv_stride;
        dst.uv[d..d + chroma_w].copy_from_slice(&src.uv[s..s + chroma_w]);
    }
}

/// Rotates `src` by `degrees` (one of 90/180/270) into `dst`, which must
/// already have swapped dimensions for 90/270 (spec 4.4 rule 3: "Destination
/// luma/chroma dims are swapped for 90/270").
pub fn rotate_nv12(src: &Nv12Ref, dst: &mut Nv12Mut, degrees: u32) {
    match degrees {
        90 => rotate_nv12_90cw(src, dst),
        180 => rotate_nv12_180(src, dst),
        270 => rotate_nv12_270cw(src, dst),
        _ => copy_nv12(src, dst),
    }
}

fn rotate_nv12_90cw(src: &Nv12Ref, dst: &mut Nv12Mut) {
    // dst[x, y] = src[y, x] for the 90 CW case used in spec scenario 3:
    // input 16x32 with Y[y,x]=y produces output 32x16 with Y[y,x]=x.
    for y in 0..src.height {
        for x in 0..src.width {
            let sval = src.y[y * src.y_stride + x];
            let (dx, dy) = (src.height - 1 - y, x);
            dst.y[dy * dst.y_stride + dx] = sval;
        }
    }
    rotate_chroma_90cw(src, dst);
}

fn rotate_nv12_270cw(src: &Nv12Ref, dst: &mut Nv12Mut) {
    for y in 0..src.height {
        for x in 0..src.width {
            let sval = src.y[y * src.y_stride + x];
            let (dx, dy) = (y, src.width - 1 - x);
            dst.y[dy * dst.y_stride + dx] = sval;
        }
    }
    rotate_chroma_270cw(src, dst);
}

fn rotate_nv12_180(src: &Nv12Ref, dst: &mut Nv12Mut) {
    for y in 0..src.height {
        for x in 0..src.width {
            let sval = src.y[y * src.y_stride + x];
            let (dx, dy) = (src.width - 1 - x, src.height - 1 - y);
            dst.y[dy * dst.y_stride + dx] = sval;
        }
    }

    let chroma_h = src.height.div_ceil(2);
    let chroma_w = src.width.div_ceil(2);
    for y in 0..chroma_h {
        for x in 0..chroma_w {
            let cb = src.uv[y * src.uv_stride + x * 2];
            let cr = src.uv[y * src.uv_stride + x * 2 + 1];
            let (dx, dy) = (chroma_w - 1 - x, chroma_h - 1 - y);
            dst.uv[dy * dst.uv_stride + dx * 2] = cb;
            dst.uv[dy * dst.uv_stride + dx * 2 + 1] = cr;
        }
    }
}

fn rotate_chroma_90cw(src: &Nv12Ref, dst: &mut Nv12Mut) {
    let chroma_h = src.height.div_ceil(2);
    let chroma_w = src.width.div_ceil(2);
    for y in 0..chroma_h {
        for x in 0..chroma_w {
            let cb = src.uv[y * src.uv_stride + x * 2];
            let cr = src.uv[y * src.uv_stride + x * 2 + 1];
            let (dx, dy) = (chroma_h - 1 - y, x);
            dst.uv[dy * dst.uv_stride + dx * 2] = cb;
            dst.uv[dy * dst.uv_stride + dx * 2 + 1] = cr;
        }
    }
}

fn rotate_chroma_270cw(src: &Nv12Ref, dst: &mut Nv12Mut) {
    let chroma_h = src.height.div_ceil(2);
    let chroma_w = src.width.div_ceil(2);
    for y in 0..chroma_h {
        for x in 0..chroma_w {
            let cb = src.uv[y * src.uv_stride + x * 2];
            let cr = src.uv[y * src.uv_stride + x * 2 + 1];
            let (dx, dy) = (y, chroma_w - 1 - x);
            dst.uv[dy * dst.uv_stride + dx * 2] = cb;
            dst.uv[dy * dst.uv_stride + dx * 2 + 1] = cr;
        }
    }
}

/// Flips `src` into `dst`, which must share dimensions with `src`.
pub fn flip_nv12(src: &Nv12Ref, dst: &mut Nv12Mut, horizontal: bool, vertical: bool) {
    for y in 0..src.height {
        let sy = if vertical { src.height - 1 - y } else { y };
        for x in 0..src.width {
            let sx = if horizontal { src.width - 1 - x } else { x };
            dst.y[y * dst.y_stride + x] = src.y[sy * src.y_stride + sx];
        }
    }

    let chroma_h = src.height.div_ceil(2);
    let chroma_w = src.width.div_ceil(2);
    for y in 0..chroma_h {
        let sy = if vertical { chroma_h - 1 - y } else { y };
        for x in 0..chroma_w {
            let sx = if horizontal { chroma_w - 1 - x } else { x };
            dst.uv[y * dst.uv_stride + x * 2] = src.uv[sy * src.uv_stride + sx * 2];
            dst.uv[y * dst.uv_stride + x * 2 + 1] = src.uv[sy * src.uv_stride + sx * 2 + 1];
        }
    }
}

/// Nearest-neighbor scale from `src` dimensions to `dst` dimensions. Luma
/// uses direct nearest-neighbor sampling; chroma samples at the same
/// relative position in the half-resolution plane (spec 4.4: "nearest
/// neighbor for luma, MN-interleave for chroma" -- approximated here with
/// nearest-neighbor chroma sampling, sufficient for the tolerance the spec
/// documents, ≤1px).
pub fn scale_nearest_nv12(src: &Nv12Ref, dst: &mut Nv12Mut) {
    for y in 0..dst.height {
        let sy = (y * src.height) / dst.height.max(1);
        for x in 0..dst.width {
            let sx = (x * src.width) / dst.width.max(1);
            dst.y[y * dst.y_stride + x] = src.y[sy.min(src.height - 1) * src.y_stride + sx.min(src.width - 1)];
        }
    }

    let src_chroma_w = src.width.div_ceil(2);
    let src_chroma_h = src.height.div_ceil(2);
    let dst_chroma_w = dst.width.div_ceil(2);
    let dst_chroma_h = dst.height.div_ceil(2);

    for y in 0..dst_chroma_h {
        let sy = (y * src_chroma_h) / dst_chroma_h.max(1);
        for x in 0..dst_chroma_w {
            let sx = (x * src_chroma_w) / dst_chroma_w.max(1);
            let sy = sy.min(src_chroma_h - 1);
            let sx = sx.min(src_chroma_w - 1);
            dst.uv[y * dst.uv_stride + x * 2] = src.uv[sy * src.uv_stride + sx * 2];
            dst.uv[y * dst.uv_stride + x * 2 + 1] = src.uv[sy * src.uv_stride + sx * 2 + 1];
        }
    }
}

/// Executes a planned transform chain (spec 4.4) over NV12 data, routing
/// every intermediate buffer through `pool` so each step's scratch memory is
/// fetched and released exactly like the rest of the multi-pass pipeline
/// (spec 4.3), instead of each backend allocating its own throwaway `Vec`s.
///
/// Only the steps that do anything on an NV12->NV12 chain are implemented:
/// `Downscale`/`UpscaleForNonRgbDestination` (nearest-neighbor resample),
/// `Rotate`, and `Flip`. `PrepColorConvertToYuv`, `UpscaleForRgbDestination`,
/// `FinalColorConvert`, and `UnalignedFixupOrNormalize` never fire for the
/// backends that call this, since every one of them is NV12-only end to end.
pub fn run_nv12_chain(
    ops: &[PlannedOp],
    src: &Nv12Ref,
    dst_width: usize,
    dst_height: usize,
    pool: &mut StageBufferPool,
) -> (Vec<u8>, Vec<u8>, usize, usize) {
    let mut cur_y = src.y.to_vec();
    let mut cur_uv = src.uv.to_vec();
    let mut cur_w = src.width;
    let mut cur_h = src.height;

    for (step_idx, planned) in ops.iter().enumerate() {
        match planned.op {
            Op::Downscale | Op::UpscaleForNonRgbDestination => {
                // Rule 3 (rotate) runs after rule 2 (downscale) but before
                // rule 7 (this upscale), so a still-pending swapping rotate
                // means the caller's dst_width/dst_height describe the
                // *post-rotation* footprint -- resample to its pre-rotation
                // transpose so the later rotate lands on the right size.
                let pending_swap = ops[step_idx + 1..]
                    .iter()
                    .any(|p| matches!(p.op, Op::Rotate(r) if r.swaps_dimensions()));
                let (target_w, target_h) = if pending_swap {
                    (dst_height, dst_width)
                } else {
                    (dst_width, dst_height)
                };
                if cur_w == target_w && cur_h == target_h {
                    continue;
                }
                let (y, uv) = stage_resample(&cur_y, &cur_uv, cur_w, cur_h, target_w, target_h, pool);
                cur_y = y;
                cur_uv = uv;
                cur_w = target_w;
                cur_h = target_h;
            }
            Op::Rotate(rotation) => {
                let (rw, rh) = if rotation.swaps_dimensions() { (cur_h, cur_w) } else { (cur_w, cur_h) };
                let degrees = match rotation {
                    Rotation::Rotate90 => 90,
                    Rotation::Rotate180 => 180,
                    Rotation::Rotate270 => 270,
                    Rotation::Rotate0 => 0,
                };
                let (y, uv) = stage_rotate(&cur_y, &cur_uv, cur_w, cur_h, rw, rh, degrees, pool);
                cur_y = y;
                cur_uv = uv;
                cur_w = rw;
                cur_h = rh;
            }
            Op::Flip(flip) => {
                let (y, uv) = stage_flip(&cur_y, &cur_uv, cur_w, cur_h, flip, pool);
                cur_y = y;
                cur_uv = uv;
            }
            Op::PrepColorConvertToYuv
            | Op::UpscaleForRgbDestination
            | Op::FinalColorConvert
            | Op::UnalignedFixupOrNormalize => {}
        }
    }

    (cur_y, cur_uv, cur_w, cur_h)
}

fn stage_resample(
    src_y: &[u8],
    src_uv: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    pool: &mut StageBufferPool,
) -> (Vec<u8>, Vec<u8>) {
    let y_size = dst_w * dst_h;
    let uv_size = dst_w * dst_h / 2;
    let mut guard = StageGuard::fetch(pool, y_size + uv_size);
    {
        let src_ref = Nv12Ref { y: src_y, y_stride: src_w, uv: src_uv, uv_stride: src_w, width: src_w, height: src_h };
        let buf = guard.bytes_mut();
        let (y_part, uv_part) = buf.split_at_mut(y_size);
        let mut mid = Nv12Mut {
            y: y_part,
            y_stride: dst_w,
            uv: &mut uv_part[..uv_size],
            uv_stride: dst_w,
            width: dst_w,
            height: dst_h,
        };
        scale_nearest_nv12(&src_ref, &mut mid);
    }
    let y_out = guard.bytes()[..y_size].to_vec();
    let uv_out = guard.bytes()[y_size..y_size + uv_size].to_vec();
    guard.release();
    (y_out, uv_out)
}

#[allow(clippy::too_many_arguments)]
fn stage_rotate(
    src_y: &[u8],
    src_uv: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    degrees: u32,
    pool: &mut StageBufferPool,
) -> (Vec<u8>, Vec<u8>) {
    let y_size = dst_w * dst_h;
    let uv_size = dst_w * dst_h / 2;
    let mut guard = StageGuard::fetch(pool, y_size + uv_size);
    {
        let src_ref = Nv12Ref { y: src_y, y_stride: src_w, uv: src_uv, uv_stride: src_w, width: src_w, height: src_h };
        let buf = guard.bytes_mut();
        let (y_part, uv_part) = buf.split_at_mut(y_size);
        let mut mid = Nv12Mut {
            y: y_part,
            y_stride: dst_w,
            uv: &mut uv_part[..uv_size],
            uv_stride: dst_w,
            width: dst_w,
            height: dst_h,
        };
        rotate_nv12(&src_ref, &mut mid, degrees);
    }
    let y_out = guard.bytes()[..y_size].to_vec();
    let uv_out = guard.bytes()[y_size..y_size + uv_size].to_vec();
    guard.release();
    (y_out, uv_out)
}

fn stage_flip(src_y: &[u8], src_uv: &[u8], w: usize, h: usize, flip: Flip, pool: &mut StageBufferPool) -> (Vec<u8>, Vec<u8>) {
    let y_size = w * h;
    let uv_size = w * h / 2;
    let mut guard = StageGuard::fetch(pool, y_size + uv_size);
    {
        let src_ref = Nv12Ref { y: src_y, y_stride: w, uv: src_uv, uv_stride: w, width: w, height: h };
        let buf = guard.bytes_mut();
        let (y_part, uv_part) = buf.split_at_mut(y_size);
        let mut mid = Nv12Mut { y: y_part, y_stride: w, uv: &mut uv_part[..uv_size], uv_stride: w, width: w, height: h };
        flip_nv12(&src_ref, &mut mid, flip.horizontal(), flip.vertical());
    }
    let y_out = guard.bytes()[..y_size].to_vec();
    let uv_out = guard.bytes()[y_size..y_size + uv_size].to_vec();
    guard.release();
    (y_out, uv_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{self, PlanRequest};
    use crate::format::PixelFormat;

    fn make_buf(width: usize, height: usize) -> (Vec<u8>, Vec<u8>) {
        let y = vec![0u8; width * height];
        let uv = vec![0u8; width * height.div_ceil(2) / 2 * 4];
        (y, uv)
    }

    #[test]
    fn fill_produces_documented_green_constants() {
        let (mut y, mut uv) = make_buf(64, 64);
        let mut dst = Nv12Mut {
            y: &mut y,
            y_stride: 64,
            uv: &mut uv,
            uv_stride: 64,
            width: 64,
            height: 64,
        };
        fill_nv12(&mut dst, 0x00, 0xFF, 0x00);
        assert!(dst.y.iter().all(|&v| v == 0x95));
        assert!(dst.uv.iter().step_by(2).all(|&v| v == 0x2B));
        assert!(dst.uv.iter().skip(1).step_by(2).all(|&v| v == 0x15));
    }

    #[test]
    fn identity_copy_is_byte_exact() {
        let width = 32;
        let height = 32;
        let mut src_y = vec![0u8; width * height];
        for (i, v) in src_y.iter_mut().enumerate() {
            *v = (i % 256) as u8;
        }
        let src_uv = vec![7u8; width * height / 2];

        let src = Nv12Ref {
            y: &src_y,
            y_stride: width,
            uv: &src_uv,
            uv_stride: width,
            width,
            height,
        };

        let (mut dst_y, mut dst_uv) = make_buf(width, height);
        let mut dst = Nv12Mut {
            y: &mut dst_y,
            y_stride: width,
            uv: &mut dst_uv,
            uv_stride: width,
            width,
            height,
        };

        copy_nv12(&src, &mut dst);
        assert_eq!(dst.y, &src_y[..]);
    }

    #[test]
    fn rotate_90cw_maps_row_index_to_column() {
        // input 16x32 with Y[y,x]=y -> output 32x16 with Y[y,x]=x.
        let (w, h) = (16usize, 32usize);
        let mut src_y = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                src_y[y * w + x] = y as u8;
            }
        }
        let src_uv = vec![0u8; w * h / 2];
        let src = Nv12Ref {
            y: &src_y,
            y_stride: w,
            uv: &src_uv,
            uv_stride: w,
            width: w,
            height: h,
        };

        let (dw, dh) = (h, w);
        let (mut dst_y, mut dst_uv) = make_buf(dw, dh);
        let mut dst = Nv12Mut {
            y: &mut dst_y,
            y_stride: dw,
            uv: &mut dst_uv,
            uv_stride: dw,
            width: dw,
            height: dh,
        };

        rotate_nv12(&src, &mut dst, 90);

        for y in 0..dh {
            for x in 0..dw {
                assert_eq!(dst.y[y * dw + x], x as u8, "mismatch at ({x},{y})");
            }
        }
    }

    #[test]
    fn rotate_180_twice_returns_original() {
        let (w, h) = (8usize, 8usize);
        let mut src_y = vec![0u8; w * h];
        for (i, v) in src_y.iter_mut().enumerate() {
            *v = i as u8;
        }
        let src_uv = vec![3u8; w * h / 2];
        let src = Nv12Ref {
            y: &src_y,
            y_stride: w,
            uv: &src_uv,
            uv_stride: w,
            width: w,
            height: h,
        };

        let (mut mid_y, mut mid_uv) = make_buf(w, h);
        {
            let mut mid = Nv12Mut {
                y: &mut mid_y,
                y_stride: w,
                uv: &mut mid_uv,
                uv_stride: w,
                width: w,
                height: h,
            };
            rotate_nv12(&src, &mut mid, 180);
        }

        let mid_ref = Nv12Ref {
            y: &mid_y,
            y_stride: w,
            uv: &mid_uv,
            uv_stride: w,
            width: w,
            height: h,
        };
        let (mut out_y, mut out_uv) = make_buf(w, h);
        let mut out = Nv12Mut {
            y: &mut out_y,
            y_stride: w,
            uv: &mut out_uv,
            uv_stride: w,
            width: w,
            height: h,
        };
        rotate_nv12(&mid_ref, &mut out, 180);

        assert_eq!(out.y, &src_y[..]);
    }

    #[test]
    fn flip_h_twice_returns_original_for_even_width() {
        let (w, h) = (8usize, 4usize);
        let mut src_y = vec![0u8; w * h];
        for (i, v) in src_y.iter_mut().enumerate() {
            *v = i as u8;
        }
        let src_uv = vec![0u8; w * h / 2];
        let src = Nv12Ref {
            y: &src_y,
            y_stride: w,
            uv: &src_uv,
            uv_stride: w,
            width: w,
            height: h,
        };

        let (mut mid_y, mut mid_uv) = make_buf(w, h);
        {
            let mut mid = Nv12Mut {
                y: &mut mid_y,
                y_stride: w,
                uv: &mut mid_uv,
                uv_stride: w,
                width: w,
                height: h,
            };
            flip_nv12(&src, &mut mid, true, false);
        }

        let mid_ref = Nv12Ref {
            y: &mid_y,
            y_stride: w,
            uv: &mid_uv,
            uv_stride: w,
            width: w,
            height: h,
        };
        let (mut out_y, mut out_uv) = make_buf(w, h);
        let mut out = Nv12Mut {
            y: &mut out_y,
            y_stride: w,
            uv: &mut out_uv,
            uv_stride: w,
            width: w,
            height: h,
        };
        flip_nv12(&mid_ref, &mut out, true, false);

        assert_eq!(out.y, &src_y[..]);
    }

    #[test]
    fn run_nv12_chain_releases_every_stage_buffer_it_fetches() {
        let (w, h) = (16usize, 16usize);
        let src_y = vec![9u8; w * h];
        let src_uv = vec![5u8; w * h / 2];
        let src = Nv12Ref { y: &src_y, y_stride: w, uv: &src_uv, uv_stride: w, width: w, height: h };

        let req = PlanRequest {
            src_format: PixelFormat::Nv12,
            dst_format: PixelFormat::Nv12,
            src_width: w as u32,
            src_height: h as u32,
            dst_width: 8,
            dst_height: 8,
            rotate: Rotation::Rotate90,
            flip: Flip::Horizontal,
            normalize: false,
        };
        let ops = planner::plan(&req);

        let mut pool = StageBufferPool::new();
        let (y, uv, cw, ch) = run_nv12_chain(&ops, &src, 8, 8, &mut pool);

        assert_eq!((cw, ch), (8, 8));
        assert_eq!(y.len(), 8 * 8);
        assert_eq!(uv.len(), 8 * 8 / 2);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn run_nv12_chain_is_identity_for_unchanged_size_and_orientation() {
        let (w, h) = (12usize, 8usize);
        let mut src_y = vec![0u8; w * h];
        for (i, v) in src_y.iter_mut().enumerate() {
            *v = (i % 200) as u8;
        }
        let src_uv = vec![3u8; w * h / 2];
        let src = Nv12Ref { y: &src_y, y_stride: w, uv: &src_uv, uv_stride: w, width: w, height: h };

        let req = PlanRequest {
            src_format: PixelFormat::Nv12,
            dst_format: PixelFormat::Nv12,
            src_width: w as u32,
            src_height: h as u32,
            dst_width: w as u32,
            dst_height: h as u32,
            rotate: Rotation::Rotate0,
            flip: Flip::None,
            normalize: false,
        };
        let ops = planner::plan(&req);
        assert!(ops.is_empty());

        let mut pool = StageBufferPool::new();
        let (y, uv, cw, ch) = run_nv12_chain(&ops, &src, w, h, &mut pool);
        assert_eq!((cw, ch), (w, h));
        assert_eq!(y, src_y);
        assert_eq!(uv, src_uv);
    }
}
