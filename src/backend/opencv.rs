//! OpenCV reference backend (spec 4.9): synchronous, CPU-only, the simplest
//! backend in the crate. It exists to give the other three something to be
//! checked against and to back the integration tests under `tests/`.
//!
//! Only NV12 is fully supported end to end (scale/rotate/flip/fill); other
//! formats support identity blits only. `YUV<->YUV` (other than identity),
//! `YUV<->GRAY`, and `GRAY<->GRAY` conversions are rejected outright, matching
//! the original engine's `cv::cvtColor` coverage, which never registered
//! those pairs.

use crate::compose::{Composition, Flip, Rotation};
use crate::config::EngineSettings;
use crate::driver::DmaSyncGuard;
use crate::error::{ConverterError, ConverterResult};
use crate::fence::Fence;
use crate::format::PixelFormat;
use crate::geometry::{visible_painted_area, Rectangle};
use crate::kernel::{self, Nv12Mut, Nv12Ref};

use super::{ConverterBackend, EngineState};

pub struct OpenCvBackend {
    settings: EngineSettings,
    state: EngineState,
}

impl OpenCvBackend {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: EngineState::Initialized,
        }
    }

    fn reject_unsupported_pair(src: PixelFormat, dst: PixelFormat) -> ConverterResult<()> {
        if src == dst {
            return Ok(());
        }
        let both_yuv = src.is_yuv() && dst.is_yuv();
        let yuv_gray = (src.is_yuv() && dst.is_gray()) || (src.is_gray() && dst.is_yuv());
        let both_gray = src.is_gray() && dst.is_gray();
        if both_yuv || yuv_gray || both_gray {
            return Err(ConverterError::unsupported(format!(
                "opencv backend does not register a cvtColor pair for {src:?} -> {dst:?}"
            )));
        }
        Ok(())
    }

    fn nv12_ref(frame: &crate::frame::VideoFrame, width: usize, height: usize) -> ConverterResult<Nv12Ref<'_>> {
        let data = frame
            .data
            .ok_or_else(|| ConverterError::invalid("source frame has no readable bytes"))?;
        let plane0 = frame
            .plane(0)
            .ok_or_else(|| ConverterError::invalid("source frame missing plane 0"))?;
        let plane1 = frame
            .plane(1)
            .ok_or_else(|| ConverterError::invalid("source frame missing plane 1"))?;
        Ok(Nv12Ref {
            y: &data[plane0.offset..],
            y_stride: plane0.stride as usize,
            uv: &data[plane1.offset..],
            uv_stride: plane1.stride as usize,
            width,
            height,
        })
    }

    fn nv12_mut<'a>(
        frame: &'a mut crate::frame::VideoFrame,
        width: usize,
        height: usize,
    ) -> ConverterResult<Nv12Mut<'a>> {
        let plane0 = *frame
            .plane(0)
            .ok_or_else(|| ConverterError::invalid("destination frame missing plane 0"))?;
        let plane1 = *frame
            .plane(1)
            .ok_or_else(|| ConverterError::invalid("destination frame missing plane 1"))?;
        let data = frame
            .data_mut
            .as_deref_mut()
            .ok_or_else(|| ConverterError::invalid("destination frame has no writable bytes"))?;
        let (y_part, uv_part) = if plane1.offset >= plane0.offset {
            data.split_at_mut(plane1.offset)
        } else {
            let (uv, y) = data.split_at_mut(plane0.offset);
            (y, uv)
        };
        Ok(Nv12Mut {
            y: &mut y_part[plane0.offset.min(y_part.len())..],
            y_stride: plane0.stride as usize,
            uv: uv_part,
            uv_stride: plane1.stride as usize,
            width,
            height,
        })
    }

    fn compose_one(&mut self, composition: &mut Composition) -> ConverterResult<()> {
        let out_width = composition.output.width as usize;
        let out_height = composition.output.height as usize;

        if composition.output.format != PixelFormat::Nv12 {
            return self.compose_identity_only(composition);
        }

        let _dma = DmaSyncGuard::start(composition.output.dmabuf_fd);

        let targets: Vec<Rectangle> = composition
            .blits
            .iter()
            .map(|b| {
                b.regions
                    .first()
                    .map(|r| r.destination)
                    .unwrap_or(Rectangle::new(0, 0, composition.output.width, composition.output.height))
            })
            .collect();

        if composition.clear_background {
            let (r, g, b, _a) = unpack_rgba(composition.bgcolor);
            let mut dst = Self::nv12_mut(&mut composition.output, out_width, out_height)?;
            kernel::fill_nv12(&mut dst, r, g, b);
            let painted = visible_painted_area(&targets);
            let total = out_width as u64 * out_height as u64;
            log::debug!(
                target: "vconv::opencv",
                "background fill covers {}px of {}px total",
                total.saturating_sub(painted),
                total
            );
        }

        for blit in &mut composition.blits {
            Self::reject_unsupported_pair(blit.frame.format, PixelFormat::Nv12)?;

            let src_width = blit.frame.width as usize;
            let src_height = blit.frame.height as usize;

            if blit.frame.format != PixelFormat::Nv12 {
                return Err(ConverterError::unsupported(
                    "opencv reference backend only transforms NV12 sources",
                ));
            }

            let dest_rect = blit
                .regions
                .first()
                .map(|r| r.destination)
                .unwrap_or(Rectangle::new(0, 0, composition.output.width, composition.output.height));

            let needs_scale = dest_rect.w as usize != src_width || dest_rect.h as usize != src_height;
            let needs_rotate = blit.rotate != Rotation::Rotate0;
            let needs_flip = blit.flip != Flip::None;

            let src = Self::nv12_ref(&blit.frame, src_width, src_height)?;

            let rotated_dims = if blit.rotate.swaps_dimensions() {
                (src_height, src_width)
            } else {
                (src_width, src_height)
            };

            let mut stage_y = vec![0u8; rotated_dims.0 * rotated_dims.1];
            let mut stage_uv = vec![0u8; rotated_dims.0 * rotated_dims.1.div_ceil(2) / 2 * 2 + rotated_dims.0];
            let staged: Nv12Ref;
            let _owned;

            if needs_rotate {
                let mut mid = Nv12Mut {
                    y: &mut stage_y,
                    y_stride: rotated_dims.0,
                    uv: &mut stage_uv,
                    uv_stride: rotated_dims.0,
                    width: rotated_dims.0,
                    height: rotated_dims.1,
                };
                let degrees = match blit.rotate {
                    Rotation::Rotate90 => 90,
                    Rotation::Rotate180 => 180,
                    Rotation::Rotate270 => 270,
                    Rotation::Rotate0 => 0,
                };
                kernel::rotate_nv12(&src, &mut mid, degrees);
                _owned = (stage_y.clone(), stage_uv.clone());
                staged = Nv12Ref {
                    y: &_owned.0,
                    y_stride: rotated_dims.0,
                    uv: &_owned.1,
                    uv_stride: rotated_dims.0,
                    width: rotated_dims.0,
                    height: rotated_dims.1,
                };
            } else {
                staged = src;
            }

            let mut flipped_y;
            let mut flipped_uv;
            let after_flip: Nv12Ref = if needs_flip {
                flipped_y = vec![0u8; staged.width * staged.height];
                flipped_uv = vec![0u8; staged.width * staged.height / 2];
                {
                    let mut mid = Nv12Mut {
                        y: &mut flipped_y,
                        y_stride: staged.width,
                        uv: &mut flipped_uv,
                        uv_stride: staged.width,
                        width: staged.width,
                        height: staged.height,
                    };
                    kernel::flip_nv12(&staged, &mut mid, blit.flip.horizontal(), blit.flip.vertical());
                }
                Nv12Ref {
                    y: &flipped_y,
                    y_stride: staged.width,
                    uv: &flipped_uv,
                    uv_stride: staged.width,
                    width: staged.width,
                    height: staged.height,
                }
            } else {
                staged
            };

            // Destination sub-rectangle view, scaled if needed.
            let mut dst_full = Self::nv12_mut(&mut composition.output, out_width, out_height)?;
            if needs_scale {
                let mut scaled_y = vec![0u8; dest_rect.w as usize * dest_rect.h as usize];
                let mut scaled_uv = vec![0u8; dest_rect.w as usize * dest_rect.h as usize / 2];
                {
                    let mut mid = Nv12Mut {
                        y: &mut scaled_y,
                        y_stride: dest_rect.w as usize,
                        uv: &mut scaled_uv,
                        uv_stride: dest_rect.w as usize,
                        width: dest_rect.w as usize,
                        height: dest_rect.h as usize,
                    };
                    kernel::scale_nearest_nv12(&after_flip, &mut mid);
                }
                blend_into(&mut dst_full, &scaled_y, &scaled_uv, dest_rect, blit.alpha);
            } else {
                blend_into(&mut dst_full, after_flip.y, after_flip.uv, dest_rect, blit.alpha);
            }
        }

        Ok(())
    }

    /// Fallback path for non-NV12 outputs: only straight identity copies are
    /// supported (no scale/rotate/flip/convert).
    fn compose_identity_only(&mut self, composition: &mut Composition) -> ConverterResult<()> {
        let _dma = DmaSyncGuard::start(composition.output.dmabuf_fd);
        for blit in &composition.blits {
            if blit.frame.format != composition.output.format
                || blit.frame.width != composition.output.width
                || blit.frame.height != composition.output.height
                || blit.rotate != Rotation::Rotate0
                || blit.flip != Flip::None
            {
                return Err(ConverterError::unsupported(
                    "opencv reference backend only supports identity blits for non-NV12 outputs",
                ));
            }
        }

        let src_bytes: Vec<&[u8]> = composition
            .blits
            .iter()
            .filter_map(|b| b.frame.data)
            .collect();
        if let Some(last) = src_bytes.last() {
            if let Some(dst) = composition.output.data_mut.as_deref_mut() {
                let n = dst.len().min(last.len());
                dst[..n].copy_from_slice(&last[..n]);
            }
        }
        Ok(())
    }
}

fn unpack_rgba(packed: u32) -> (u8, u8, u8, u8) {
    let r = ((packed >> 24) & 0xFF) as u8;
    let g = ((packed >> 16) & 0xFF) as u8;
    let b = ((packed >> 8) & 0xFF) as u8;
    let a = (packed & 0xFF) as u8;
    (r, g, b, a)
}

fn blend_into(dst: &mut Nv12Mut, src_y: &[u8], src_uv: &[u8], rect: Rectangle, alpha: u8) {
    let (rx, ry) = (rect.x.max(0) as usize, rect.y.max(0) as usize);
    let w = rect.w as usize;
    let h = rect.h as usize;
    let a = alpha as u32;

    for y in 0..h {
        if ry + y >= dst.height {
            break;
        }
        for x in 0..w {
            if rx + x >= dst.width {
                break;
            }
            let sval = src_y[y * w + x] as u32;
            let didx = (ry + y) * dst.y_stride + rx + x;
            let dval = dst.y[didx] as u32;
            dst.y[didx] = (((sval * a) + (dval * (255 - a))) / 255) as u8;
        }
    }

    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let dcx = rx / 2;
    let dcy = ry / 2;
    for y in 0..ch {
        if dcy + y >= dst.height.div_ceil(2) {
            break;
        }
        for x in 0..cw {
            if dcx + x >= dst.width.div_ceil(2) {
                break;
            }
            for c in 0..2 {
                let sidx = y * w + x * 2 + c;
                if sidx >= src_uv.len() {
                    continue;
                }
                let sval = src_uv[sidx] as u32;
                let didx = (dcy + y) * dst.uv_stride + (dcx + x) * 2 + c;
                let dval = dst.uv[didx] as u32;
                dst.uv[didx] = (((sval * a) + (dval * (255 - a))) / 255) as u8;
            }
        }
    }
}

impl ConverterBackend for OpenCvBackend {
    fn compose(
        &mut self,
        compositions: &mut [Composition],
        fence: Option<&mut Option<Fence>>,
    ) -> ConverterResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(ConverterError::Closed);
        }
        self.state = EngineState::Running;

        for composition in compositions.iter_mut() {
            self.compose_one(composition)?;
        }

        // Synchronous backend: work is already complete by the time we
        // return, so a requested fence is signaled immediately rather than
        // left pending.
        if let Some(slot) = fence {
            *slot = Some(Fence::new());
        }

        Ok(())
    }

    fn wait_fence(&mut self, _fence: Fence) -> ConverterResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(ConverterError::Closed);
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.state = EngineState::Flushing;
        self.state = EngineState::Initialized;
    }

    fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn state(&self) -> EngineState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::rgb_to_ycbcr;
    use crate::frame::{Plane, VideoFrame};

    fn nv12_planes(width: u32, height: u32) -> Vec<Plane> {
        vec![
            Plane::new(0, width, width, height),
            Plane::new((width * height) as usize, width, width, height.div_ceil(2)),
        ]
    }

    #[test]
    fn solid_fill_produces_documented_constants() {
        let mut backend = OpenCvBackend::new(EngineSettings::default());
        let width = 32u32;
        let height = 32u32;
        let mut out_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        let out_frame = VideoFrame::from_bytes_mut(
            PixelFormat::Nv12,
            width,
            height,
            nv12_planes(width, height),
            &mut out_bytes,
            None,
        );
        let mut composition = Composition::new(out_frame);
        composition.clear_background = true;
        composition.bgcolor = 0x00FF00FF; // green, alpha 0xFF, RRGGBBAA packing

        backend.compose(std::slice::from_mut(&mut composition), None).unwrap();

        let (y, cb, cr) = rgb_to_ycbcr(0x00, 0xFF, 0x00);
        assert!(out_bytes[..(width * height) as usize].iter().all(|&v| v == y));
        let uv = &out_bytes[(width * height) as usize..];
        assert!(uv.iter().step_by(2).all(|&v| v == cb));
        assert!(uv.iter().skip(1).step_by(2).all(|&v| v == cr));
    }

    #[test]
    fn identity_blit_is_byte_exact() {
        let mut backend = OpenCvBackend::new(EngineSettings::default());
        let width = 16u32;
        let height = 16u32;
        let mut src_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        for (i, v) in src_bytes.iter_mut().enumerate() {
            *v = (i % 251) as u8;
        }
        let src_bytes_copy = src_bytes.clone();
        let src_frame = VideoFrame::from_bytes(
            PixelFormat::Nv12,
            width,
            height,
            nv12_planes(width, height),
            &src_bytes,
            None,
        );

        let mut out_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        let out_frame = VideoFrame::from_bytes_mut(
            PixelFormat::Nv12,
            width,
            height,
            nv12_planes(width, height),
            &mut out_bytes,
            None,
        );

        let mut composition = Composition::new(out_frame);
        composition.blits.push(crate::compose::Blit::new(src_frame));

        backend.compose(std::slice::from_mut(&mut composition), None).unwrap();

        assert_eq!(out_bytes, src_bytes_copy);
    }

    #[test]
    fn yuv_to_yuv_cross_format_conversion_is_rejected() {
        assert!(OpenCvBackend::reject_unsupported_pair(PixelFormat::Nv12, PixelFormat::I420).is_err());
        assert!(OpenCvBackend::reject_unsupported_pair(PixelFormat::Nv12, PixelFormat::Gray8).is_err());
        assert!(OpenCvBackend::reject_unsupported_pair(PixelFormat::Gray8, PixelFormat::Gray8).is_ok());
    }

    #[test]
    fn compose_after_destroyed_state_is_closed() {
        let mut backend = OpenCvBackend::new(EngineSettings::default());
        backend.state = EngineState::Destroyed;
        let mut out_bytes = vec![0u8; 384];
        let out_frame =
            VideoFrame::from_bytes_mut(PixelFormat::Nv12, 16, 16, nv12_planes(16, 16), &mut out_bytes, None);
        let mut composition = Composition::new(out_frame);
        let err = backend.compose(std::slice::from_mut(&mut composition), None);
        assert!(err.is_err());
    }
}
