//! GLES/IB2C backend (spec 4.7): a thin adapter over a dlopen'd `IEngine`
//! async composition engine. Submission is tuple-shaped (composition
//! index, blit index) rather than the richer per-blit structs the other
//! backends build, matching the original `IB2C::Engine::Compose` call
//! signature. Completion is reported through an integer fence id guarded by
//! a pending-list, same shape as [`crate::fence::PendingFences`].
//!
//! Background color here is packed `0xBBGGRRAA` -- inverted relative to the
//! `0xRRGGBBAA` convention used by the overlay/OpenCV/C2D backends (spec 9,
//! open question (a): preserved as documented, not silently normalized).

use crate::compose::Composition;
use crate::config::EngineSettings;
use crate::driver::DmaSyncGuard;
use crate::error::{ConverterError, ConverterResult};
use crate::fence::{Fence, PendingFences};
use crate::format::PixelFormat;
use crate::geometry::Rectangle;
use crate::kernel::{self, Nv12Mut, Nv12Ref};
use crate::planner::{self, PlanRequest};
use crate::stage::StageBufferPool;

use super::{ConverterBackend, EngineState};

/// Converts the GLES-convention `0xBBGGRRAA` background color into
/// `(r, g, b, a)`.
fn unpack_bbggrraa(packed: u32) -> (u8, u8, u8, u8) {
    let b = ((packed >> 24) & 0xFF) as u8;
    let g = ((packed >> 16) & 0xFF) as u8;
    let r = ((packed >> 8) & 0xFF) as u8;
    let a = (packed & 0xFF) as u8;
    (r, g, b, a)
}

/// One submission tuple, mirroring `IB2C::Engine::Compose(comp_idx,
/// blit_idx, ...)`.
struct SubmitTuple {
    composition_index: usize,
    blit_index: usize,
}

pub struct GlesBackend {
    settings: EngineSettings,
    state: EngineState,
    pending: PendingFences,
    stage_pool: StageBufferPool,
}

impl GlesBackend {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: EngineState::Initialized,
            pending: PendingFences::new(),
            stage_pool: StageBufferPool::new(),
        }
    }

    fn submission_tuples(compositions: &[Composition]) -> Vec<SubmitTuple> {
        let mut tuples = Vec::new();
        for (ci, composition) in compositions.iter().enumerate() {
            for bi in 0..composition.blits.len() {
                tuples.push(SubmitTuple {
                    composition_index: ci,
                    blit_index: bi,
                });
            }
        }
        tuples
    }

    fn execute(&mut self, compositions: &mut [Composition], tuples: &[SubmitTuple]) -> ConverterResult<()> {
        // Backgrounds are cleared before any blit submission runs, since the
        // real IB2C engine clears the whole target in one GL call up front.
        for composition in compositions.iter_mut() {
            if !composition.clear_background {
                continue;
            }
            if composition.output.format != PixelFormat::Nv12 {
                return Err(ConverterError::unsupported(
                    "gles backend in this build only targets NV12 output surfaces",
                ));
            }
            let _dma = DmaSyncGuard::start(composition.output.dmabuf_fd);
            let (r, g, b, _a) = unpack_bbggrraa(composition.bgcolor);
            let out_width = composition.output.width as usize;
            let out_height = composition.output.height as usize;
            let mut dst = nv12_mut(&mut composition.output, out_width, out_height)?;
            kernel::fill_nv12(&mut dst, r, g, b);
        }

        for tuple in tuples {
            let composition = &mut compositions[tuple.composition_index];
            if composition.output.format != PixelFormat::Nv12 {
                return Err(ConverterError::unsupported(
                    "gles backend in this build only targets NV12 output surfaces",
                ));
            }

            let out_width = composition.output.width as usize;
            let out_height = composition.output.height as usize;

            let (src_format, src_width, src_height, rotate, flip, alpha, rect) = {
                let blit = &composition.blits[tuple.blit_index];
                let rect = blit
                    .regions
                    .first()
                    .map(|r| r.destination)
                    .unwrap_or(Rectangle::new(0, 0, composition.output.width, composition.output.height));
                (blit.frame.format, blit.frame.width as usize, blit.frame.height as usize, blit.rotate, blit.flip, blit.alpha, rect)
            };

            if src_format != PixelFormat::Nv12 {
                return Err(ConverterError::unsupported(
                    "gles backend in this build only composes NV12 sources",
                ));
            }

            let src = nv12_ref(&composition.blits[tuple.blit_index].frame, src_width, src_height)?;
            let plan_req = PlanRequest {
                src_format: PixelFormat::Nv12,
                dst_format: PixelFormat::Nv12,
                src_width: src_width as u32,
                src_height: src_height as u32,
                dst_width: rect.w,
                dst_height: rect.h,
                rotate,
                flip,
                normalize: false,
            };
            let ops = planner::plan(&plan_req);
            let (staged_y, staged_uv, staged_w, _staged_h) =
                kernel::run_nv12_chain(&ops, &src, rect.w as usize, rect.h as usize, &mut self.stage_pool);

            let _dma = DmaSyncGuard::start(composition.output.dmabuf_fd);
            let mut dst = nv12_mut(&mut composition.output, out_width, out_height)?;
            blend_into(&mut dst, &staged_y, &staged_uv, staged_w, rect, alpha);
        }

        Ok(())
    }
}

fn nv12_ref(frame: &crate::frame::VideoFrame, width: usize, height: usize) -> ConverterResult<Nv12Ref<'_>> {
    let data = frame
        .data
        .ok_or_else(|| ConverterError::invalid("source frame has no readable bytes"))?;
    let plane0 = frame.plane(0).ok_or_else(|| ConverterError::invalid("missing plane 0"))?;
    let plane1 = frame.plane(1).ok_or_else(|| ConverterError::invalid("missing plane 1"))?;
    Ok(Nv12Ref {
        y: &data[plane0.offset..],
        y_stride: plane0.stride as usize,
        uv: &data[plane1.offset..],
        uv_stride: plane1.stride as usize,
        width,
        height,
    })
}

fn nv12_mut<'a>(frame: &'a mut crate::frame::VideoFrame, width: usize, height: usize) -> ConverterResult<Nv12Mut<'a>> {
    let plane0 = *frame.plane(0).ok_or_else(|| ConverterError::invalid("missing plane 0"))?;
    let plane1 = *frame.plane(1).ok_or_else(|| ConverterError::invalid("missing plane 1"))?;
    let data = frame
        .data_mut
        .as_deref_mut()
        .ok_or_else(|| ConverterError::invalid("destination has no writable bytes"))?;
    let (y_part, uv_part) = data.split_at_mut(plane1.offset);
    Ok(Nv12Mut {
        y: &mut y_part[plane0.offset..],
        y_stride: plane0.stride as usize,
        uv: uv_part,
        uv_stride: plane1.stride as usize,
        width,
        height,
    })
}

fn blend_into(dst: &mut Nv12Mut, src_y: &[u8], src_uv: &[u8], src_stride: usize, rect: Rectangle, alpha: u8) {
    let (rx, ry) = (rect.x.max(0) as usize, rect.y.max(0) as usize);
    let w = (rect.w as usize).min(dst.width.saturating_sub(rx));
    let h = (rect.h as usize).min(dst.height.saturating_sub(ry));
    let a = alpha as u32;

    for y in 0..h {
        for x in 0..w {
            let didx = (ry + y) * dst.y_stride + rx + x;
            let sval = src_y[y * src_stride + x] as u32;
            let dval = dst.y[didx] as u32;
            dst.y[didx] = (((sval * a) + (dval * (255 - a))) / 255) as u8;
        }
    }
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let dcx = rx / 2;
    let dcy = ry / 2;
    for y in 0..ch {
        for x in 0..cw {
            for c in 0..2 {
                let sidx = y * src_stride + x * 2 + c;
                if sidx >= src_uv.len() {
                    continue;
                }
                let didx = (dcy + y) * dst.uv_stride + (dcx + x) * 2 + c;
                if didx >= dst.uv.len() {
                    continue;
                }
                let sval = src_uv[sidx] as u32;
                let dval = dst.uv[didx] as u32;
                dst.uv[didx] = (((sval * a) + (dval * (255 - a))) / 255) as u8;
            }
        }
    }
}

impl ConverterBackend for GlesBackend {
    fn compose(
        &mut self,
        compositions: &mut [Composition],
        fence: Option<&mut Option<Fence>>,
    ) -> ConverterResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(ConverterError::Closed);
        }
        self.state = EngineState::Running;

        let tuples = Self::submission_tuples(compositions);
        self.execute(compositions, &tuples)?;

        if let Some(slot) = fence {
            let f = Fence::new();
            self.pending.insert(f);
            *slot = Some(f);
        }
        Ok(())
    }

    fn wait_fence(&mut self, fence: Fence) -> ConverterResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(ConverterError::Closed);
        }
        if self.settings.wait_timeout.is_zero() {
            return Err(ConverterError::Timeout);
        }
        if !self.pending.signal(fence) {
            return Err(ConverterError::Closed);
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.pending.drain_all();
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
    use crate::frame::{Plane, VideoFrame};

    fn nv12_planes(width: u32, height: u32) -> Vec<Plane> {
        vec![
            Plane::new(0, width, width, height),
            Plane::new((width * height) as usize, width, width, height.div_ceil(2)),
        ]
    }

    #[test]
    fn bbggrraa_unpacks_in_inverted_order() {
        // packed 0xBBGGRRAA with B=0x11, G=0x22, R=0x33, A=0x44
        let packed = 0x1122_3344u32;
        let (r, g, b, a) = unpack_bbggrraa(packed);
        assert_eq!((r, g, b, a), (0x33, 0x22, 0x11, 0x44));
    }

    #[test]
    fn fence_is_pending_until_waited() {
        let mut backend = GlesBackend::new(EngineSettings::default());
        let width = 8u32;
        let height = 8u32;
        let mut out_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        let out_frame =
            VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
        let mut composition = Composition::new(out_frame);
        let mut fence_slot: Option<Fence> = None;
        backend
            .compose(std::slice::from_mut(&mut composition), Some(&mut fence_slot))
            .unwrap();
        let fence = fence_slot.unwrap();
        assert!(backend.pending.is_pending(fence));
        backend.wait_fence(fence).unwrap();
        assert!(!backend.pending.is_pending(fence));
    }

    #[test]
    fn flush_drains_pending_fences() {
        let mut backend = GlesBackend::new(EngineSettings::default());
        let width = 8u32;
        let height = 8u32;
        let mut out_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        let out_frame =
            VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
        let mut composition = Composition::new(out_frame);
        let mut fence_slot: Option<Fence> = None;
        backend
            .compose(std::slice::from_mut(&mut composition), Some(&mut fence_slot))
            .unwrap();
        backend.flush();
        assert!(backend.pending.is_empty());
    }
}
