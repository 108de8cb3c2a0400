//! FastCV CPU/DSP backend (spec 4.8).
//!
//! Mirrors the original engine's scratch array of fixed-capacity `Object`
//! records (`GST_VCE_MAX_OBJECTS = 50` in the source engine) used to stage
//! per-blit work before the single pass that writes the output surface.
//! Dispatch between luma/chroma kernels goes through
//! [`crate::format::conversion_kernel`] rather than the original's arithmetic
//! hash (spec 9 redesign flag).

use crate::compose::{Composition, Flip, Rotation};
use crate::config::{EngineSettings, FcvOpMode};
use crate::driver::DmaSyncGuard;
use crate::error::{ConverterError, ConverterResult};
use crate::fence::Fence;
use crate::format::{conversion_kernel, ConversionKernel, PixelFormat};
use crate::frame::VideoFrame;
use crate::geometry::Rectangle;
use crate::kernel::{self, Nv12Mut, Nv12Ref};
use crate::planner::{self, PlanRequest};
use crate::stage::StageBufferPool;

use super::{ConverterBackend, EngineState};

/// Upper bound on objects staged per `compose` call, matching the original
/// engine's fixed-size scratch array.
pub const MAX_OBJECTS: usize = 50;

/// One staged unit of work: a resolved source/destination pair plus the
/// transform to apply, queued until the single pass that executes them all.
struct Object {
    src_format: PixelFormat,
    dst_format: PixelFormat,
    rotate: Rotation,
    flip: Flip,
    dest_rect: Rectangle,
    alpha: u8,
}

pub struct FastCvBackend {
    settings: EngineSettings,
    state: EngineState,
    objects: Vec<Object>,
    stage_pool: StageBufferPool,
}

impl FastCvBackend {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: EngineState::Initialized,
            objects: Vec::with_capacity(MAX_OBJECTS),
            stage_pool: StageBufferPool::new(),
        }
    }

    /// Operating-mode-dependent note logged once per compose call; real
    /// hardware builds would route to the DSP queue here under
    /// `CpuOffload`/`CpuPerformance`.
    fn log_op_mode(&self) {
        match self.settings.fcv_op_mode {
            FcvOpMode::LowPower => log::debug!(target: "vconv::fastcv", "running in low-power mode"),
            FcvOpMode::Performance => log::debug!(target: "vconv::fastcv", "running in performance mode"),
            FcvOpMode::CpuOffload => log::debug!(target: "vconv::fastcv", "offloading to DSP queue"),
            FcvOpMode::CpuPerformance => log::debug!(target: "vconv::fastcv", "running CPU at max performance"),
        }
    }

    fn stage_objects(&mut self, composition: &Composition) -> ConverterResult<()> {
        self.objects.clear();
        if composition.blits.len() > MAX_OBJECTS {
            return Err(ConverterError::exhausted(format!(
                "composition has {} blits, exceeds the {} object scratch array",
                composition.blits.len(),
                MAX_OBJECTS
            )));
        }

        for blit in &composition.blits {
            let dest_rect = blit
                .regions
                .first()
                .map(|r| r.destination)
                .unwrap_or(Rectangle::new(0, 0, composition.output.width, composition.output.height));

            self.objects.push(Object {
                src_format: blit.frame.format,
                dst_format: composition.output.format,
                rotate: blit.rotate,
                flip: blit.flip,
                dest_rect,
                alpha: blit.alpha,
            });
        }
        Ok(())
    }

    fn compose_one(&mut self, composition: &mut Composition) -> ConverterResult<()> {
        self.log_op_mode();
        self.stage_objects(composition)?;

        if composition.output.format != PixelFormat::Nv12 {
            return Err(ConverterError::unsupported(
                "fastcv backend in this build only targets NV12 output surfaces",
            ));
        }

        let out_width = composition.output.width as usize;
        let out_height = composition.output.height as usize;
        let _dma = DmaSyncGuard::start(composition.output.dmabuf_fd);

        if composition.clear_background {
            let (r, g, b, _a) = unpack_rgba(composition.bgcolor);
            let mut dst = nv12_mut(&mut composition.output, out_width, out_height)?;
            kernel::fill_nv12(&mut dst, r, g, b);
        }

        for (i, blit) in composition.blits.iter().enumerate() {
            let obj = &self.objects[i];

            match conversion_kernel(obj.src_format, obj.dst_format) {
                Some(ConversionKernel::Identity) => {}
                Some(_) => {
                    return Err(ConverterError::unsupported(
                        "fastcv CPU path in this build only exercises the identity kernel for NV12",
                    ))
                }
                None => {
                    return Err(ConverterError::unsupported(format!(
                        "no registered kernel for {:?} -> {:?}",
                        obj.src_format, obj.dst_format
                    )))
                }
            }

            let src_width = blit.frame.width as usize;
            let src_height = blit.frame.height as usize;
            let src = nv12_ref(&blit.frame, src_width, src_height)?;

            // Drive the same eight-rule chain (spec 4.4) every backend plans
            // against, so a mismatched dest rect scales instead of silently
            // cropping.
            let plan_req = PlanRequest {
                src_format: obj.src_format,
                dst_format: obj.dst_format,
                src_width: src_width as u32,
                src_height: src_height as u32,
                dst_width: obj.dest_rect.w,
                dst_height: obj.dest_rect.h,
                rotate: obj.rotate,
                flip: obj.flip,
                normalize: false,
            };
            let ops = planner::plan(&plan_req);
            let (final_y, final_uv, cw, _ch) = kernel::run_nv12_chain(
                &ops,
                &src,
                obj.dest_rect.w as usize,
                obj.dest_rect.h as usize,
                &mut self.stage_pool,
            );

            let mut dst = nv12_mut(&mut composition.output, out_width, out_height)?;
            write_object(&mut dst, &final_y, &final_uv, cw, obj.dest_rect, obj.alpha);
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

fn nv12_ref(frame: &VideoFrame, width: usize, height: usize) -> ConverterResult<Nv12Ref<'_>> {
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

fn nv12_mut<'a>(frame: &'a mut VideoFrame, width: usize, height: usize) -> ConverterResult<Nv12Mut<'a>> {
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

fn write_object(dst: &mut Nv12Mut, src_y: &[u8], src_uv: &[u8], src_stride: usize, rect: Rectangle, alpha: u8) {
    let (rx, ry) = (rect.x.max(0) as usize, rect.y.max(0) as usize);
    let w = (rect.w as usize).min(dst.width.saturating_sub(rx));
    let h = (rect.h as usize).min(dst.height.saturating_sub(ry));
    let a = alpha as u32;

    for y in 0..h {
        for x in 0..w {
            let sval = src_y[y * src_stride + x] as u32;
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

impl ConverterBackend for FastCvBackend {
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
        self.objects.clear();
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
    fn object_count_above_max_is_rejected() {
        let mut backend = FastCvBackend::new(EngineSettings::default());
        let width = 16u32;
        let height = 16u32;
        let mut out_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        let out_frame =
            VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
        let mut composition = Composition::new(out_frame);

        for _ in 0..MAX_OBJECTS + 1 {
            let bytes: &'static [u8] = Box::leak(vec![0u8; (width * height * 3 / 2) as usize].into_boxed_slice());
            let src = VideoFrame::from_bytes(PixelFormat::Nv12, width, height, nv12_planes(width, height), bytes, None);
            composition.blits.push(crate::compose::Blit::new(src));
        }

        let err = backend.compose(std::slice::from_mut(&mut composition), None);
        assert!(err.is_err());
    }

    #[test]
    fn background_fill_matches_bt601_constants() {
        let mut backend = FastCvBackend::new(EngineSettings::default());
        let width = 16u32;
        let height = 16u32;
        let mut out_bytes = vec![0u8; (width * height * 3 / 2) as usize];
        let out_frame =
            VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
        let mut composition = Composition::new(out_frame);
        composition.clear_background = true;
        composition.bgcolor = 0x00FF00FF;

        backend.compose(std::slice::from_mut(&mut composition), None).unwrap();

        let (y, _, _) = crate::color::rgb_to_ycbcr(0x00, 0xFF, 0x00);
        assert!(out_bytes[..(width * height) as usize].iter().all(|&v| v == y));
    }
}
