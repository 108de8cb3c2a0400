#![forbid(unsafe_code)]

//! # vconv-engine
//!
//! A multi-backend 2D video compositor: blit, scale, rotate, flip, and
//! color-convert video frames across four interchangeable backends (C2D
//! hardware blitter, GLES/IB2C async engine, FastCV CPU/DSP, and an OpenCV
//! reference implementation), plus a Cairo-based vector overlay subsystem
//! for annotating frames with text, images, masks, graphs, and arrows.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vconv_engine::prelude::*;
//!
//! # fn main() -> ConverterResult<()> {
//! let mut engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
//! let mut compositions: Vec<Composition> = Vec::new();
//! engine.compose(&mut compositions)?;
//! engine.flush();
//! # Ok(()) }
//! ```
//!
//! ## Modules
//! - [`format`] — pixel format registry and conversion-kernel lookup
//! - [`geometry`] — rectangles, quadrilaterals, painted-area accounting
//! - [`color`] — BT.601 RGB/YCbCr conversion
//! - [`frame`] — borrowed video frame/plane descriptors
//! - [`compose`] — blit/composition request types and wire flags
//! - [`surface`] — dmabuf fd to backend surface mapping
//! - [`stage`] — reusable scratch buffer pool for multi-pass transforms
//! - [`planner`] — deterministic per-blit transform op ordering
//! - [`fence`] — async completion handles
//! - [`driver`] — native driver lifecycle and DMA sync guards
//! - [`kernel`] — shared CPU pixel kernels (fill/copy/rotate/flip/scale)
//! - [`backend`] — the `ConverterBackend` trait and its four implementations
//! - [`overlay`] — vector overlay items (feature `overlay`)

pub mod backend;
pub mod color;
pub mod compose;
pub mod config;
pub mod driver;
pub mod error;
pub mod fence;
pub mod format;
pub mod frame;
pub mod geometry;
pub mod kernel;
pub mod planner;
pub mod stage;
pub mod surface;

#[cfg(feature = "overlay")]
pub mod overlay;

use std::sync::Mutex;

use backend::c2d::C2dBackend;
use backend::fastcv::FastCvBackend;
use backend::gles::GlesBackend;
use backend::opencv::OpenCvBackend;
use backend::{ConverterBackend, EngineState};
use compose::Composition;
use config::EngineSettings;
use error::ConverterResult;
use fence::Fence;

/// Selects which concrete backend a [`ConverterEngine`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    C2d,
    Gles,
    FastCv,
    OpenCv,
}

/// Top-level entry point: owns one boxed backend behind a mutex so
/// `compose`/`wait_fence`/`flush` can be called from any thread while still
/// being serialized per spec 5 ("The engine's public API... is serialized by
/// a per-engine mutex").
pub struct ConverterEngine {
    backend: Mutex<Box<dyn ConverterBackend + Send>>,
}

impl ConverterEngine {
    pub fn new(kind: BackendKind, settings: EngineSettings) -> Self {
        let backend: Box<dyn ConverterBackend + Send> = match kind {
            BackendKind::C2d => Box::new(C2dBackend::new(settings)),
            BackendKind::Gles => Box::new(GlesBackend::new(settings)),
            BackendKind::FastCv => Box::new(FastCvBackend::new(settings)),
            BackendKind::OpenCv => Box::new(OpenCvBackend::new(settings)),
        };
        Self {
            backend: Mutex::new(backend),
        }
    }

    pub fn compose(&self, compositions: &mut [Composition]) -> ConverterResult<()> {
        self.backend.lock().unwrap().compose(compositions, None)
    }

    pub fn compose_async(
        &self,
        compositions: &mut [Composition],
        fence: &mut Option<Fence>,
    ) -> ConverterResult<()> {
        self.backend.lock().unwrap().compose(compositions, Some(fence))
    }

    pub fn wait_fence(&self, fence: Fence) -> ConverterResult<()> {
        self.backend.lock().unwrap().wait_fence(fence)
    }

    pub fn flush(&self) {
        self.backend.lock().unwrap().flush();
    }

    pub fn state(&self) -> EngineState {
        self.backend.lock().unwrap().state()
    }
}

pub mod prelude {
    pub use crate::backend::{ConverterBackend, EngineState};
    pub use crate::color::rgb_to_ycbcr;
    pub use crate::compose::{Blit, BlitMask, BlitRegion, Composition, Flip, FormatFlags, Rotation, SampleType};
    pub use crate::config::{EngineSettings, FcvOpMode};
    pub use crate::error::{ConverterError, ConverterResult};
    pub use crate::fence::Fence;
    pub use crate::format::{conversion_kernel, ConversionKernel, FormatFamily, PixelFormat};
    pub use crate::frame::{Plane, VideoFrame};
    pub use crate::geometry::{visible_painted_area, Point, Quadrilateral, Rectangle};
    pub use crate::{BackendKind, ConverterEngine};
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame::{Plane, VideoFrame};
    use format::PixelFormat;

    fn nv12_planes(width: u32, height: u32) -> Vec<Plane> {
        vec![
            Plane::new(0, width, width, height),
            Plane::new((width * height) as usize, width, width, height.div_ceil(2)),
        ]
    }

    #[test]
    fn engine_starts_initialized() {
        let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
        assert_eq!(engine.state(), EngineState::Initialized);
    }

    #[test]
    fn engine_runs_a_solid_fill_composition() {
        let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
        let width = 16u32;
        let height = 16u32;
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
        composition.bgcolor = 0x000000FF;

        engine.compose(std::slice::from_mut(&mut composition)).unwrap();
        engine.flush();
        assert_eq!(engine.state(), EngineState::Initialized);
    }
}
