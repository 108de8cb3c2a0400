//! Backend Abstraction: the uniform contract every concrete compositor
//! backend implements (spec 4.5), plus the engine lifecycle state machine
//! (spec 4.11).
//!
//! Modeled after the teacher's `RenderBackend` trait
//! (`render/backend.rs` in the reference pack): one trait object the host
//! constructs once, then drives through `compose`/`wait_fence`/`flush`,
//! never branching on the concrete backend except at construction time.

pub mod c2d;
pub mod fastcv;
pub mod gles;
pub mod opencv;

use crate::compose::Composition;
use crate::config::EngineSettings;
use crate::error::ConverterResult;
use crate::fence::Fence;

/// Lifecycle of one backend instance (spec 4.11):
/// `Uninitialized -> Initialized -> Running -> Flushing -> Destroyed`.
/// `Destroyed` is terminal; any call after it returns `ConverterError::Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initialized,
    Running,
    Flushing,
    Destroyed,
}

/// Uniform interface implemented by every concrete backend (C2D, GLES,
/// FastCV, OpenCV). The engine's public API is serialized by a per-engine
/// mutex at the call site that owns a `Box<dyn ConverterBackend>`; backends
/// themselves are free to dispatch to hardware queues asynchronously and
/// signal completion via a returned [`Fence`].
pub trait ConverterBackend {
    /// Submits `compositions` for execution. When `fence` is `Some`, the
    /// backend may return before the work completes and must fill `fence`;
    /// when `None`, `compose` blocks until the output is fully written.
    fn compose(
        &mut self,
        compositions: &mut [Composition],
        fence: Option<&mut Option<Fence>>,
    ) -> ConverterResult<()>;

    /// Blocks until `fence` is signaled. Returns `ConverterError::Closed` for
    /// a fence this backend never issued or already signaled, and
    /// `ConverterError::Timeout` if the internal wait bound elapses first.
    fn wait_fence(&mut self, fence: Fence) -> ConverterResult<()>;

    /// Finishes all pending work and drops cached surfaces/stage buffers.
    /// Per-item failures during flush are logged and swallowed so shutdown
    /// can always complete (spec 4.12).
    fn flush(&mut self);

    fn settings(&self) -> &EngineSettings;

    fn state(&self) -> EngineState;
}

#[cfg(test)]
pub(crate) fn test_settings() -> EngineSettings {
    EngineSettings::default()
}
