//! Engine-wide configuration.
//!
//! Passed to [`crate::backend::ConverterBackend::new`] as the `settings`
//! argument from spec section 4.5. Kept deliberately small: this crate does
//! not parse JSON or any other on-disk config format (that is the host
//! pipeline's job), it only defines the in-memory knobs the backends read.

/// Operational mode for the FastCV-style CPU/DSP backend.
///
/// Mirrors `GstFcvOpMode` / `GST_VCE_OPT_FCV_OP_MODE` from the original
/// engine: trades power consumption against throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FcvOpMode {
    #[default]
    LowPower,
    Performance,
    CpuOffload,
    CpuPerformance,
}

/// Settings shared by every backend.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Whether the Surface Manager should cache surfaces by fd across calls.
    /// When `false`, callers must destroy each surface after a single use.
    pub cache_surfaces: bool,

    /// Enables the C2D "opportunistic reuse" composition cache (spec 4.6
    /// step 2). Exposed as a toggle so deterministic tests can disable it.
    pub opportunistic_reuse: bool,

    /// FastCV backend operating mode.
    pub fcv_op_mode: FcvOpMode,

    /// Internal fence-wait timeout used by async backends.
    pub wait_timeout: std::time::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_surfaces: true,
            opportunistic_reuse: true,
            fcv_op_mode: FcvOpMode::default(),
            wait_timeout: std::time::Duration::from_millis(500),
        }
    }
}
