//! Error taxonomy for the compositor engine.
//!
//! Mirrors the six error kinds called out in the engine's failure semantics:
//! malformed requests, unsupported format pairs, resource exhaustion, native
//! driver failures, fence timeouts, and use-after-free.

use thiserror::Error;

/// Result alias used by every fallible public operation in this crate.
pub type ConverterResult<T> = Result<T, ConverterError>;

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported format conversion: {0}")]
    UnsupportedFormat(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("driver error: {0}")]
    DriverError(String),

    #[error("operation timed out")]
    Timeout,

    #[error("engine is closed")]
    Closed,
}

impl ConverterError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConverterError::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        ConverterError::UnsupportedFormat(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        ConverterError::ResourceExhausted(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        ConverterError::DriverError(msg.into())
    }
}
