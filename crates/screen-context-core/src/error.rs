//! Error taxonomy for the capture pipeline.
//!
//! None of these errors is fatal to the scheduler: an invalid frame or a
//! failed capture skips one cycle, and a failed save is logged while the
//! accept decision stands.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Malformed or empty pixel data handed to the hasher.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The capture source could not produce a frame this cycle.
    #[error("capture source failed: {0}")]
    Source(String),

    /// An accepted frame could not be saved.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl CaptureError {
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        CaptureError::InvalidFrame(msg.into())
    }

    pub fn source_failed(err: impl std::fmt::Display) -> Self {
        CaptureError::Source(err.to_string())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        CaptureError::Persistence(err.to_string())
    }

    /// Stable label used in structured log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::InvalidFrame(_) => "invalid_frame",
            CaptureError::Source(_) => "capture_source",
            CaptureError::Persistence(_) => "persistence",
        }
    }
}
