//! Seams between the dedup gate and the outside world.
//!
//! A [`CaptureSource`] produces frames (screen grabber, external command,
//! test fixture); a [`PersistenceSink`] stores the frames the gate accepts.
//! Both are async and object-safe so the scheduler can hold them as
//! `Arc<dyn ...>`.

use async_trait::async_trait;

use crate::error::CaptureError;
use crate::models::{CaptureDecision, Frame, ReferenceId};

#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Short label for logs (e.g. `"command"`, `"screen"`).
    fn name(&self) -> &str;

    /// Grab one frame. Failures are transient: the caller skips the cycle.
    async fn capture(&self) -> Result<Frame, CaptureError>;
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store an accepted frame and return its reference id.
    ///
    /// Retries, timeouts and partial-write cleanup are the sink's concern.
    async fn store(
        &self,
        frame: Frame,
        decision: &CaptureDecision,
    ) -> Result<ReferenceId, CaptureError>;
}
