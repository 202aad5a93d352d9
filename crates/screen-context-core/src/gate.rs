//! The dedup gate: hash a frame, compare it with recent fingerprints, and
//! either drop it as a near-duplicate or hand it to the persistence sink.
//!
//! # Decision rule
//!
//! | Store state | Nearest distance `d` | Decision |
//! |-------------|----------------------|----------|
//! | empty       | (infinite)           | accept   |
//! | non-empty   | `d <= threshold`     | reject   |
//! | non-empty   | `d > threshold`      | accept   |
//!
//! The threshold is inclusive; a lower threshold is stricter about what
//! counts as a duplicate. With deduplication disabled every frame is
//! accepted.
//!
//! The store is only mutated on accept. If the sink fails, the fingerprint
//! is still recorded (without a reference id) so later copies of the same
//! screen are not retried over and over.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::hasher::PerceptualHasher;
use crate::models::{CaptureDecision, Frame, HashRecord, ReferenceId};
use crate::pipeline::PersistenceSink;
use crate::store::HashStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Maximum Hamming distance still treated as a duplicate.
    pub threshold: u32,
    /// Number of recent fingerprints retained.
    pub capacity: usize,
    /// Optional age bound on retained fingerprints.
    pub max_age: Option<Duration>,
    /// When false, every frame is accepted.
    pub enabled: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            capacity: 500,
            max_age: None,
            enabled: true,
        }
    }
}

/// Result of [`DedupGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub decision: CaptureDecision,
    /// Reference id from the sink for accepted frames that were saved.
    pub stored_as: Option<ReferenceId>,
}

pub struct DedupGate {
    hasher: PerceptualHasher,
    store: HashStore,
    config: GateConfig,
}

impl DedupGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            hasher: PerceptualHasher::new(),
            store: HashStore::new(config.capacity, config.max_age),
            config,
        }
    }

    /// Hash the frame and decide, without touching the store.
    pub fn assess(&self, frame: &Frame) -> Result<CaptureDecision, CaptureError> {
        let fingerprint = self.hasher.hash(frame)?;
        let nearest = self.store.nearest(&fingerprint);

        let nearest_distance = nearest.map(|(d, _)| d);
        let matched_reference = nearest.and_then(|(_, rec)| rec.reference_id);
        let accepted = match nearest_distance {
            _ if !self.config.enabled => true,
            None => true,
            Some(d) => d > self.config.threshold,
        };

        Ok(CaptureDecision {
            accepted,
            nearest_distance,
            matched_reference,
            fingerprint,
            captured_at: frame.captured_at(),
        })
    }

    /// Run one frame through the gate, forwarding it to `sink` on accept.
    ///
    /// Only an invalid frame is returned as an error. A sink failure is
    /// logged and the accept stands.
    pub async fn evaluate(
        &mut self,
        frame: Frame,
        sink: &dyn PersistenceSink,
    ) -> Result<Evaluation, CaptureError> {
        self.store.prune_expired(frame.captured_at());
        let decision = self.assess(&frame)?;

        if !decision.accepted {
            debug!(
                captured_at = %decision.captured_at,
                distance = ?decision.nearest_distance,
                matched = ?decision.matched_reference,
                "duplicate frame skipped"
            );
            return Ok(Evaluation {
                decision,
                stored_as: None,
            });
        }

        let stored_as = match sink.store(frame, &decision).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(
                    captured_at = %decision.captured_at,
                    kind = err.kind(),
                    error = %err,
                    "accepted frame was not saved"
                );
                None
            }
        };

        self.store.insert(HashRecord::new(
            decision.fingerprint,
            decision.captured_at,
            stored_as,
        ));

        Ok(Evaluation {
            decision,
            stored_as,
        })
    }

    /// Adjust the threshold and/or capacity at runtime.
    pub fn configure(&mut self, threshold: Option<u32>, capacity: Option<usize>) {
        if let Some(threshold) = threshold {
            self.config.threshold = threshold;
        }
        if let Some(capacity) = capacity {
            self.config.capacity = capacity;
            self.store.set_capacity(capacity);
        }
    }

    /// Preload records from a previous run, oldest first.
    pub fn seed(&mut self, records: impl IntoIterator<Item = HashRecord>) {
        for record in records {
            self.store.insert(record);
        }
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn store(&self) -> &HashStore {
        &self.store
    }
}
