//! # Screen Context Core
//!
//! Runtime-agnostic logic for the capture pipeline: frames, the perceptual
//! hasher, the bounded hash store, and the dedup gate that decides whether
//! a captured frame is new enough to keep.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Capture sources
//! and persistence backends plug in through the traits in [`pipeline`].
//!
//! ```text
//! Frame ──▶ PerceptualHasher ──▶ HashStore::nearest ──▶ DedupGate
//!                                                        │
//!                                    accept ─────────────┴──▶ PersistenceSink
//! ```

pub mod error;
pub mod gate;
pub mod hasher;
pub mod models;
pub mod pipeline;
pub mod store;

pub use error::CaptureError;
pub use gate::{DedupGate, Evaluation, GateConfig};
pub use hasher::PerceptualHasher;
pub use models::{CaptureDecision, Fingerprint, Frame, HashRecord, ReferenceId};
pub use pipeline::{CaptureSource, PersistenceSink};
pub use store::HashStore;
