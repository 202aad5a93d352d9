//! Periodic capture loop around the dedup gate.
//!
//! [`CaptureScheduler`] is a cheaply cloneable handle. Cycles are strictly
//! sequential: the gate's async mutex is held from capture through
//! persistence, whether the cycle came from the timer task or from
//! [`CaptureScheduler::trigger_now`]. Run state, counters and a snapshot of
//! the gate settings sit behind a plain mutex that is never held across an
//! await, so status reads never wait for a cycle in flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use screen_context_core::{CaptureError, CaptureSource, DedupGate, Evaluation, PersistenceSink};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Delay between scheduled cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CaptureCadence {
    Fixed { interval_secs: u64 },
    /// Uniformly random delay in `[min_secs, max_secs]`, drawn per tick.
    Random { min_secs: u64, max_secs: u64 },
}

impl CaptureCadence {
    pub fn validate(&self) -> Result<()> {
        match *self {
            CaptureCadence::Fixed { interval_secs: 0 } => {
                anyhow::bail!("capture interval must be > 0 seconds")
            }
            CaptureCadence::Random { min_secs: 0, .. } => {
                anyhow::bail!("minimum capture interval must be > 0 seconds")
            }
            CaptureCadence::Random { min_secs, max_secs } if min_secs > max_secs => {
                anyhow::bail!(
                    "minimum capture interval ({}s) exceeds maximum ({}s)",
                    min_secs,
                    max_secs
                )
            }
            _ => Ok(()),
        }
    }

    pub fn next_delay(&self) -> Duration {
        match *self {
            CaptureCadence::Fixed { interval_secs } => Duration::from_secs(interval_secs),
            CaptureCadence::Random { min_secs, max_secs } => {
                Duration::from_secs(rand::thread_rng().gen_range(min_secs..=max_secs))
            }
        }
    }
}

/// Snapshot returned by [`CaptureScheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    pub is_running: bool,
    pub cadence: CaptureCadence,
    /// Frames accepted by the gate (saved or not).
    pub captures_count: u64,
    pub duplicates_skipped: u64,
    /// Cycles skipped because the source failed or produced an invalid frame.
    pub failed_cycles: u64,
    /// Capture time of the most recently accepted frame.
    pub last_capture_time: Option<DateTime<Utc>>,
}

/// Dedup gate settings and fill level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateSummary {
    pub enabled: bool,
    pub threshold: u32,
    pub capacity: usize,
    pub fingerprints: usize,
}

impl GateSummary {
    fn of(gate: &DedupGate) -> Self {
        Self {
            enabled: gate.config().enabled,
            threshold: gate.threshold(),
            capacity: gate.store().capacity(),
            fingerprints: gate.store().len(),
        }
    }
}

#[derive(Clone)]
pub struct CaptureScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn CaptureSource>,
    sink: Arc<dyn PersistenceSink>,
    gate: tokio::sync::Mutex<DedupGate>,
    state: Mutex<RunState>,
}

struct RunState {
    cadence: CaptureCadence,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    captures_count: u64,
    duplicates_skipped: u64,
    failed_cycles: u64,
    last_capture_time: Option<DateTime<Utc>>,
    /// Refreshed whenever the gate lock is released.
    gate: GateSummary,
}

impl CaptureScheduler {
    /// `cadence` is what [`status`](Self::status) reports until the first
    /// [`start`](Self::start).
    pub fn new(
        source: Arc<dyn CaptureSource>,
        sink: Arc<dyn PersistenceSink>,
        gate: DedupGate,
        cadence: CaptureCadence,
    ) -> Self {
        let summary = GateSummary::of(&gate);
        Self {
            inner: Arc::new(Inner {
                source,
                sink,
                gate: tokio::sync::Mutex::new(gate),
                state: Mutex::new(RunState {
                    cadence,
                    stop_tx: None,
                    task: None,
                    captures_count: 0,
                    duplicates_skipped: 0,
                    failed_cycles: 0,
                    last_capture_time: None,
                    gate: summary,
                }),
            }),
        }
    }

    /// Start periodic capture. The first cycle runs immediately.
    ///
    /// Returns `Ok(false)` when already running; an invalid cadence is an
    /// error and leaves the scheduler stopped.
    pub fn start(&self, cadence: CaptureCadence) -> Result<bool> {
        cadence.validate()?;

        let mut state = self.lock_state();
        if state.stop_tx.is_some() {
            warn!(source = self.inner.source.name(), "capture already running");
            return Ok(false);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let this = self.clone();
        let task = tokio::spawn(async move { this.run_loop(cadence, stop_rx).await });

        state.cadence = cadence;
        state.stop_tx = Some(stop_tx);
        state.task = Some(task);
        drop(state);

        info!(
            source = self.inner.source.name(),
            cadence = ?cadence,
            "capture started"
        );
        Ok(true)
    }

    /// Stop periodic capture. An in-flight cycle finishes; no new one
    /// starts. Returns `false` when already stopped.
    pub fn stop(&self) -> bool {
        let stop_tx = {
            let mut state = self.lock_state();
            state.task = None;
            state.stop_tx.take()
        };
        match stop_tx {
            Some(tx) => {
                let _ = tx.send(true);
                info!("capture stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the capture task to exit.
    pub async fn shutdown(&self) {
        let task = self.lock_state().task.take();
        self.stop();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "capture task ended abnormally");
            }
        }
    }

    /// Capture and evaluate one frame right now, in either state.
    pub async fn trigger_now(&self) -> Result<Evaluation, CaptureError> {
        self.run_cycle().await
    }

    /// Waits for any in-flight cycle, then applies the new settings.
    pub async fn configure(&self, threshold: Option<u32>, capacity: Option<usize>) -> GateSummary {
        let mut gate = self.inner.gate.lock().await;
        gate.configure(threshold, capacity);
        let summary = GateSummary::of(&gate);
        self.lock_state().gate = summary;
        drop(gate);

        info!(
            threshold = summary.threshold,
            capacity = summary.capacity,
            "dedup gate reconfigured"
        );
        summary
    }

    pub fn status(&self) -> CaptureStatus {
        let state = self.lock_state();
        CaptureStatus {
            is_running: state.stop_tx.is_some(),
            cadence: state.cadence,
            captures_count: state.captures_count,
            duplicates_skipped: state.duplicates_skipped,
            failed_cycles: state.failed_cycles,
            last_capture_time: state.last_capture_time,
        }
    }

    /// Gate settings as of the last completed cycle or `configure`.
    pub fn gate_summary(&self) -> GateSummary {
        self.lock_state().gate
    }

    async fn run_loop(self, cadence: CaptureCadence, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() {
                break;
            }

            // Failures are logged and counted inside run_cycle.
            let _ = self.run_cycle().await;

            let delay = cadence.next_delay();
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_cycle(&self) -> Result<Evaluation, CaptureError> {
        let mut gate = self.inner.gate.lock().await;

        let outcome = match self.inner.source.capture().await {
            Ok(frame) => gate.evaluate(frame, self.inner.sink.as_ref()).await,
            Err(e) => Err(e),
        };
        let summary = GateSummary::of(&gate);
        drop(gate);

        let mut state = self.lock_state();
        state.gate = summary;
        match &outcome {
            Ok(evaluation) if evaluation.decision.accepted => {
                state.captures_count += 1;
                state.last_capture_time = Some(evaluation.decision.captured_at);
                info!(
                    captured_at = %evaluation.decision.captured_at,
                    reference_id = ?evaluation.stored_as,
                    distance = ?evaluation.decision.nearest_distance,
                    "screenshot captured"
                );
            }
            Ok(_) => state.duplicates_skipped += 1,
            Err(e) => {
                state.failed_cycles += 1;
                warn!(
                    source = self.inner.source.name(),
                    kind = e.kind(),
                    error = %e,
                    "capture cycle skipped"
                );
            }
        }

        outcome
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        // A panic while holding this lock cannot leave the counters invalid.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
