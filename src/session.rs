//! Tracking sessions
//!
//! The collaborator boundary around [`StepEngine`]: totals are loaded from a
//! store when a session starts, every totals change is published to a sink
//! and saved, and the final totals are handed back when the session stops.
//!
//! [`SessionWorker`] moves a session onto a dedicated thread fed by a bounded
//! channel, so several producers (step, accelerometer and location streams)
//! can push samples while a single consumer mutates engine state.

use crate::config::EngineConfig;
use crate::engine::StepEngine;
use crate::error::{ComputeError, SampleError};
use crate::types::{Diagnostics, Processed, RawSample, SampleOutcome, Totals};
use async_channel::{bounded, Receiver, Sender};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default capacity of the worker's inbound sample queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Receives totals snapshots. Implementations should always display the latest.
pub trait TotalsSink {
    fn publish(&mut self, totals: &Totals);
}

impl<F: FnMut(&Totals)> TotalsSink for F {
    fn publish(&mut self, totals: &Totals) {
        self(totals)
    }
}

/// Sink that discards every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TotalsSink for NullSink {
    fn publish(&mut self, _totals: &Totals) {}
}

/// Shared cell holding the most recent snapshot
#[derive(Debug, Clone, Default)]
pub struct LatestTotals {
    inner: Arc<Mutex<Option<Totals>>>,
}

impl LatestTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Totals> {
        self.inner.lock().ok().and_then(|guard| *guard)
    }
}

impl TotalsSink for LatestTotals {
    fn publish(&mut self, totals: &Totals) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(*totals);
        }
    }
}

/// Durable home of the last known totals
pub trait TotalsStore {
    fn load(&self) -> Result<Totals, ComputeError>;
    fn save(&self, totals: &Totals) -> Result<(), ComputeError>;
}

/// In-memory store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Totals>>,
}

impl MemoryStore {
    pub fn new(totals: Totals) -> Self {
        Self {
            inner: Arc::new(Mutex::new(totals)),
        }
    }

    pub fn snapshot(&self) -> Totals {
        self.inner.lock().map(|guard| *guard).unwrap_or_default()
    }
}

impl TotalsStore for MemoryStore {
    fn load(&self) -> Result<Totals, ComputeError> {
        Ok(self.snapshot())
    }

    fn save(&self, totals: &Totals) -> Result<(), ComputeError> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = *totals;
        }
        Ok(())
    }
}

/// JSON file store. A missing file loads as zeroed totals.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TotalsStore for JsonFileStore {
    fn load(&self) -> Result<Totals, ComputeError> {
        if !self.path.exists() {
            return Ok(Totals::default());
        }
        let json = std::fs::read_to_string(&self.path)?;
        Totals::from_json(&json).map_err(|e| {
            ComputeError::ParseError(format!("{}: {}", self.path.display(), e))
        })
    }

    fn save(&self, totals: &Totals) -> Result<(), ComputeError> {
        std::fs::write(&self.path, totals.to_json()?)?;
        Ok(())
    }
}

/// Summary returned when a session stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub totals: Totals,
    pub diagnostics: Diagnostics,
}

/// One tracking session: an engine wired to a sink and a store
pub struct TrackingSession<K: TotalsSink, S: TotalsStore> {
    session_id: String,
    config: EngineConfig,
    engine: Option<StepEngine>,
    sink: K,
    store: S,
    started_at: Option<DateTime<Utc>>,
    paused: bool,
    paused_drops: u64,
}

impl<K: TotalsSink, S: TotalsStore> TrackingSession<K, S> {
    /// Create a session; nothing is loaded until [`start`](Self::start)
    pub fn new(config: EngineConfig, sink: K, store: S) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            config,
            engine: None,
            sink,
            store,
            started_at: None,
            paused: false,
            paused_drops: 0,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Samples dropped while paused
    pub fn paused_drops(&self) -> u64 {
        self.paused_drops
    }

    pub fn engine(&self) -> Option<&StepEngine> {
        self.engine.as_ref()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Load persisted totals, seed the engine and publish the starting totals
    pub fn start(&mut self) -> Result<Totals, ComputeError> {
        let totals = self.store.load()?;
        self.engine = Some(StepEngine::with_totals(self.config.clone(), totals));
        self.started_at = Some(Utc::now());
        self.paused = false;
        info!(
            session_id = %self.session_id,
            step_count = totals.step_count,
            step_source = ?self.config.step_source,
            "tracking session started"
        );
        self.sink.publish(&totals);
        Ok(totals)
    }

    /// Stop feeding the engine without ending the session
    pub fn pause(&mut self) {
        if !self.paused {
            debug!(session_id = %self.session_id, "tracking session paused");
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            debug!(session_id = %self.session_id, "tracking session resumed");
        }
        self.paused = false;
    }

    /// Feed one raw sample.
    ///
    /// Returns `Ok(None)` while paused. Sample errors are returned to the
    /// caller for reporting; the session keeps accepting samples.
    pub fn ingest(&mut self, raw: &RawSample) -> Result<Option<Processed>, ComputeError> {
        let engine = self.engine.as_mut().ok_or(ComputeError::SessionNotStarted)?;
        if self.paused {
            self.paused_drops += 1;
            // Counter readings still move the baseline so paused steps are never credited
            if let Some(totals) = engine.rebase_counter(raw) {
                self.persist(&totals);
            }
            return Ok(None);
        }

        let processed = match engine.ingest(raw) {
            Ok(processed) => processed,
            Err(e) => {
                if matches!(e, SampleError::CounterRegression { .. }) {
                    let totals = engine.totals();
                    self.persist(&totals);
                }
                return Err(e.into());
            }
        };

        match processed.totals {
            Some(totals) => {
                self.sink.publish(&totals);
                self.persist(&totals);
            }
            // Baseline-only change: persisted, not published
            None if processed.outcome == SampleOutcome::CounterBaselineSeeded => {
                let totals = engine.totals();
                self.persist(&totals);
            }
            None => {}
        }
        Ok(Some(processed))
    }

    /// Save totals; failures never reach the sample path
    fn persist(&self, totals: &Totals) {
        if let Err(e) = self.store.save(totals) {
            warn!(session_id = %self.session_id, error = %e, "failed to persist totals");
        }
    }

    /// Final save; hands back the totals and diagnostics
    pub fn stop(&mut self) -> Result<SessionReport, ComputeError> {
        let engine = self.engine.take().ok_or(ComputeError::SessionNotStarted)?;
        let totals = engine.totals();
        if let Err(e) = self.store.save(&totals) {
            warn!(session_id = %self.session_id, error = %e, "failed to persist final totals");
        }

        let report = SessionReport {
            session_id: self.session_id.clone(),
            started_at: self.started_at.take().unwrap_or_else(Utc::now),
            stopped_at: Utc::now(),
            totals,
            diagnostics: engine.diagnostics(),
        };
        info!(
            session_id = %report.session_id,
            step_count = totals.step_count,
            distance_meters = totals.distance_meters,
            dropped = report.diagnostics.dropped(),
            "tracking session stopped"
        );
        Ok(report)
    }
}

/// Producer handle for a [`SessionWorker`]
#[derive(Debug, Clone)]
pub struct SampleSender {
    tx: Sender<RawSample>,
}

impl SampleSender {
    /// Queue a sample, blocking while the queue is full
    pub fn send(&self, sample: RawSample) -> Result<(), ComputeError> {
        self.tx
            .send_blocking(sample)
            .map_err(|_| ComputeError::WorkerStopped)
    }

    /// Queue a sample without blocking; returns false if it was not queued
    pub fn try_send(&self, sample: RawSample) -> bool {
        self.tx.try_send(sample).is_ok()
    }
}

/// A tracking session running on its own thread.
///
/// Producers push through cloned [`SampleSender`]s; the worker drains the
/// queue serially in arrival order.
pub struct SessionWorker {
    tx: Sender<RawSample>,
    handle: Option<JoinHandle<Result<SessionReport, ComputeError>>>,
}

impl SessionWorker {
    /// Start the session and spawn the worker thread
    pub fn spawn<K, S>(
        mut session: TrackingSession<K, S>,
        capacity: usize,
    ) -> Result<Self, ComputeError>
    where
        K: TotalsSink + Send + 'static,
        S: TotalsStore + Send + 'static,
    {
        session.start()?;
        let (tx, rx) = bounded(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name(format!("stepflux-{}", session.session_id()))
            .spawn(move || Self::drain(session, rx))?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    fn drain<K: TotalsSink, S: TotalsStore>(
        mut session: TrackingSession<K, S>,
        rx: Receiver<RawSample>,
    ) -> Result<SessionReport, ComputeError> {
        while let Ok(raw) = rx.recv_blocking() {
            if let Err(e) = session.ingest(&raw) {
                debug!(error = %e, "sample rejected by worker");
            }
        }
        session.stop()
    }

    pub fn sender(&self) -> SampleSender {
        SampleSender {
            tx: self.tx.clone(),
        }
    }

    /// Close the queue, let the worker drain it and collect the report
    pub fn stop(mut self) -> Result<SessionReport, ComputeError> {
        self.tx.close();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ComputeError::WorkerStopped)?,
            None => Err(ComputeError::WorkerStopped),
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.tx.close();
    }
}
