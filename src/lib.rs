//! Stepflux - On-device step filtering and distance estimation engine
//!
//! Stepflux consumes a live stream of motion and location samples and decides,
//! sample by sample, whether a step-detector pulse is a genuine walking step:
//! sample classification → motion context → step filter → accumulator → totals.
//!
//! ## Modules
//!
//! - **Engine**: classify samples, filter step pulses, accumulate steps and distance
//! - **Session**: load/save totals, publish snapshots, serialize multi-producer ingestion

pub mod accumulator;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod session;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use engine::StepEngine;
pub use error::{ComputeError, SampleError};
pub use session::{
    JsonFileStore, LatestTotals, MemoryStore, NullSink, SampleSender, SessionReport,
    SessionWorker, TotalsSink, TotalsStore, TrackingSession,
};
pub use types::{
    Diagnostics, MotionContext, Processed, RawSample, Sample, SampleKind, SampleOutcome,
    StepDecision, StepSource, Totals,
};

/// Stepflux version
pub const STEPFLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "stepflux";
