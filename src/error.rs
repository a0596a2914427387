//! Error types for Stepflux

use thiserror::Error;

use crate::types::SampleKind;

/// Per-sample errors.
///
/// None of these are fatal: the engine counts the failure, drops the sample
/// and keeps processing the stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("Malformed {kind} sample: {reason}")]
    MalformedSample { kind: SampleKind, reason: String },

    #[error("Out-of-order sample: timestamp {timestamp_ms} ms is before last processed {last_timestamp_ms} ms")]
    OutOfOrderSample {
        timestamp_ms: i64,
        last_timestamp_ms: i64,
    },

    #[error("Step counter regressed from {previous} to {current}, baseline reseeded")]
    CounterRegression { previous: f64, current: f64 },
}

impl SampleError {
    pub(crate) fn malformed(kind: SampleKind, reason: impl Into<String>) -> Self {
        SampleError::MalformedSample {
            kind,
            reason: reason.into(),
        }
    }

    /// Short machine-readable code, used in logs and reports
    pub fn code(&self) -> &'static str {
        match self {
            SampleError::MalformedSample { .. } => "malformed_sample",
            SampleError::OutOfOrderSample { .. } => "out_of_order_sample",
            SampleError::CounterRegression { .. } => "counter_regression",
        }
    }
}

/// Errors raised by the API surface (configuration, persistence, sessions)
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("Tracking session has not been started")]
    SessionNotStarted,

    #[error("Session worker has stopped")]
    WorkerStopped,
}
