//! Core types for the Stepflux engine
//!
//! This module defines the data that flows through each stage of the engine:
//! raw wire samples, classified samples, motion context, debounce state and
//! the externally visible totals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor kind carried by a raw sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Discrete step-detector pulse (one event per detected step)
    StepPulse,
    /// Raw accelerometer vector (m/s²)
    Accelerometer,
    /// Cumulative step counter reading (steps since boot)
    StepCounter,
    /// Location fix carrying ground speed (m/s)
    Location,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::StepPulse => "step_pulse",
            SampleKind::Accelerometer => "accelerometer",
            SampleKind::StepCounter => "step_counter",
            SampleKind::Location => "location",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw sample as delivered by a sensor or location source.
///
/// The shape follows platform sensor events: a sensor kind, a timestamp and
/// a flat array of values whose meaning depends on the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Sensor kind
    pub kind: SampleKind,
    /// Monotonic timestamp (milliseconds)
    pub timestamp_ms: i64,
    /// Sensor values
    #[serde(default)]
    pub values: Vec<f64>,
}

impl RawSample {
    pub fn new(kind: SampleKind, timestamp_ms: i64, values: Vec<f64>) -> Self {
        Self {
            kind,
            timestamp_ms,
            values,
        }
    }

    pub fn step_pulse(timestamp_ms: i64) -> Self {
        Self::new(SampleKind::StepPulse, timestamp_ms, vec![1.0])
    }

    pub fn accelerometer(timestamp_ms: i64, x: f64, y: f64, z: f64) -> Self {
        Self::new(SampleKind::Accelerometer, timestamp_ms, vec![x, y, z])
    }

    pub fn step_counter(timestamp_ms: i64, cumulative_value: f64) -> Self {
        Self::new(SampleKind::StepCounter, timestamp_ms, vec![cumulative_value])
    }

    pub fn location(timestamp_ms: i64, speed_mps: f64) -> Self {
        Self::new(SampleKind::Location, timestamp_ms, vec![speed_mps])
    }
}

/// Step-detector pulse
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepPulse {
    pub timestamp: i64,
}

/// Classified, validated sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    StepPulse(StepPulse),
    AccelVector {
        x: f64,
        y: f64,
        z: f64,
        timestamp: i64,
    },
    CounterSnapshot {
        cumulative_value: f64,
        timestamp: i64,
    },
    LocationFix {
        speed_mps: f64,
        timestamp: i64,
    },
}

impl Sample {
    pub fn timestamp(&self) -> i64 {
        match self {
            Sample::StepPulse(pulse) => pulse.timestamp,
            Sample::AccelVector { timestamp, .. }
            | Sample::CounterSnapshot { timestamp, .. }
            | Sample::LocationFix { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            Sample::StepPulse(_) => SampleKind::StepPulse,
            Sample::AccelVector { .. } => SampleKind::Accelerometer,
            Sample::CounterSnapshot { .. } => SampleKind::StepCounter,
            Sample::LocationFix { .. } => SampleKind::Location,
        }
    }
}

/// Latest motion context derived from accelerometer and location samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionContext {
    /// Magnitude of the latest accelerometer vector (m/s²)
    pub last_accel_magnitude: f64,
    /// Latest magnitude exceeded the shake threshold
    pub is_shaking: bool,
    /// Latest ground speed (km/h)
    pub last_speed_kmh: f64,
    /// Latest speed exceeded the vehicle threshold
    pub is_likely_vehicle: bool,
}

/// Minimum-interval debounce clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceState {
    pub last_accepted_step_time: Option<i64>,
}

/// Filter verdict for a single step pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDecision {
    Accepted,
    RejectedShaking,
    RejectedVehicle,
    RejectedTooSoon,
}

impl StepDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepDecision::Accepted)
    }
}

/// Authoritative step-counting source for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    /// Count discrete step-detector pulses
    #[default]
    PulseBased,
    /// Count deltas of the cumulative step counter
    CounterBased,
}

/// Running totals, the engine's externally visible state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub step_count: u64,
    pub distance_meters: f64,
    /// Baseline for cumulative counter deltas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cumulative_counter_value: Option<f64>,
}

impl Totals {
    /// Load totals from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Save totals to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// What the engine did with a well-formed, in-order sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum SampleOutcome {
    /// Accelerometer or location sample folded into the motion context
    MotionUpdated,
    /// Step pulse evaluated by the filter
    Step(StepDecision),
    /// First counter snapshot of the session established the baseline
    CounterBaselineSeeded,
    /// Counter delta credited to the step count
    CounterCredited(u64),
    /// Sample belongs to the step source not selected for this session
    IgnoredInactiveSource,
}

/// Result of processing one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Processed {
    pub outcome: SampleOutcome,
    /// New totals snapshot, present only when totals changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
}

/// Diagnostic counters kept by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub samples_processed: u64,
    pub steps_accepted: u64,
    pub rejected_shaking: u64,
    pub rejected_vehicle: u64,
    pub rejected_too_soon: u64,
    pub counter_updates: u64,
    pub malformed_samples: u64,
    pub out_of_order_samples: u64,
    pub counter_regressions: u64,
    pub ignored_inactive_source: u64,
}

impl Diagnostics {
    /// Samples dropped because of an error
    pub fn dropped(&self) -> u64 {
        self.malformed_samples + self.out_of_order_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sample_deserialize() {
        let json = r#"{"kind": "accelerometer", "timestamp_ms": 1200, "values": [0.1, 9.7, 0.4]}"#;
        let raw: RawSample = serde_json::from_str(json).unwrap();

        assert_eq!(raw.kind, SampleKind::Accelerometer);
        assert_eq!(raw.timestamp_ms, 1200);
        assert_eq!(raw.values, vec![0.1, 9.7, 0.4]);
    }

    #[test]
    fn test_raw_sample_values_default_empty() {
        let raw: RawSample =
            serde_json::from_str(r#"{"kind": "step_pulse", "timestamp_ms": 5}"#).unwrap();
        assert!(raw.values.is_empty());
    }

    #[test]
    fn test_totals_json_omits_missing_baseline() {
        let totals = Totals {
            step_count: 3,
            distance_meters: 2.25,
            last_cumulative_counter_value: None,
        };
        let json = totals.to_json().unwrap();

        assert!(!json.contains("last_cumulative_counter_value"));
        assert_eq!(Totals::from_json(&json).unwrap(), totals);
    }

    #[test]
    fn test_outcome_serialization() {
        let processed = Processed {
            outcome: SampleOutcome::Step(StepDecision::RejectedTooSoon),
            totals: None,
        };
        let value = serde_json::to_value(processed).unwrap();

        assert_eq!(value["outcome"]["outcome"], "step");
        assert_eq!(value["outcome"]["value"], "rejected_too_soon");
        assert!(value.get("totals").is_none());
    }

    #[test]
    fn test_step_source_default_is_pulse_based() {
        assert_eq!(StepSource::default(), StepSource::PulseBased);
        let source: StepSource = serde_json::from_str(r#""counter_based""#).unwrap();
        assert_eq!(source, StepSource::CounterBased);
    }
}
