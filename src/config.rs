//! Engine configuration
//!
//! Thresholds and step-source policy supplied once per tracking session.
//! Any field missing from a JSON document takes its default.

use crate::error::ComputeError;
use crate::types::StepSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default shake threshold (m/s²), above gravity with margin for normal gait
pub const DEFAULT_SHAKE_THRESHOLD: f64 = 12.0;

/// Default vehicle speed threshold (km/h), just above walking pace
pub const DEFAULT_MIN_VEHICLE_SPEED_KMH: f64 = 3.0;

/// Default minimum interval between accepted steps (~2 steps/second)
pub const DEFAULT_MIN_STEP_INTERVAL_MS: i64 = 500;

/// Default stride length (meters per step)
pub const DEFAULT_STEP_LENGTH_METERS: f64 = 0.75;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Accelerometer magnitude above which pulses are treated as shaking (m/s²)
    pub shake_threshold: f64,
    /// Speed above which pulses are treated as vehicle motion (km/h)
    pub min_vehicle_speed_kmh: f64,
    /// Pulses closer than or equal to this interval are debounced (ms)
    pub min_step_interval_ms: i64,
    /// Distance credited per step (meters)
    pub step_length_meters: f64,
    /// Authoritative step source for the session
    pub step_source: StepSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shake_threshold: DEFAULT_SHAKE_THRESHOLD,
            min_vehicle_speed_kmh: DEFAULT_MIN_VEHICLE_SPEED_KMH,
            min_step_interval_ms: DEFAULT_MIN_STEP_INTERVAL_MS,
            step_length_meters: DEFAULT_STEP_LENGTH_METERS,
            step_source: StepSource::PulseBased,
        }
    }
}

impl EngineConfig {
    /// Default configuration counting the cumulative step counter
    pub fn counter_based() -> Self {
        Self {
            step_source: StepSource::CounterBased,
            ..Self::default()
        }
    }

    /// Override the stride length (per-user calibration)
    pub fn with_step_length(mut self, meters: f64) -> Self {
        self.step_length_meters = meters;
        self
    }

    /// Check that every threshold is usable
    pub fn validate(&self) -> Result<(), ComputeError> {
        if !self.shake_threshold.is_finite() || self.shake_threshold <= 0.0 {
            return Err(ComputeError::InvalidConfig(format!(
                "shake_threshold must be a positive number, got {}",
                self.shake_threshold
            )));
        }
        if !self.min_vehicle_speed_kmh.is_finite() || self.min_vehicle_speed_kmh < 0.0 {
            return Err(ComputeError::InvalidConfig(format!(
                "min_vehicle_speed_kmh must be a non-negative number, got {}",
                self.min_vehicle_speed_kmh
            )));
        }
        if self.min_step_interval_ms < 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "min_step_interval_ms must not be negative, got {}",
                self.min_step_interval_ms
            )));
        }
        if !self.step_length_meters.is_finite() || self.step_length_meters <= 0.0 {
            return Err(ComputeError::InvalidConfig(format!(
                "step_length_meters must be a positive number, got {}",
                self.step_length_meters
            )));
        }
        Ok(())
    }

    /// Parse and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate configuration from a JSON file
    pub fn from_path(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.shake_threshold, 12.0);
        assert_eq!(config.min_vehicle_speed_kmh, 3.0);
        assert_eq!(config.min_step_interval_ms, 500);
        assert_eq!(config.step_length_meters, 0.75);
        assert_eq!(config.step_source, StepSource::PulseBased);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json(r#"{"step_length_meters": 0.8, "step_source": "counter_based"}"#)
                .unwrap();

        assert_eq!(
            config,
            EngineConfig {
                step_length_meters: 0.8,
                step_source: StepSource::CounterBased,
                ..EngineConfig::default()
            }
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(EngineConfig::from_json(r#"{"shake_threshold": 0.0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"min_vehicle_speed_kmh": -1.0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"min_step_interval_ms": -5}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"step_length_meters": 0.0}"#).is_err());
    }

    #[test]
    fn test_rejects_unknown_step_source() {
        let result = EngineConfig::from_json(r#"{"step_source": "both"}"#);
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_source() {
        let config = EngineConfig::counter_based().with_step_length(0.7);
        let parsed = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
