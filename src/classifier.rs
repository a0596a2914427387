//! Sample classification
//!
//! Tags each raw sample by kind and extracts the fields the filter and
//! accumulator need. Validation happens here so that everything downstream
//! can assume finite, in-range values.

use crate::error::SampleError;
use crate::types::{RawSample, Sample, SampleKind, StepPulse};

/// Number of components in an accelerometer vector
const ACCEL_COMPONENTS: usize = 3;

/// Classify a raw sample.
///
/// Fails with [`SampleError::MalformedSample`] when an accelerometer vector
/// does not carry exactly three components, a counter or location sample has
/// no value, any value is not finite, or a counter/speed value is negative.
pub fn classify(raw: &RawSample) -> Result<Sample, SampleError> {
    let kind = raw.kind;
    let timestamp = raw.timestamp_ms;

    match kind {
        SampleKind::StepPulse => Ok(Sample::StepPulse(StepPulse { timestamp })),

        SampleKind::Accelerometer => {
            if raw.values.len() != ACCEL_COMPONENTS {
                return Err(SampleError::malformed(
                    kind,
                    format!(
                        "expected {} components, got {}",
                        ACCEL_COMPONENTS,
                        raw.values.len()
                    ),
                ));
            }
            ensure_finite(kind, &raw.values)?;
            Ok(Sample::AccelVector {
                x: raw.values[0],
                y: raw.values[1],
                z: raw.values[2],
                timestamp,
            })
        }

        SampleKind::StepCounter => {
            if raw.values.len() != 1 {
                return Err(SampleError::malformed(
                    kind,
                    format!("expected 1 value, got {}", raw.values.len()),
                ));
            }
            let cumulative_value = non_negative(kind, raw.values[0], "cumulative value")?;
            Ok(Sample::CounterSnapshot {
                cumulative_value,
                timestamp,
            })
        }

        SampleKind::Location => {
            // Trailing position components are tolerated; speed comes first.
            let Some(&speed) = raw.values.first() else {
                return Err(SampleError::malformed(kind, "missing speed value"));
            };
            ensure_finite(kind, &raw.values)?;
            let speed_mps = non_negative(kind, speed, "speed")?;
            Ok(Sample::LocationFix {
                speed_mps,
                timestamp,
            })
        }
    }
}

fn ensure_finite(kind: SampleKind, values: &[f64]) -> Result<(), SampleError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(SampleError::malformed(
            kind,
            format!("component {} is not finite ({})", index, values[index]),
        )),
        None => Ok(()),
    }
}

fn non_negative(kind: SampleKind, value: f64, field: &str) -> Result<f64, SampleError> {
    if !value.is_finite() {
        return Err(SampleError::malformed(
            kind,
            format!("{} is not finite ({})", field, value),
        ));
    }
    if value < 0.0 {
        return Err(SampleError::malformed(
            kind,
            format!("{} must not be negative ({})", field, value),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_kind() {
        assert_eq!(
            classify(&RawSample::step_pulse(100)).unwrap(),
            Sample::StepPulse(StepPulse { timestamp: 100 })
        );
        assert_eq!(
            classify(&RawSample::accelerometer(110, 0.5, 9.6, 1.0)).unwrap(),
            Sample::AccelVector {
                x: 0.5,
                y: 9.6,
                z: 1.0,
                timestamp: 110
            }
        );
        assert_eq!(
            classify(&RawSample::step_counter(120, 1042.0)).unwrap(),
            Sample::CounterSnapshot {
                cumulative_value: 1042.0,
                timestamp: 120
            }
        );
        assert_eq!(
            classify(&RawSample::location(130, 1.2)).unwrap(),
            Sample::LocationFix {
                speed_mps: 1.2,
                timestamp: 130
            }
        );
    }

    #[test]
    fn test_step_pulse_values_ignored() {
        let raw = RawSample::new(SampleKind::StepPulse, 7, Vec::new());
        assert!(classify(&raw).is_ok());
    }

    #[test]
    fn test_accel_wrong_component_count() {
        let raw = RawSample::new(SampleKind::Accelerometer, 0, vec![1.0, 2.0]);
        let err = classify(&raw).unwrap_err();

        assert!(matches!(
            err,
            SampleError::MalformedSample {
                kind: SampleKind::Accelerometer,
                ..
            }
        ));

        let raw = RawSample::new(SampleKind::Accelerometer, 0, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(classify(&raw).is_err());
    }

    #[test]
    fn test_accel_nan_rejected() {
        let raw = RawSample::accelerometer(0, 1.0, f64::NAN, 3.0);
        let err = classify(&raw).unwrap_err();
        assert!(err.to_string().contains("component 1"));
    }

    #[test]
    fn test_negative_counter_rejected() {
        let err = classify(&RawSample::step_counter(0, -1.0)).unwrap_err();
        assert_eq!(err.code(), "malformed_sample");
    }

    #[test]
    fn test_location_validation() {
        assert!(classify(&RawSample::location(0, -0.1)).is_err());
        assert!(classify(&RawSample::location(0, f64::INFINITY)).is_err());
        assert!(classify(&RawSample::new(SampleKind::Location, 0, Vec::new())).is_err());

        // speed, latitude, longitude
        let raw = RawSample::new(SampleKind::Location, 0, vec![0.8, 52.52, 13.40]);
        assert_eq!(
            classify(&raw).unwrap(),
            Sample::LocationFix {
                speed_mps: 0.8,
                timestamp: 0
            }
        );
    }

    #[test]
    fn test_counter_requires_single_value() {
        let raw = RawSample::new(SampleKind::StepCounter, 0, vec![10.0, 11.0]);
        assert!(classify(&raw).is_err());
    }
}
