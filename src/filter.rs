//! Step filtering and debouncing
//!
//! Decides whether a step pulse is a genuine walking step. Rejections are
//! checked in a fixed priority order (shaking, vehicle, debounce) so that
//! diagnostics name exactly one reason per pulse.

use crate::config::EngineConfig;
use crate::types::{DebounceState, MotionContext, StepDecision, StepPulse};

/// Conversion factor from m/s to km/h
const MPS_TO_KMH: f64 = 3.6;

impl MotionContext {
    /// Fold a fresh accelerometer vector into the context
    pub fn observe_accel(&mut self, x: f64, y: f64, z: f64, config: &EngineConfig) {
        self.last_accel_magnitude = (x * x + y * y + z * z).sqrt();
        self.is_shaking = self.last_accel_magnitude > config.shake_threshold;
    }

    /// Fold a fresh location speed (m/s) into the context
    pub fn observe_speed(&mut self, speed_mps: f64, config: &EngineConfig) {
        self.last_speed_kmh = speed_mps * MPS_TO_KMH;
        self.is_likely_vehicle = self.last_speed_kmh > config.min_vehicle_speed_kmh;
    }
}

/// Evaluate a step pulse against the latest motion context.
///
/// On acceptance the debounce clock moves to the pulse timestamp. A pulse
/// exactly `min_step_interval_ms` after the last accepted one is rejected.
pub fn evaluate(
    pulse: &StepPulse,
    ctx: &MotionContext,
    state: &mut DebounceState,
    config: &EngineConfig,
) -> StepDecision {
    if ctx.last_accel_magnitude > config.shake_threshold {
        return StepDecision::RejectedShaking;
    }

    if ctx.last_speed_kmh > config.min_vehicle_speed_kmh {
        return StepDecision::RejectedVehicle;
    }

    if let Some(last) = state.last_accepted_step_time {
        if pulse.timestamp.saturating_sub(last) <= config.min_step_interval_ms {
            return StepDecision::RejectedTooSoon;
        }
    }

    state.last_accepted_step_time = Some(pulse.timestamp);
    StepDecision::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(timestamp: i64) -> StepPulse {
        StepPulse { timestamp }
    }

    #[test]
    fn test_first_pulse_accepted() {
        let config = EngineConfig::default();
        let mut state = DebounceState::default();

        let decision = evaluate(&pulse(0), &MotionContext::default(), &mut state, &config);

        assert_eq!(decision, StepDecision::Accepted);
        assert_eq!(state.last_accepted_step_time, Some(0));
    }

    #[test]
    fn test_debounce_boundary_rejects() {
        let config = EngineConfig::default();
        let ctx = MotionContext::default();
        let mut state = DebounceState::default();

        assert!(evaluate(&pulse(1_000), &ctx, &mut state, &config).is_accepted());
        assert_eq!(
            evaluate(&pulse(1_500), &ctx, &mut state, &config),
            StepDecision::RejectedTooSoon
        );
        assert_eq!(
            evaluate(&pulse(1_200), &ctx, &mut state, &config),
            StepDecision::RejectedTooSoon
        );
        // Rejections do not move the clock
        assert_eq!(state.last_accepted_step_time, Some(1_000));
        assert!(evaluate(&pulse(1_501), &ctx, &mut state, &config).is_accepted());
    }

    #[test]
    fn test_shaking_rejects() {
        let config = EngineConfig::default();
        let mut ctx = MotionContext::default();
        let mut state = DebounceState::default();

        ctx.observe_accel(10.0, 8.0, 3.0, &config);
        assert!(ctx.is_shaking);
        assert_eq!(
            evaluate(&pulse(0), &ctx, &mut state, &config),
            StepDecision::RejectedShaking
        );
        assert_eq!(state.last_accepted_step_time, None);

        ctx.observe_accel(0.3, 9.7, 0.5, &config);
        assert!(!ctx.is_shaking);
        assert!(evaluate(&pulse(600), &ctx, &mut state, &config).is_accepted());
    }

    #[test]
    fn test_magnitude_at_threshold_is_not_shaking() {
        let config = EngineConfig::default();
        let mut ctx = MotionContext::default();
        ctx.observe_accel(12.0, 0.0, 0.0, &config);

        assert_eq!(ctx.last_accel_magnitude, 12.0);
        assert!(!ctx.is_shaking);
    }

    #[test]
    fn test_vehicle_rejects() {
        let config = EngineConfig::default();
        let mut ctx = MotionContext::default();
        let mut state = DebounceState::default();

        // 1.0 m/s = 3.6 km/h
        ctx.observe_speed(1.0, &config);
        assert!(ctx.is_likely_vehicle);
        assert_eq!(
            evaluate(&pulse(0), &ctx, &mut state, &config),
            StepDecision::RejectedVehicle
        );

        // 0.5 m/s = 1.8 km/h, walking pace
        ctx.observe_speed(0.5, &config);
        assert!(!ctx.is_likely_vehicle);
        assert!(evaluate(&pulse(0), &ctx, &mut state, &config).is_accepted());
    }

    #[test]
    fn test_shaking_checked_before_vehicle() {
        let config = EngineConfig::default();
        let mut ctx = MotionContext::default();
        let mut state = DebounceState::default();

        ctx.observe_accel(20.0, 0.0, 0.0, &config);
        ctx.observe_speed(15.0, &config);

        assert_eq!(
            evaluate(&pulse(0), &ctx, &mut state, &config),
            StepDecision::RejectedShaking
        );
    }

    #[test]
    fn test_vehicle_checked_before_debounce() {
        let config = EngineConfig::default();
        let mut ctx = MotionContext::default();
        let mut state = DebounceState {
            last_accepted_step_time: Some(0),
        };

        ctx.observe_speed(2.0, &config);
        assert_eq!(
            evaluate(&pulse(100), &ctx, &mut state, &config),
            StepDecision::RejectedVehicle
        );
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let config = EngineConfig::default();
        let ctx = MotionContext::default();
        let mut state = DebounceState::default();

        assert!(evaluate(&pulse(i64::MIN + 1), &ctx, &mut state, &config).is_accepted());
        assert!(evaluate(&pulse(i64::MAX), &ctx, &mut state, &config).is_accepted());
        assert_eq!(state.last_accepted_step_time, Some(i64::MAX));
    }
}
