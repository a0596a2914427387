//! Step and distance accumulation
//!
//! Maintains the running totals for a session. Pulse-based sources add one
//! step per accepted pulse; counter-based sources credit the delta between
//! consecutive cumulative readings.

use crate::config::EngineConfig;
use crate::error::SampleError;
use crate::types::Totals;

/// Effect of a counter snapshot on the totals
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterUpdate {
    /// No baseline existed yet; this reading became the baseline
    BaselineSeeded,
    /// Steps credited from the delta to the previous reading
    Credited { steps: u64, totals: Totals },
}

/// Running totals for one tracking session
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    totals: Totals,
}

impl Accumulator {
    /// Create an accumulator starting from zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accumulator seeded from persisted totals
    pub fn seeded(totals: Totals) -> Self {
        Self { totals }
    }

    /// Current totals snapshot
    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Credit one accepted pulse
    pub fn on_accepted(&mut self, config: &EngineConfig) -> Totals {
        self.totals.step_count = self.totals.step_count.saturating_add(1);
        self.recompute_distance(config);
        self.totals
    }

    /// Credit the delta of a cumulative counter reading.
    ///
    /// The counter reports steps since boot, so the first reading only
    /// establishes a baseline. A reading below the baseline reseeds it and
    /// credits nothing.
    pub fn on_counter_snapshot(
        &mut self,
        value: f64,
        config: &EngineConfig,
    ) -> Result<CounterUpdate, SampleError> {
        let Some(previous) = self.totals.last_cumulative_counter_value else {
            self.totals.last_cumulative_counter_value = Some(value);
            return Ok(CounterUpdate::BaselineSeeded);
        };

        let delta = value - previous;
        if delta < 0.0 {
            self.totals.last_cumulative_counter_value = Some(value);
            return Err(SampleError::CounterRegression {
                previous,
                current: value,
            });
        }

        // Saturates for deltas beyond u64; the fractional remainder stays in the baseline
        let steps = delta.floor() as u64;
        self.totals.last_cumulative_counter_value = Some(value - delta.fract());
        self.totals.step_count = self.totals.step_count.saturating_add(steps);
        self.recompute_distance(config);

        Ok(CounterUpdate::Credited {
            steps,
            totals: self.totals,
        })
    }

    /// Move the counter baseline to `value` without crediting steps
    pub fn rebase_counter(&mut self, value: f64) {
        self.totals.last_cumulative_counter_value = Some(value);
    }

    fn recompute_distance(&mut self, config: &EngineConfig) {
        self.totals.distance_meters = self.totals.step_count as f64 * config.step_length_meters;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pulse_distance() {
        let config = EngineConfig::default();
        let mut acc = Accumulator::new();

        for _ in 0..10 {
            acc.on_accepted(&config);
        }

        assert_eq!(acc.totals().step_count, 10);
        assert!((acc.totals().distance_meters - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_counter_sequence() {
        let config = EngineConfig::counter_based();
        let mut acc = Accumulator::new();

        assert_eq!(
            acc.on_counter_snapshot(1000.0, &config).unwrap(),
            CounterUpdate::BaselineSeeded
        );
        assert_eq!(acc.totals().step_count, 0);

        acc.on_counter_snapshot(1005.0, &config).unwrap();
        assert_eq!(acc.totals().step_count, 5);

        let update = acc.on_counter_snapshot(1012.0, &config).unwrap();
        assert_eq!(
            update,
            CounterUpdate::Credited {
                steps: 7,
                totals: Totals {
                    step_count: 12,
                    distance_meters: 9.0,
                    last_cumulative_counter_value: Some(1012.0),
                },
            }
        );
    }

    #[test]
    fn test_counter_regression_reseeds() {
        let config = EngineConfig::counter_based();
        let mut acc = Accumulator::new();
        for value in [1000.0, 1005.0, 1012.0] {
            acc.on_counter_snapshot(value, &config).unwrap();
        }

        let err = acc.on_counter_snapshot(1004.0, &config).unwrap_err();

        assert_eq!(
            err,
            SampleError::CounterRegression {
                previous: 1012.0,
                current: 1004.0
            }
        );
        assert_eq!(acc.totals().step_count, 12);
        assert_eq!(acc.totals().last_cumulative_counter_value, Some(1004.0));

        acc.on_counter_snapshot(1010.0, &config).unwrap();
        assert_eq!(acc.totals().step_count, 18);
    }

    #[test]
    fn test_counter_zero_delta_credits_nothing() {
        let config = EngineConfig::counter_based();
        let mut acc = Accumulator::new();
        acc.on_counter_snapshot(50.0, &config).unwrap();

        let update = acc.on_counter_snapshot(50.0, &config).unwrap();
        assert!(matches!(update, CounterUpdate::Credited { steps: 0, .. }));
    }

    #[test]
    fn test_seeded_totals_continue() {
        let config = EngineConfig::default();
        let mut acc = Accumulator::seeded(Totals {
            step_count: 100,
            distance_meters: 75.0,
            last_cumulative_counter_value: None,
        });

        let totals = acc.on_accepted(&config);
        assert_eq!(totals.step_count, 101);
        assert!((totals.distance_meters - 75.75).abs() < 1e-9);
    }

    #[test]
    fn test_huge_counter_delta_saturates() {
        let config = EngineConfig::counter_based();
        let mut acc = Accumulator::seeded(Totals {
            step_count: 5,
            distance_meters: 3.75,
            last_cumulative_counter_value: None,
        });

        acc.on_counter_snapshot(0.0, &config).unwrap();
        acc.on_counter_snapshot(1e20, &config).unwrap();

        assert_eq!(acc.totals().step_count, u64::MAX);
        assert_eq!(acc.totals().last_cumulative_counter_value, Some(1e20));
    }

    #[test]
    fn test_fractional_remainder_kept_in_baseline() {
        let config = EngineConfig::counter_based();
        let mut acc = Accumulator::new();
        acc.on_counter_snapshot(10.0, &config).unwrap();

        acc.on_counter_snapshot(12.5, &config).unwrap();
        assert_eq!(acc.totals().step_count, 2);
        assert_eq!(acc.totals().last_cumulative_counter_value, Some(12.0));

        acc.on_counter_snapshot(13.5, &config).unwrap();
        assert_eq!(acc.totals().step_count, 3);
    }

    #[test]
    fn test_rebase_counter_credits_nothing() {
        let config = EngineConfig::counter_based();
        let mut acc = Accumulator::new();
        acc.on_counter_snapshot(1000.0, &config).unwrap();

        acc.rebase_counter(1500.0);
        acc.on_counter_snapshot(1502.0, &config).unwrap();

        assert_eq!(acc.totals().step_count, 2);
    }
}
