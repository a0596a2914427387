//! Engine orchestration
//!
//! This module provides the stateful entry point of Stepflux. It runs every
//! sample through the classifier, keeps the motion context current, asks the
//! filter about step pulses and feeds the accumulator.

use crate::accumulator::{Accumulator, CounterUpdate};
use crate::classifier::classify;
use crate::config::EngineConfig;
use crate::error::{ComputeError, SampleError};
use crate::filter::evaluate;
use crate::types::{
    DebounceState, Diagnostics, MotionContext, Processed, RawSample, Sample, SampleOutcome,
    StepDecision, StepSource, Totals,
};
use tracing::{debug, warn};

/// Stateful step engine for one tracking session.
///
/// Exactly one caller drives the engine; all state lives behind `&mut self`.
#[derive(Debug, Clone)]
pub struct StepEngine {
    config: EngineConfig,
    context: MotionContext,
    debounce: DebounceState,
    accumulator: Accumulator,
    diagnostics: Diagnostics,
    last_timestamp: Option<i64>,
}

impl Default for StepEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl StepEngine {
    /// Create an engine with zeroed totals
    pub fn new(config: EngineConfig) -> Self {
        Self::with_totals(config, Totals::default())
    }

    /// Create an engine seeded with persisted totals
    pub fn with_totals(config: EngineConfig, totals: Totals) -> Self {
        Self {
            config,
            context: MotionContext::default(),
            debounce: DebounceState::default(),
            accumulator: Accumulator::seeded(totals),
            diagnostics: Diagnostics::default(),
            last_timestamp: None,
        }
    }

    /// Create an engine after validating the configuration
    pub fn try_new(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn motion_context(&self) -> &MotionContext {
        &self.context
    }

    pub fn totals(&self) -> Totals {
        self.accumulator.totals()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Timestamp of the most recently processed sample
    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Replace the totals, e.g. after loading them from a store
    pub fn load_totals(&mut self, totals: Totals) {
        self.accumulator = Accumulator::seeded(totals);
    }

    /// Load totals from JSON
    pub fn load_totals_json(&mut self, json: &str) -> Result<(), ComputeError> {
        let totals =
            Totals::from_json(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        self.load_totals(totals);
        Ok(())
    }

    /// Save totals to JSON
    pub fn save_totals_json(&self) -> Result<String, ComputeError> {
        self.totals().to_json().map_err(ComputeError::JsonError)
    }

    /// Classify and process a raw sample.
    ///
    /// Errors are recoverable: the sample is dropped, counted, and the engine
    /// stays ready for the next one.
    pub fn ingest(&mut self, raw: &RawSample) -> Result<Processed, SampleError> {
        let sample = match classify(raw) {
            Ok(sample) => sample,
            Err(e) => {
                self.diagnostics.malformed_samples += 1;
                warn!(kind = %raw.kind, timestamp_ms = raw.timestamp_ms, error = %e, "dropping malformed sample");
                return Err(e);
            }
        };
        self.process(sample)
    }

    /// Parse a JSON-encoded raw sample and process it
    pub fn ingest_json(&mut self, json: &str) -> Result<Processed, ComputeError> {
        let raw: RawSample = serde_json::from_str(json)
            .map_err(|e| ComputeError::ParseError(format!("Failed to parse sample: {}", e)))?;
        Ok(self.ingest(&raw)?)
    }

    /// Move the counter baseline to a snapshot's reading without crediting steps.
    ///
    /// Used while a session is paused so that steps walked during the pause
    /// are never credited. Returns the updated totals when the baseline moved;
    /// every other sample is ignored and leaves the ordering clock untouched.
    pub fn rebase_counter(&mut self, raw: &RawSample) -> Option<Totals> {
        if self.config.step_source != StepSource::CounterBased {
            return None;
        }
        match classify(raw) {
            Ok(Sample::CounterSnapshot {
                cumulative_value, ..
            }) => {
                self.accumulator.rebase_counter(cumulative_value);
                debug!(baseline = cumulative_value, "step counter rebased");
                Some(self.accumulator.totals())
            }
            _ => None,
        }
    }

    /// Process an already classified sample
    pub fn process(&mut self, sample: Sample) -> Result<Processed, SampleError> {
        let timestamp = sample.timestamp();
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                self.diagnostics.out_of_order_samples += 1;
                warn!(
                    kind = %sample.kind(),
                    timestamp_ms = timestamp,
                    last_timestamp_ms = last,
                    "dropping out-of-order sample"
                );
                return Err(SampleError::OutOfOrderSample {
                    timestamp_ms: timestamp,
                    last_timestamp_ms: last,
                });
            }
        }
        self.last_timestamp = Some(timestamp);
        self.diagnostics.samples_processed += 1;

        match sample {
            Sample::AccelVector { x, y, z, .. } => {
                self.context.observe_accel(x, y, z, &self.config);
                Ok(unchanged(SampleOutcome::MotionUpdated))
            }

            Sample::LocationFix { speed_mps, .. } => {
                self.context.observe_speed(speed_mps, &self.config);
                Ok(unchanged(SampleOutcome::MotionUpdated))
            }

            Sample::StepPulse(pulse) => {
                if self.config.step_source != StepSource::PulseBased {
                    self.diagnostics.ignored_inactive_source += 1;
                    return Ok(unchanged(SampleOutcome::IgnoredInactiveSource));
                }

                let decision = evaluate(&pulse, &self.context, &mut self.debounce, &self.config);
                self.record_decision(decision);
                debug!(
                    timestamp_ms = pulse.timestamp,
                    decision = ?decision,
                    accel_magnitude = self.context.last_accel_magnitude,
                    speed_kmh = self.context.last_speed_kmh,
                    "step pulse evaluated"
                );

                let totals = decision
                    .is_accepted()
                    .then(|| self.accumulator.on_accepted(&self.config));
                Ok(Processed {
                    outcome: SampleOutcome::Step(decision),
                    totals,
                })
            }

            Sample::CounterSnapshot {
                cumulative_value, ..
            } => {
                if self.config.step_source != StepSource::CounterBased {
                    self.diagnostics.ignored_inactive_source += 1;
                    return Ok(unchanged(SampleOutcome::IgnoredInactiveSource));
                }

                match self
                    .accumulator
                    .on_counter_snapshot(cumulative_value, &self.config)
                {
                    Ok(CounterUpdate::BaselineSeeded) => {
                        debug!(baseline = cumulative_value, "step counter baseline seeded");
                        Ok(unchanged(SampleOutcome::CounterBaselineSeeded))
                    }
                    Ok(CounterUpdate::Credited { steps, totals }) => {
                        self.diagnostics.counter_updates += 1;
                        debug!(steps, step_count = totals.step_count, "step counter delta credited");
                        Ok(Processed {
                            outcome: SampleOutcome::CounterCredited(steps),
                            totals: Some(totals),
                        })
                    }
                    Err(e) => {
                        self.diagnostics.counter_regressions += 1;
                        warn!(error = %e, "step counter regression");
                        Err(e)
                    }
                }
            }
        }
    }

    fn record_decision(&mut self, decision: StepDecision) {
        match decision {
            StepDecision::Accepted => self.diagnostics.steps_accepted += 1,
            StepDecision::RejectedShaking => self.diagnostics.rejected_shaking += 1,
            StepDecision::RejectedVehicle => self.diagnostics.rejected_vehicle += 1,
            StepDecision::RejectedTooSoon => self.diagnostics.rejected_too_soon += 1,
        }
    }
}

fn unchanged(outcome: SampleOutcome) -> Processed {
    Processed {
        outcome,
        totals: None,
    }
}
