//! Step detection
//!
//! Turns raw accelerometer samples into confirmed steps:
//!
//! 1. magnitude of the acceleration vector
//! 2. gravity baseline removed, clamped at zero
//! 3. moving average over a small ring buffer
//! 4. debounced threshold test on the average
//!
//! This is a threshold detector, not a peak detector. With the default
//! [`StepTrigger::Sustained`] trigger a step fires whenever the smoothed
//! magnitude sits above the threshold and the debounce interval has passed,
//! so a long elevated stretch can yield one step per debounce interval.
//! [`StepTrigger::RisingEdge`] only fires on an upward crossing.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::error::SensingError;
use crate::types::{AccelerationSample, StepEvent};

/// Standard gravity baseline subtracted from the magnitude (m/s²)
pub const DEFAULT_GRAVITY: f64 = 9.8;

/// Default moving average window (samples)
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Default threshold on the smoothed, gravity-removed magnitude (m/s²)
pub const DEFAULT_THRESHOLD: f64 = 1.2;

/// Default minimum spacing between steps (ms)
pub const DEFAULT_DEBOUNCE_MS: i64 = 300;

/// When an above-threshold average confirms a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTrigger {
    /// Any above-threshold average, subject to debounce
    #[default]
    Sustained,
    /// Only an average that was at or below the threshold on the previous sample
    RisingEdge,
}

/// Configuration for step detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDetectorConfig {
    /// Gravity baseline (m/s²)
    pub gravity: f64,
    /// Moving average capacity (samples)
    pub window_size: usize,
    /// Threshold on the moving average (m/s²); must be exceeded strictly
    pub threshold: f64,
    /// A step is accepted only if strictly more than this many ms passed since the last one
    pub debounce_ms: i64,
    pub trigger: StepTrigger,
}

impl Default for StepDetectorConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            window_size: DEFAULT_WINDOW_SIZE,
            threshold: DEFAULT_THRESHOLD,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            trigger: StepTrigger::Sustained,
        }
    }
}

impl StepDetectorConfig {
    pub fn validate(&self) -> Result<(), SensingError> {
        if !self.gravity.is_finite() || self.gravity < 0.0 {
            return Err(SensingError::InvalidConfig(format!(
                "gravity must be a non-negative number, got {}",
                self.gravity
            )));
        }
        if self.window_size == 0 {
            return Err(SensingError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(SensingError::InvalidConfig(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.debounce_ms < 0 {
            return Err(SensingError::InvalidConfig(format!(
                "debounce_ms must not be negative, got {}",
                self.debounce_ms
            )));
        }
        Ok(())
    }
}

/// Fixed-capacity ring buffer of recent magnitudes; oldest evicted first
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SmoothingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Mean over however many values are held, `None` while empty
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Debounced threshold step detector. One instance per session.
#[derive(Debug, Clone)]
pub struct StepDetector {
    config: StepDetectorConfig,
    window: SmoothingWindow,
    last_step_ms: Option<i64>,
    was_above: bool,
    step_count: u64,
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(StepDetectorConfig::default())
    }
}

impl StepDetector {
    pub fn new(config: StepDetectorConfig) -> Self {
        let window = SmoothingWindow::new(config.window_size);
        Self {
            config,
            window,
            last_step_ms: None,
            was_above: false,
            step_count: 0,
        }
    }

    /// Feed one sample; returns the step it confirms, if any.
    ///
    /// Malformed samples are dropped without touching the window.
    pub fn ingest(&mut self, sample: &AccelerationSample) -> Option<StepEvent> {
        if let Err(e) = sample.validate() {
            debug!(error = %e, timestamp_ms = sample.timestamp_ms, "dropping acceleration sample");
            return None;
        }

        let linear = (sample.magnitude() - self.config.gravity).max(0.0);
        self.window.push(linear);
        let avg = self.window.mean()?;

        let above = avg > self.config.threshold;
        let armed = match self.config.trigger {
            StepTrigger::Sustained => true,
            StepTrigger::RisingEdge => !self.was_above,
        };
        self.was_above = above;

        if !(above && armed && self.debounce_elapsed(sample.timestamp_ms)) {
            return None;
        }

        self.step_count += 1;
        self.last_step_ms = Some(sample.timestamp_ms);
        trace!(
            timestamp_ms = sample.timestamp_ms,
            avg,
            steps = self.step_count,
            "step confirmed"
        );
        Some(StepEvent {
            timestamp_ms: sample.timestamp_ms,
        })
    }

    fn debounce_elapsed(&self, timestamp_ms: i64) -> bool {
        match self.last_step_ms {
            None => true,
            Some(last) => timestamp_ms.saturating_sub(last) > self.config.debounce_ms,
        }
    }

    /// Steps confirmed since construction or the last reset
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn last_step_ms(&self) -> Option<i64> {
        self.last_step_ms
    }

    /// Current moving average, `None` before the first sample
    pub fn smoothed_magnitude(&self) -> Option<f64> {
        self.window.mean()
    }

    pub fn config(&self) -> &StepDetectorConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_step_ms = None;
        self.was_above = false;
        self.step_count = 0;
    }
}
