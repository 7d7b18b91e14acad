//! Signal sources
//!
//! A channel (motion or heading) is fed either by the device, whose samples
//! the platform adapter pushes in, or by a synthetic generator that produces
//! samples whenever the session ticks. The session picks one per channel at
//! activation and never branches on it again.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SensingError;
use crate::step_detector::DEFAULT_GRAVITY;
use crate::types::{AccelerationSample, OrientationSample, SourceKind};

/// Configuration for the simulated sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
    /// Synthetic accelerometer cadence (ms)
    pub sample_interval_ms: i64,
    /// How often a step is rolled for (ms)
    pub step_check_interval_ms: i64,
    /// Chance that a roll produces a step
    pub step_probability: f64,
    /// Consecutive elevated samples per simulated footfall
    pub burst_samples: u32,
    /// Gravity-removed magnitude of the elevated samples (m/s²)
    pub burst_magnitude: f64,
    /// Synthetic compass cadence (ms)
    pub heading_interval_ms: i64,
    /// Degrees the synthetic compass turns per interval
    pub heading_step_degrees: f64,
    /// Larger gaps are skipped instead of replayed sample by sample
    pub max_catch_up_samples: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            sample_interval_ms: 50,
            step_check_interval_ms: 200,
            step_probability: 0.05,
            burst_samples: 3,
            burst_magnitude: 2.5,
            heading_interval_ms: 500,
            heading_step_degrees: 10.0,
            max_catch_up_samples: 1_200,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SensingError> {
        if self.sample_interval_ms <= 0
            || self.step_check_interval_ms <= 0
            || self.heading_interval_ms <= 0
        {
            return Err(SensingError::InvalidConfig(
                "simulation intervals must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.step_probability) {
            return Err(SensingError::InvalidConfig(format!(
                "step_probability must be within [0, 1], got {}",
                self.step_probability
            )));
        }
        if !self.burst_magnitude.is_finite() || !self.heading_step_degrees.is_finite() {
            return Err(SensingError::InvalidConfig(
                "simulation magnitudes must be finite".to_string(),
            ));
        }
        if self.max_catch_up_samples == 0 {
            return Err(SensingError::InvalidConfig(
                "max_catch_up_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }
}

/// A sample produced by a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceSample {
    Acceleration(AccelerationSample),
    Orientation(OrientationSample),
}

impl SourceSample {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            SourceSample::Acceleration(sample) => sample.timestamp_ms,
            SourceSample::Orientation(sample) => sample.timestamp_ms,
        }
    }
}

/// Produces synthetic samples up to the given time
pub trait SampleGenerator {
    /// Samples due at or before `now_ms`, in timestamp order
    fn generate(&mut self, now_ms: i64) -> Vec<SourceSample>;
}

/// Fixed-cadence clock shared by the generators
#[derive(Debug, Clone)]
struct Cadence {
    interval_ms: i64,
    next_ms: i64,
    max_catch_up: usize,
    /// Set once `next_ms` can no longer advance without overflowing
    exhausted: bool,
}

impl Cadence {
    fn new(interval_ms: i64, first_ms: i64, max_catch_up: usize) -> Self {
        Self {
            interval_ms,
            next_ms: first_ms,
            max_catch_up,
            exhausted: false,
        }
    }

    /// Timestamps due at or before `now_ms`
    fn due(&mut self, now_ms: i64) -> Vec<i64> {
        if self.exhausted || now_ms < self.next_ms {
            return Vec::new();
        }

        let behind = usize::try_from(now_ms.saturating_sub(self.next_ms) / self.interval_ms)
            .unwrap_or(usize::MAX)
            .saturating_add(1);
        if behind > self.max_catch_up {
            let skipped = behind - self.max_catch_up;
            warn!(skipped, "synthetic source fell behind, skipping samples");
            let skip_ms = i64::try_from(skipped)
                .unwrap_or(i64::MAX)
                .saturating_mul(self.interval_ms);
            self.next_ms = self.next_ms.saturating_add(skip_ms);
        }

        let mut due = Vec::new();
        while self.next_ms <= now_ms {
            due.push(self.next_ms);
            match self.next_ms.checked_add(self.interval_ms) {
                Some(next) => self.next_ms = next,
                None => {
                    warn!(next_ms = self.next_ms, "synthetic source clock saturated");
                    self.exhausted = true;
                    break;
                }
            }
        }
        due
    }
}

/// Resting accelerometer with occasional footfall-shaped bursts
pub struct SyntheticMotion {
    cadence: Cadence,
    rng: StdRng,
    check_interval_ms: i64,
    since_check_ms: i64,
    probability: f64,
    burst_samples: u32,
    burst_magnitude: f64,
    burst_remaining: u32,
}

impl SyntheticMotion {
    pub fn new(config: &SimulationConfig, start_ms: i64) -> Self {
        Self {
            cadence: Cadence::new(
                config.sample_interval_ms,
                start_ms,
                config.max_catch_up_samples,
            ),
            rng: config.rng(0),
            check_interval_ms: config.step_check_interval_ms,
            since_check_ms: 0,
            probability: config.step_probability,
            burst_samples: config.burst_samples,
            burst_magnitude: config.burst_magnitude,
            burst_remaining: 0,
        }
    }

    fn next_linear(&mut self) -> f64 {
        if self.since_check_ms >= self.check_interval_ms {
            self.since_check_ms -= self.check_interval_ms;
            if self.burst_remaining == 0 && self.rng.gen_bool(self.probability) {
                self.burst_remaining = self.burst_samples;
            }
        }
        self.since_check_ms += self.cadence.interval_ms;

        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            self.burst_magnitude
        } else {
            0.0
        }
    }
}

impl SampleGenerator for SyntheticMotion {
    fn generate(&mut self, now_ms: i64) -> Vec<SourceSample> {
        self.cadence
            .due(now_ms)
            .into_iter()
            .map(|t| {
                let z = DEFAULT_GRAVITY + self.next_linear();
                SourceSample::Acceleration(AccelerationSample::new(0.0, 0.0, z, t))
            })
            .collect()
    }
}

/// Compass needle turning at a constant rate
pub struct SyntheticHeading {
    cadence: Cadence,
    angle: f64,
    step_degrees: f64,
}

impl SyntheticHeading {
    pub fn new(config: &SimulationConfig, start_ms: i64) -> Self {
        Self {
            // first turn happens one interval after start
            cadence: Cadence::new(
                config.heading_interval_ms,
                start_ms.saturating_add(config.heading_interval_ms),
                config.max_catch_up_samples,
            ),
            angle: 0.0,
            step_degrees: config.heading_step_degrees,
        }
    }
}

impl SampleGenerator for SyntheticHeading {
    fn generate(&mut self, now_ms: i64) -> Vec<SourceSample> {
        self.cadence
            .due(now_ms)
            .into_iter()
            .map(|t| {
                self.angle = (self.angle + self.step_degrees).rem_euclid(360.0);
                SourceSample::Orientation(OrientationSample::new(Some(self.angle), t))
            })
            .collect()
    }
}

/// Where one channel's samples come from
pub enum SignalSource {
    Device,
    Simulated(Box<dyn SampleGenerator>),
}

impl SignalSource {
    pub fn simulated_motion(config: &SimulationConfig, start_ms: i64) -> Self {
        SignalSource::Simulated(Box::new(SyntheticMotion::new(config, start_ms)))
    }

    pub fn simulated_heading(config: &SimulationConfig, start_ms: i64) -> Self {
        SignalSource::Simulated(Box::new(SyntheticHeading::new(config, start_ms)))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SignalSource::Device => SourceKind::Device,
            SignalSource::Simulated(_) => SourceKind::Simulated,
        }
    }

    /// Whether samples pushed by the platform belong to this channel
    pub fn accepts_device_samples(&self) -> bool {
        matches!(self, SignalSource::Device)
    }

    /// Synthetic samples due at `now_ms`; always empty for the device
    pub fn on_tick(&mut self, now_ms: i64) -> Vec<SourceSample> {
        match self {
            SignalSource::Device => Vec::new(),
            SignalSource::Simulated(generator) => generator.generate(now_ms),
        }
    }
}

impl std::fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Device => f.write_str("Device"),
            SignalSource::Simulated(_) => f.write_str("Simulated"),
        }
    }
}
