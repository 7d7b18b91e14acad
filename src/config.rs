//! Session configuration
//!
//! Every section has defaults, so an empty JSON object is a valid config and
//! a partial file overrides only the fields it names.

use serde::{Deserialize, Serialize};

use crate::aggregator::ChartConfig;
use crate::error::SensingError;
use crate::position::PositionConfig;
use crate::source::SimulationConfig;
use crate::step_detector::StepDetectorConfig;

/// Tunables for one sensing session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub step: StepDetectorConfig,
    pub position: PositionConfig,
    pub chart: ChartConfig,
    pub simulation: SimulationConfig,
}

impl SessionConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, SensingError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SensingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SensingError> {
        self.step.validate()?;
        self.position.validate()?;
        self.chart.validate()?;
        self.simulation.validate()
    }
}
