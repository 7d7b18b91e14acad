//! Compass heading
//!
//! Headings arrive already compass-relative, so they are stored as delivered
//! and only bucketed into an eight-point direction. No smoothing or unwrapping.

use tracing::debug;

use crate::error::SensorReadError;
use crate::types::{CompassState, OrientationSample};

/// Keeps the last resolved heading
#[derive(Debug, Clone, Default)]
pub struct HeadingTracker {
    state: Option<CompassState>,
}

impl HeadingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a sample. Samples without a heading leave the previous state in place.
    pub fn ingest(&mut self, sample: &OrientationSample) -> Option<CompassState> {
        let heading = sample.heading_degrees?;
        if !heading.is_finite() {
            debug!(
                error = %SensorReadError::NonFiniteHeading,
                timestamp_ms = sample.timestamp_ms,
                "dropping orientation sample"
            );
            return None;
        }

        let state = CompassState::from_heading(heading);
        self.state = Some(state);
        Some(state)
    }

    pub fn current(&self) -> Option<CompassState> {
        self.state
    }
}
