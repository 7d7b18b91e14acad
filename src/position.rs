//! Live position tracking
//!
//! The tracker mirrors a continuous platform location watch: every valid fix
//! overwrites the previous one, platform errors become an explicit unavailable
//! state, and a watch that produces nothing within the timeout reports
//! [`PositionUnavailableReason::Timeout`] instead of staying silent.
//!
//! All methods return the state change to publish, if any.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SensingError;
use crate::types::{
    LocationErrorCode, LocationEvent, PositionFix, PositionState, PositionUnavailableReason,
};

/// Default wait for a fix before reporting unavailability (ms)
pub const DEFAULT_POSITION_TIMEOUT_MS: i64 = 5_000;

/// Configuration for the location watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Maximum wait for a fix (ms)
    pub timeout_ms: i64,
    /// Request the most precise fix the platform can produce
    pub high_accuracy: bool,
    /// Oldest cached fix the platform may hand back (ms); 0 forces a fresh fix
    pub maximum_age_ms: i64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_POSITION_TIMEOUT_MS,
            high_accuracy: true,
            maximum_age_ms: 0,
        }
    }
}

impl PositionConfig {
    pub fn validate(&self) -> Result<(), SensingError> {
        if self.timeout_ms <= 0 {
            return Err(SensingError::InvalidConfig(format!(
                "position timeout_ms must be positive, got {}",
                self.timeout_ms
            )));
        }
        if self.maximum_age_ms < 0 {
            return Err(SensingError::InvalidConfig(format!(
                "position maximum_age_ms must not be negative, got {}",
                self.maximum_age_ms
            )));
        }
        Ok(())
    }

    /// Options the platform adapter should open its watch with
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            timeout_ms: self.timeout_ms,
            maximum_age_ms: self.maximum_age_ms,
        }
    }
}

/// Parameters for the platform's continuous location watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout_ms: i64,
    pub maximum_age_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watch {
    Off,
    /// Waiting for the first fix after start
    Pending { deadline_ms: i64 },
    Running,
}

/// Continuous position tracker, overwriting state on every fix
#[derive(Debug, Clone)]
pub struct PositionTracker {
    config: PositionConfig,
    watch: Watch,
    state: Option<PositionState>,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(PositionConfig::default())
    }
}

impl PositionTracker {
    pub fn new(config: PositionConfig) -> Self {
        Self {
            config,
            watch: Watch::Off,
            state: None,
        }
    }

    /// Begin tracking. Without platform support this reports `Unsupported`
    /// right away; otherwise the timeout starts running.
    pub fn start(&mut self, supported: bool, now_ms: i64) -> Option<PositionState> {
        if !supported {
            info!("geolocation not supported");
            self.watch = Watch::Off;
            return self.report_unavailable(PositionUnavailableReason::Unsupported);
        }

        self.watch = Watch::Pending {
            deadline_ms: now_ms.saturating_add(self.config.timeout_ms),
        };
        debug!(timeout_ms = self.config.timeout_ms, "location watch started");
        None
    }

    /// Apply a platform location callback
    pub fn on_location(&mut self, event: &LocationEvent) -> Option<PositionState> {
        if self.watch == Watch::Off {
            debug!("location event without an active watch, ignoring");
            return None;
        }

        match *event {
            LocationEvent::Fix {
                latitude,
                longitude,
                timestamp_ms,
            } => match PositionFix::new(latitude, longitude) {
                Ok(fix) => {
                    self.watch = Watch::Running;
                    let state = PositionState::Fix(fix);
                    self.state = Some(state);
                    Some(state)
                }
                Err(e) => {
                    debug!(error = %e, timestamp_ms, "dropping location fix");
                    None
                }
            },
            LocationEvent::Error { code, .. } => {
                let reason = match code {
                    LocationErrorCode::PermissionDenied => PositionUnavailableReason::PermissionDenied,
                    LocationErrorCode::PositionUnavailable => PositionUnavailableReason::SignalLost,
                    LocationErrorCode::Timeout => PositionUnavailableReason::Timeout,
                };
                warn!(error = %SensingError::PositionUnavailable(reason), "location watch error");
                self.watch = Watch::Running;
                self.report_unavailable(reason)
            }
        }
    }

    /// Heartbeat; expires a pending watch once the timeout has passed
    pub fn on_tick(&mut self, now_ms: i64) -> Option<PositionState> {
        match self.watch {
            Watch::Pending { deadline_ms } if now_ms >= deadline_ms => {
                warn!(
                    timeout_ms = self.config.timeout_ms,
                    "no location fix within timeout"
                );
                // keep the watch open, a late fix still overwrites
                self.watch = Watch::Running;
                self.report_unavailable(PositionUnavailableReason::Timeout)
            }
            _ => None,
        }
    }

    pub fn stop(&mut self) {
        self.watch = Watch::Off;
    }

    pub fn is_watching(&self) -> bool {
        self.watch != Watch::Off
    }

    pub fn current(&self) -> Option<PositionState> {
        self.state
    }

    fn report_unavailable(&mut self, reason: PositionUnavailableReason) -> Option<PositionState> {
        let state = PositionState::Unavailable { reason };
        if self.state == Some(state) {
            return None;
        }
        self.state = Some(state);
        Some(state)
    }
}
