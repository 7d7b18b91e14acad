//! Core types for the FitSphere sensing pipeline
//!
//! This module defines the data that flows through the pipeline: raw samples
//! pushed by the platform adapter, the derived step/compass/position values,
//! the per-minute chart buckets, and the updates published to the dashboard.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::SensorReadError;

/// Acceleration vector including gravity (m/s²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Motion event as delivered by the platform. Some devices fire motion events
/// without acceleration data; those are dropped without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionReading {
    pub acceleration: Option<Acceleration>,
    pub timestamp_ms: i64,
}

impl MotionReading {
    pub fn new(acceleration: Option<Acceleration>, timestamp_ms: i64) -> Self {
        Self {
            acceleration,
            timestamp_ms,
        }
    }

    /// Extract a validated acceleration sample
    pub fn sample(&self) -> Result<AccelerationSample, SensorReadError> {
        let acc = self
            .acceleration
            .ok_or(SensorReadError::MissingAcceleration)?;
        let sample = AccelerationSample::new(acc.x, acc.y, acc.z, self.timestamp_ms);
        sample.validate()?;
        Ok(sample)
    }
}

/// Single accelerometer sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_ms: i64,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: i64) -> Self {
        Self { x, y, z, timestamp_ms }
    }

    /// Euclidean norm of the acceleration vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn validate(&self) -> Result<(), SensorReadError> {
        for (axis, value) in [('x', self.x), ('y', self.y), ('z', self.z)] {
            if !value.is_finite() {
                return Err(SensorReadError::NonFiniteAcceleration { axis });
            }
        }
        Ok(())
    }
}

/// Single orientation sample. `heading_degrees` is compass-relative (0-360)
/// and absent when the device could not resolve a heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub heading_degrees: Option<f64>,
    pub timestamp_ms: i64,
}

impl OrientationSample {
    pub fn new(heading_degrees: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            heading_degrees,
            timestamp_ms,
        }
    }
}

/// A confirmed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub timestamp_ms: i64,
}

/// Eight-point compass rose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompassDirection {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "NE")]
    NorthEast,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "SE")]
    SouthEast,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "SW")]
    SouthWest,
    #[serde(rename = "W")]
    West,
    #[serde(rename = "NW")]
    NorthWest,
}

impl CompassDirection {
    /// Directions in bucket order, starting at north and going clockwise
    pub const ALL: [CompassDirection; 8] = [
        CompassDirection::North,
        CompassDirection::NorthEast,
        CompassDirection::East,
        CompassDirection::SouthEast,
        CompassDirection::South,
        CompassDirection::SouthWest,
        CompassDirection::West,
        CompassDirection::NorthWest,
    ];

    /// Map a heading to its 45° bucket. Headings are reduced modulo 360 first,
    /// so 360 (and any negative or wrapped value) lands in range.
    pub fn from_degrees(degrees: f64) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let bucket = (normalized / 45.0).round() as usize % Self::ALL.len();
        Self::ALL[bucket]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompassDirection::North => "N",
            CompassDirection::NorthEast => "NE",
            CompassDirection::East => "E",
            CompassDirection::SouthEast => "SE",
            CompassDirection::South => "S",
            CompassDirection::SouthWest => "SW",
            CompassDirection::West => "W",
            CompassDirection::NorthWest => "NW",
        }
    }
}

impl fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest resolved heading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompassState {
    pub heading_degrees: f64,
    pub direction: CompassDirection,
}

impl CompassState {
    pub fn from_heading(heading_degrees: f64) -> Self {
        Self {
            heading_degrees,
            direction: CompassDirection::from_degrees(heading_degrees),
        }
    }

    /// Whole degrees as shown on the dial
    pub fn rounded_degrees(&self) -> i64 {
        self.heading_degrees.rem_euclid(360.0).round() as i64 % 360
    }
}

/// Resolved geographic position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
}

impl PositionFix {
    /// Build a fix, rejecting non-finite or out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, SensorReadError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(SensorReadError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for PositionFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}°, {:.5}°", self.latitude, self.longitude)
    }
}

/// Why no position can be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionUnavailableReason {
    /// The user refused location access
    PermissionDenied,
    /// The platform has no geolocation support
    Unsupported,
    /// No fix arrived within the configured timeout
    Timeout,
    /// The platform reported it could not determine a position
    SignalLost,
}

impl fmt::Display for PositionUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PositionUnavailableReason::PermissionDenied => "location permission denied",
            PositionUnavailableReason::Unsupported => "geolocation not supported",
            PositionUnavailableReason::Timeout => "timed out waiting for a fix",
            PositionUnavailableReason::SignalLost => "position could not be determined",
        };
        f.write_str(text)
    }
}

/// What the dashboard shows in the location card
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PositionState {
    Fix(PositionFix),
    Unavailable { reason: PositionUnavailableReason },
}

/// Error codes reported by a platform location watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

/// Raw location callback from the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationEvent {
    Fix {
        latitude: f64,
        longitude: f64,
        timestamp_ms: i64,
    },
    Error {
        code: LocationErrorCode,
        timestamp_ms: i64,
    },
}

impl LocationEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            LocationEvent::Fix { timestamp_ms, .. } | LocationEvent::Error { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }
}

/// Steps recorded during one completed wall-clock minute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteBucket {
    /// Minute of the hour, zero padded ("00".."59")
    pub minute_label: String,
    pub step_count: u64,
}

/// Where a channel's samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Device,
    Simulated,
}

/// Platform capability snapshot, probed once at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Device motion events exist
    #[serde(default)]
    pub motion: bool,
    /// Device orientation events exist
    #[serde(default)]
    pub orientation: bool,
    /// Motion access must be explicitly granted by the user
    #[serde(default)]
    pub permission_required: bool,
    /// A geolocation API exists
    #[serde(default)]
    pub geolocation: bool,
}

/// Result of the asynchronous motion permission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum PermissionOutcome {
    Granted,
    Denied,
    Error(String),
}

/// Identifies one permission request so late or duplicate answers can be ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionRequestId(pub u64);

/// Why motion and heading run on simulated sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum FallbackReason {
    PermissionDenied,
    PermissionError(String),
    CapabilityUnavailable,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingPermission {
        request: Option<PermissionRequestId>,
    },
    Active {
        motion: SourceKind,
        heading: SourceKind,
    },
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingPermission { .. } => "awaiting_permission",
            SessionState::Active { .. } => "active",
            SessionState::Stopped => "stopped",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }
}

/// A single change pushed to the dashboard sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DashboardUpdate {
    Session {
        state: SessionState,
        fallback: Option<FallbackReason>,
    },
    Control {
        enabled: bool,
        label: String,
    },
    Steps {
        total: u64,
        current_minute: u64,
        last_step_ms: Option<i64>,
    },
    Compass(CompassState),
    Position(PositionState),
    History {
        buckets: Vec<MinuteBucket>,
    },
}

/// Full dashboard view, for hosts that poll instead of consuming updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub fallback: Option<FallbackReason>,
    pub total_steps: u64,
    pub current_minute_steps: u64,
    pub compass: Option<CompassState>,
    pub position: Option<PositionState>,
    pub history: Vec<MinuteBucket>,
}
