//! Error types for FitSphere sensing

use thiserror::Error;

use crate::types::PositionUnavailableReason;

/// Errors that can occur while driving a sensing session
#[derive(Debug, Error)]
pub enum SensingError {
    #[error("Motion permission denied")]
    PermissionDenied,

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Sensor read error: {0}")]
    SensorRead(#[from] SensorReadError),

    #[error("Position unavailable: {0}")]
    PositionUnavailable(PositionUnavailableReason),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("Cannot {action} while session is {state}")]
    InvalidTransition { state: String, action: &'static str },

    #[error("Failed to parse sensor record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A single malformed sample. Always dropped, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorReadError {
    #[error("motion event carried no acceleration data")]
    MissingAcceleration,

    #[error("acceleration {axis} component is not finite")]
    NonFiniteAcceleration { axis: char },

    #[error("heading is not finite")]
    NonFiniteHeading,

    #[error("coordinate out of range: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}
