//! fitsphere.sensor_record.v1 schema definition
//!
//! One JSON object per platform callback, tagged by `"type"`. A recording of
//! these records is enough to reproduce a session exactly: the platform
//! adapter writes them as events arrive and `replay` feeds them back in order.

use serde::{Deserialize, Serialize};

use crate::types::{Acceleration, Capabilities, LocationErrorCode, PermissionRequestId};

/// Current schema version
pub const SCHEMA_VERSION: &str = "fitsphere.sensor_record.v1";

/// Answer to the motion permission prompt, as recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Error,
}

/// One recorded platform callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorRecord {
    /// User pressed start; carries the capability probe
    Start {
        t: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        #[serde(default)]
        capabilities: Capabilities,
    },
    Permission {
        t: i64,
        /// Request being answered; omitted means the pending one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request: Option<PermissionRequestId>,
        status: PermissionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Motion {
        t: i64,
        #[serde(default)]
        acceleration: Option<Acceleration>,
    },
    Orientation {
        t: i64,
        #[serde(default)]
        heading_degrees: Option<f64>,
    },
    Location {
        t: i64,
        latitude: f64,
        longitude: f64,
    },
    LocationError {
        t: i64,
        code: LocationErrorCode,
    },
    Tick {
        t: i64,
    },
    Stop {
        t: i64,
    },
}

impl SensorRecord {
    /// Record timestamp (epoch ms)
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            SensorRecord::Start { t, .. }
            | SensorRecord::Permission { t, .. }
            | SensorRecord::Motion { t, .. }
            | SensorRecord::Orientation { t, .. }
            | SensorRecord::Location { t, .. }
            | SensorRecord::LocationError { t, .. }
            | SensorRecord::Tick { t }
            | SensorRecord::Stop { t } => *t,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SensorRecord::Start { .. } => "start",
            SensorRecord::Permission { .. } => "permission",
            SensorRecord::Motion { .. } => "motion",
            SensorRecord::Orientation { .. } => "orientation",
            SensorRecord::Location { .. } => "location",
            SensorRecord::LocationError { .. } => "location_error",
            SensorRecord::Tick { .. } => "tick",
            SensorRecord::Stop { .. } => "stop",
        }
    }

    /// Structural checks on a single record
    pub fn validate(&self) -> Result<(), ValidationError> {
        let t = self.timestamp_ms();
        if t < 0 {
            return Err(ValidationError::NegativeTimestamp { t });
        }

        match self {
            SensorRecord::Start {
                schema: Some(schema),
                ..
            } if schema != SCHEMA_VERSION => Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: schema.clone(),
            }),
            SensorRecord::Permission {
                status, message, ..
            } => match (status, message) {
                (PermissionStatus::Error, _) | (_, None) => Ok(()),
                (status, Some(_)) => Err(ValidationError::UnexpectedMessage {
                    status: format!("{:?}", status).to_lowercase(),
                }),
            },
            SensorRecord::Location {
                latitude,
                longitude,
                ..
            } if !(latitude.abs() <= 90.0 && longitude.abs() <= 180.0) => {
                Err(ValidationError::InvalidCoordinate {
                    latitude: *latitude,
                    longitude: *longitude,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Validation errors for sensor records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Negative timestamp: {t}")]
    NegativeTimestamp { t: i64 },

    #[error("Coordinate out of range: {latitude}, {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Permission status {status} does not carry a message")]
    UnexpectedMessage { status: String },

    #[error("Timestamp {t} is earlier than the previous record ({previous})")]
    OutOfOrder { previous: i64, t: i64 },

    #[error("Recording must begin with a start record, found {found}")]
    MissingStart { found: String },

    #[error("Second start record at {t}")]
    DuplicateStart { t: i64 },
}
