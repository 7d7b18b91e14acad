//! Adapter between recorded sensor records and session events
//!
//! Parses recordings (NDJSON or a JSON array), validates them as a sequence,
//! and turns each record into the [`SessionEvent`] the session consumes.

use crate::error::SensingError;
use crate::schema::record::*;
use crate::session::SessionEvent;
use crate::types::{
    LocationEvent, MotionReading, OrientationSample, PermissionOutcome, PermissionRequestId,
};

/// Adapter for converting sensor records to session events
pub struct RecordAdapter;

impl RecordAdapter {
    /// Parse a JSON string containing an array of SensorRecords
    pub fn parse_array(json: &str) -> Result<Vec<SensorRecord>, SensingError> {
        let records: Vec<SensorRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing SensorRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SensorRecord>, SensingError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SensorRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(SensingError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse either format, picking the array form when the input starts with `[`
    pub fn parse(input: &str) -> Result<Vec<SensorRecord>, SensingError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Validate a recording. Returns one `(index, error)` per problem found;
    /// an empty list means the recording can be replayed.
    pub fn validate_records(records: &[SensorRecord]) -> Vec<(usize, ValidationError)> {
        let mut errors = Vec::new();
        let mut previous: Option<i64> = None;
        let mut started = false;

        for (index, record) in records.iter().enumerate() {
            if let Err(e) = record.validate() {
                errors.push((index, e));
            }

            let t = record.timestamp_ms();
            if let Some(previous) = previous {
                if t < previous {
                    errors.push((index, ValidationError::OutOfOrder { previous, t }));
                }
            }
            previous = Some(previous.map_or(t, |p| p.max(t)));

            match record {
                SensorRecord::Start { .. } if started => {
                    errors.push((index, ValidationError::DuplicateStart { t }));
                }
                SensorRecord::Start { .. } => started = true,
                _ if index == 0 => errors.push((
                    index,
                    ValidationError::MissingStart {
                        found: record.type_name().to_string(),
                    },
                )),
                _ => {}
            }
        }

        errors
    }

    /// Convert a record into the event the session consumes.
    ///
    /// A permission record without a request id answers `pending`, the
    /// request the session is currently waiting on.
    pub fn to_event(record: &SensorRecord, pending: Option<PermissionRequestId>) -> SessionEvent {
        match record {
            SensorRecord::Start {
                t, capabilities, ..
            } => SessionEvent::Start {
                capabilities: *capabilities,
                now_ms: *t,
            },
            SensorRecord::Permission {
                t,
                request,
                status,
                message,
            } => {
                let outcome = match status {
                    PermissionStatus::Granted => PermissionOutcome::Granted,
                    PermissionStatus::Denied => PermissionOutcome::Denied,
                    PermissionStatus::Error => {
                        PermissionOutcome::Error(message.clone().unwrap_or_default())
                    }
                };
                SessionEvent::PermissionResolved {
                    request: request.or(pending).unwrap_or(PermissionRequestId(0)),
                    outcome,
                    now_ms: *t,
                }
            }
            SensorRecord::Motion { t, acceleration } => {
                SessionEvent::Motion(MotionReading::new(*acceleration, *t))
            }
            SensorRecord::Orientation { t, heading_degrees } => {
                SessionEvent::Orientation(OrientationSample::new(*heading_degrees, *t))
            }
            SensorRecord::Location {
                t,
                latitude,
                longitude,
            } => SessionEvent::Location(LocationEvent::Fix {
                latitude: *latitude,
                longitude: *longitude,
                timestamp_ms: *t,
            }),
            SensorRecord::LocationError { t, code } => SessionEvent::Location(LocationEvent::Error {
                code: *code,
                timestamp_ms: *t,
            }),
            SensorRecord::Tick { t } => SessionEvent::Tick { now_ms: *t },
            SensorRecord::Stop { .. } => SessionEvent::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Acceleration, Capabilities};
    use pretty_assertions::assert_eq;

    const RECORDING: &str = r#"
{"type":"start","t":1000,"capabilities":{"motion":true,"orientation":true,"permission_required":true,"geolocation":true}}
{"type":"permission","t":1200,"status":"granted"}
{"type":"motion","t":1250,"acceleration":{"x":0.0,"y":0.0,"z":12.8}}

{"type":"orientation","t":1260,"heading_degrees":181.0}
{"type":"location","t":1300,"latitude":48.8584,"longitude":2.2945}
{"type":"tick","t":2000}
{"type":"stop","t":3000}
"#;

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let records = RecordAdapter::parse_ndjson(RECORDING).unwrap();
        assert_eq!(records.len(), 7);
        assert!(RecordAdapter::validate_records(&records).is_empty());
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let err = RecordAdapter::parse_ndjson("{\"type\":\"tick\",\"t\":1}\n{oops}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_detects_array() {
        let records =
            RecordAdapter::parse(r#"[{"type":"start","t":0},{"type":"stop","t":5}]"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_validate_sequence() {
        let records = vec![
            SensorRecord::Tick { t: 10 },
            SensorRecord::Start {
                t: 20,
                schema: None,
                capabilities: Capabilities::default(),
            },
            SensorRecord::Tick { t: 15 },
            SensorRecord::Start {
                t: 30,
                schema: None,
                capabilities: Capabilities::default(),
            },
        ];
        let errors = RecordAdapter::validate_records(&records);
        assert_eq!(
            errors,
            vec![
                (
                    0,
                    ValidationError::MissingStart {
                        found: "tick".to_string()
                    }
                ),
                (2, ValidationError::OutOfOrder { previous: 20, t: 15 }),
                (3, ValidationError::DuplicateStart { t: 30 }),
            ]
        );
    }

    #[test]
    fn test_permission_defaults_to_pending_request() {
        let record = SensorRecord::Permission {
            t: 5,
            request: None,
            status: PermissionStatus::Error,
            message: Some("NotAllowedError".to_string()),
        };
        assert_eq!(
            RecordAdapter::to_event(&record, Some(PermissionRequestId(3))),
            SessionEvent::PermissionResolved {
                request: PermissionRequestId(3),
                outcome: PermissionOutcome::Error("NotAllowedError".to_string()),
                now_ms: 5,
            }
        );
        assert!(matches!(
            RecordAdapter::to_event(&record, None),
            SessionEvent::PermissionResolved {
                request: PermissionRequestId(0),
                ..
            }
        ));
    }

    #[test]
    fn test_to_event_motion() {
        let record = SensorRecord::Motion {
            t: 42,
            acceleration: Some(Acceleration {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            }),
        };
        let SessionEvent::Motion(reading) = RecordAdapter::to_event(&record, None) else {
            panic!("expected a motion event");
        };
        assert_eq!(reading.timestamp_ms, 42);
        assert_eq!(reading.acceleration.unwrap().z, 3.0);
    }
}
