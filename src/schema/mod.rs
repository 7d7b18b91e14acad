//! fitsphere.sensor_record.v1 recording format
//!
//! Defines the wire records a platform adapter emits for every sensor
//! callback and the adapter that replays them into a session.

mod adapter;
mod record;

pub use adapter::*;
pub use record::*;
