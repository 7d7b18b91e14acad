//! FitSphere sensing - sensor pipeline behind the FitSphere fitness dashboard
//!
//! Turns raw device signals into dashboard state through a deterministic,
//! single-threaded pipeline: accelerometer → step detection → per-minute
//! history, orientation → compass, location watch → position.
//!
//! The library never touches the platform. A host adapter (browser glue, iOS,
//! Android, or the `fitsphere` CLI replaying a recording) pushes events into a
//! [`SensorSession`] and consumes the [`DashboardUpdate`]s it emits. Devices
//! without sensors, or users who deny motion access, get simulated sources
//! instead of an error.
//!
//! ## Modules
//!
//! - **Components**: [`step_detector`], [`heading`], [`position`], [`aggregator`]
//! - **Sources**: [`source`] (device pass-through or seeded simulation)
//! - **Orchestration**: [`session`]
//! - **Recording format**: [`schema`] (`fitsphere.sensor_record.v1`)

pub mod aggregator;
pub mod config;
pub mod error;
pub mod heading;
pub mod position;
pub mod schema;
pub mod session;
pub mod source;
pub mod step_detector;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::MinuteAggregator;
pub use config::SessionConfig;
pub use error::{SensingError, SensorReadError};
pub use heading::HeadingTracker;
pub use position::PositionTracker;
pub use session::{DashboardSink, FnSink, SensorSession, SessionEvent, StartOutcome};
pub use source::{SampleGenerator, SignalSource};
pub use step_detector::StepDetector;
pub use types::{DashboardSnapshot, DashboardUpdate};

// Schema exports
pub use schema::{RecordAdapter, SensorRecord, SCHEMA_VERSION};

/// Library version, reported by the CLI and the FFI
pub const FITSPHERE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported alongside the version
pub const PRODUCER_NAME: &str = "fitsphere-sensing";
