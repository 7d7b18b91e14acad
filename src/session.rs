//! Sensor session orchestration
//!
//! A [`SensorSession`] owns every per-session component and runs the
//! lifecycle state machine:
//!
//! ```text
//! Idle -> AwaitingPermission -> Active { motion, heading } -> Stopped
//! ```
//!
//! Sources are chosen once, at activation, from the capability probe and the
//! permission outcome. Denied or failed permission and missing capabilities
//! fall back to simulated sources; nothing here fails the session. Location
//! tracking starts with the session and does not depend on motion permission.
//!
//! The session is single threaded and sans-IO: the platform adapter pushes
//! events in arrival order and the session pushes [`DashboardUpdate`]s to its
//! sink. It never blocks and never reads the clock itself.

use chrono::FixedOffset;
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::aggregator::MinuteAggregator;
use crate::config::SessionConfig;
use crate::error::SensingError;
use crate::heading::HeadingTracker;
use crate::position::{PositionTracker, WatchOptions};
use crate::source::{SignalSource, SourceSample};
use crate::step_detector::StepDetector;
use crate::types::{
    AccelerationSample, Capabilities, DashboardSnapshot, DashboardUpdate, FallbackReason,
    LocationEvent, MinuteBucket, MotionReading, OrientationSample, PermissionOutcome,
    PermissionRequestId, PositionState, SessionState, SourceKind,
};

const LABEL_REQUESTING: &str = "Requesting Motion Permission";
const LABEL_DEVICE: &str = "Step Counter Enabled";
const LABEL_SIMULATED: &str = "Simulated Step Counter Enabled";
const LABEL_STOPPED: &str = "Step Counter Stopped";

/// Receives dashboard updates pushed by a session
pub trait DashboardSink {
    fn publish(&mut self, update: DashboardUpdate);
}

impl DashboardSink for Vec<DashboardUpdate> {
    fn publish(&mut self, update: DashboardUpdate) {
        self.push(update);
    }
}

/// Adapts a closure into a sink
pub struct FnSink<F>(pub F);

impl<F: FnMut(DashboardUpdate)> DashboardSink for FnSink<F> {
    fn publish(&mut self, update: DashboardUpdate) {
        (self.0)(update)
    }
}

/// What the platform adapter has to do after `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    /// Ask the user for motion access and answer with this id
    pub permission_request: Option<PermissionRequestId>,
    /// Open a continuous location watch with these options
    pub location_watch: Option<WatchOptions>,
}

/// One entry on the session's event queue
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Start {
        capabilities: Capabilities,
        now_ms: i64,
    },
    PermissionResolved {
        request: PermissionRequestId,
        outcome: PermissionOutcome,
        now_ms: i64,
    },
    Motion(MotionReading),
    Orientation(OrientationSample),
    Location(LocationEvent),
    Tick {
        now_ms: i64,
    },
    Stop,
}

/// Live dashboard session: sources, detectors and the per-minute history
pub struct SensorSession<S: DashboardSink> {
    id: Uuid,
    config: SessionConfig,
    sink: S,
    state: SessionState,
    fallback: Option<FallbackReason>,
    capabilities: Capabilities,
    last_request: u64,
    motion_source: SignalSource,
    heading_source: SignalSource,
    steps: StepDetector,
    heading: HeadingTracker,
    position: PositionTracker,
    minutes: MinuteAggregator,
    minute_tally: u64,
}

impl<S: DashboardSink> SensorSession<S> {
    /// Create an idle session; fails only on an invalid config
    pub fn new(config: SessionConfig, sink: S) -> Result<Self, SensingError> {
        config.validate()?;
        let offset: FixedOffset = config.chart.offset()?;

        Ok(Self {
            id: Uuid::new_v4(),
            steps: StepDetector::new(config.step.clone()),
            heading: HeadingTracker::new(),
            position: PositionTracker::new(config.position.clone()),
            minutes: MinuteAggregator::new(offset),
            config,
            sink,
            state: SessionState::Idle,
            fallback: None,
            capabilities: Capabilities::default(),
            last_request: 0,
            motion_source: SignalSource::Device,
            heading_source: SignalSource::Device,
            minute_tally: 0,
        })
    }

    /// Dispatch one queued event
    pub fn handle(&mut self, event: SessionEvent) -> Result<(), SensingError> {
        match event {
            SessionEvent::Start {
                capabilities,
                now_ms,
            } => {
                self.start(capabilities, now_ms)?;
            }
            SessionEvent::PermissionResolved {
                request,
                outcome,
                now_ms,
            } => self.resolve_permission(request, outcome, now_ms),
            SessionEvent::Motion(reading) => self.on_motion(&reading),
            SessionEvent::Orientation(sample) => self.on_orientation(&sample),
            SessionEvent::Location(event) => self.on_location(&event),
            SessionEvent::Tick { now_ms } => self.tick(now_ms),
            SessionEvent::Stop => self.stop(),
        }
        Ok(())
    }

    /// User-initiated start
    pub fn start(
        &mut self,
        capabilities: Capabilities,
        now_ms: i64,
    ) -> Result<StartOutcome, SensingError> {
        if self.state != SessionState::Idle {
            return Err(SensingError::InvalidTransition {
                state: self.state.as_str().to_string(),
                action: "start",
            });
        }
        if now_ms < 0 {
            return Err(SensingError::InvalidTimestamp(now_ms));
        }

        info!(session = %self.id, ?capabilities, "session starting");
        self.capabilities = capabilities;
        self.minutes.start(now_ms);
        self.set_state(SessionState::AwaitingPermission { request: None });
        self.publish_control(false, LABEL_REQUESTING);

        let location_watch = capabilities
            .geolocation
            .then(|| self.config.position.watch_options());
        if let Some(state) = self.position.start(capabilities.geolocation, now_ms) {
            self.publish_position(state);
        }

        if !capabilities.motion {
            warn!(
                error = %SensingError::CapabilityUnavailable("device motion".to_string()),
                "no motion sensors, using simulated sources"
            );
            self.activate_simulated(FallbackReason::CapabilityUnavailable, now_ms);
            return Ok(StartOutcome {
                permission_request: None,
                location_watch,
            });
        }

        if capabilities.permission_required {
            self.last_request += 1;
            let request = PermissionRequestId(self.last_request);
            debug!(?request, "motion permission requested");
            self.set_state(SessionState::AwaitingPermission {
                request: Some(request),
            });
            return Ok(StartOutcome {
                permission_request: Some(request),
                location_watch,
            });
        }

        self.activate_device(now_ms);
        Ok(StartOutcome {
            permission_request: None,
            location_watch,
        })
    }

    /// Answer to a permission request. Stale or unknown ids are ignored,
    /// which covers answers arriving after `stop`.
    pub fn resolve_permission(
        &mut self,
        request: PermissionRequestId,
        outcome: PermissionOutcome,
        now_ms: i64,
    ) {
        let pending = match self.state {
            SessionState::AwaitingPermission { request } => request,
            _ => None,
        };
        if pending != Some(request) {
            debug!(
                ?request,
                state = self.state.as_str(),
                "ignoring stale permission result"
            );
            return;
        }

        match outcome {
            PermissionOutcome::Granted => self.activate_device(now_ms),
            PermissionOutcome::Denied => {
                warn!(error = %SensingError::PermissionDenied, "using simulated sources");
                self.activate_simulated(FallbackReason::PermissionDenied, now_ms);
            }
            PermissionOutcome::Error(message) => {
                warn!(%message, "motion permission request failed, using simulated sources");
                self.activate_simulated(FallbackReason::PermissionError(message), now_ms);
            }
        }
    }

    /// Device motion event
    pub fn on_motion(&mut self, reading: &MotionReading) {
        if !self.state.is_active() || !self.motion_source.accepts_device_samples() {
            trace!(state = self.state.as_str(), "motion event not routed");
            return;
        }
        match reading.sample() {
            Ok(sample) => self.ingest_acceleration(&sample),
            Err(e) => debug!(error = %e, timestamp_ms = reading.timestamp_ms, "dropping motion event"),
        }
    }

    /// Device orientation event
    pub fn on_orientation(&mut self, sample: &OrientationSample) {
        if !self.state.is_active() || !self.heading_source.accepts_device_samples() {
            trace!(state = self.state.as_str(), "orientation event not routed");
            return;
        }
        self.ingest_orientation(sample);
    }

    /// Location watch callback
    pub fn on_location(&mut self, event: &LocationEvent) {
        if matches!(self.state, SessionState::Idle | SessionState::Stopped) {
            trace!(state = self.state.as_str(), "location event not routed");
            return;
        }
        if let Some(state) = self.position.on_location(event) {
            self.publish_position(state);
        }
    }

    /// Heartbeat: drives simulated sources, the location timeout and minute rollover
    pub fn tick(&mut self, now_ms: i64) {
        if matches!(self.state, SessionState::Idle | SessionState::Stopped) {
            return;
        }

        let mut generated = self.motion_source.on_tick(now_ms);
        generated.extend(self.heading_source.on_tick(now_ms));
        generated.sort_by_key(SourceSample::timestamp_ms);
        for sample in generated {
            // close the minute a late tick has already passed before counting into it
            self.roll_minute(sample.timestamp_ms());
            match sample {
                SourceSample::Acceleration(sample) => self.ingest_acceleration(&sample),
                SourceSample::Orientation(sample) => self.ingest_orientation(&sample),
            }
        }

        if let Some(state) = self.position.on_tick(now_ms) {
            self.publish_position(state);
        }

        self.roll_minute(now_ms);
    }

    /// Tear down. No state changes after this; the adapter must remove its
    /// listeners and location watch.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        info!(
            session = %self.id,
            total_steps = self.steps.step_count(),
            "session stopped"
        );
        self.motion_source = SignalSource::Device;
        self.heading_source = SignalSource::Device;
        self.position.stop();
        self.set_state(SessionState::Stopped);
        self.publish_control(false, LABEL_STOPPED);
    }

    fn activate_device(&mut self, now_ms: i64) {
        self.motion_source = SignalSource::Device;
        self.heading_source = if self.capabilities.orientation {
            SignalSource::Device
        } else {
            info!("no orientation sensor, simulating heading");
            SignalSource::simulated_heading(&self.config.simulation, now_ms)
        };
        self.fallback = None;
        self.activate(LABEL_DEVICE);
    }

    fn activate_simulated(&mut self, reason: FallbackReason, now_ms: i64) {
        self.motion_source = SignalSource::simulated_motion(&self.config.simulation, now_ms);
        self.heading_source = SignalSource::simulated_heading(&self.config.simulation, now_ms);
        self.fallback = Some(reason);
        self.activate(LABEL_SIMULATED);
    }

    fn activate(&mut self, label: &str) {
        self.set_state(SessionState::Active {
            motion: self.motion_source.kind(),
            heading: self.heading_source.kind(),
        });
        self.publish_control(false, label);
        self.publish_steps();
    }

    fn roll_minute(&mut self, now_ms: i64) {
        if self.minutes.on_tick(now_ms, self.minute_tally).is_some() {
            self.minute_tally = 0;
            self.sink.publish(DashboardUpdate::History {
                buckets: self.minutes.buckets().to_vec(),
            });
            self.publish_steps();
        }
    }

    fn ingest_acceleration(&mut self, sample: &AccelerationSample) {
        if self.steps.ingest(sample).is_some() {
            self.minute_tally += 1;
            self.publish_steps();
        }
    }

    fn ingest_orientation(&mut self, sample: &OrientationSample) {
        if let Some(compass) = self.heading.ingest(sample) {
            self.sink.publish(DashboardUpdate::Compass(compass));
        }
    }

    fn set_state(&mut self, state: SessionState) {
        info!(session = %self.id, from = self.state.as_str(), to = state.as_str(), "session state");
        self.state = state;
        self.sink.publish(DashboardUpdate::Session {
            state,
            fallback: self.fallback.clone(),
        });
    }

    fn publish_control(&mut self, enabled: bool, label: &str) {
        self.sink.publish(DashboardUpdate::Control {
            enabled,
            label: label.to_string(),
        });
    }

    fn publish_steps(&mut self) {
        self.sink.publish(DashboardUpdate::Steps {
            total: self.steps.step_count(),
            current_minute: self.minute_tally,
            last_step_ms: self.steps.last_step_ms(),
        });
    }

    fn publish_position(&mut self, state: PositionState) {
        self.sink.publish(DashboardUpdate::Position(state));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn fallback(&self) -> Option<&FallbackReason> {
        self.fallback.as_ref()
    }

    /// Id of the permission request the session is waiting on
    pub fn pending_permission(&self) -> Option<PermissionRequestId> {
        match self.state {
            SessionState::AwaitingPermission { request } => request,
            _ => None,
        }
    }

    pub fn motion_source(&self) -> SourceKind {
        self.motion_source.kind()
    }

    pub fn heading_source(&self) -> SourceKind {
        self.heading_source.kind()
    }

    /// Steps since the session started
    pub fn total_steps(&self) -> u64 {
        self.steps.step_count()
    }

    /// Steps in the minute that is still open
    pub fn current_minute_steps(&self) -> u64 {
        self.minute_tally
    }

    pub fn history(&self) -> &[MinuteBucket] {
        self.minutes.buckets()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            session_id: self.id,
            state: self.state,
            fallback: self.fallback.clone(),
            total_steps: self.steps.step_count(),
            current_minute_steps: self.minute_tally,
            compass: self.heading.current(),
            position: self.position.current(),
            history: self.minutes.buckets().to_vec(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step_detector::DEFAULT_GRAVITY;
    use crate::types::{
        Acceleration, CompassDirection, LocationErrorCode, PositionFix,
        PositionUnavailableReason,
    };
    use pretty_assertions::assert_eq;

    /// 2024-01-15T14:07:00Z
    const BASE: i64 = 1_705_327_620_000;
    const MINUTE: i64 = 60_000;

    fn seeded_config(probability: f64) -> SessionConfig {
        let mut config = SessionConfig::default();
        config.simulation.seed = Some(11);
        config.simulation.step_probability = probability;
        config
    }

    fn session() -> SensorSession<Vec<DashboardUpdate>> {
        SensorSession::new(seeded_config(0.05), Vec::new()).unwrap()
    }

    fn all_capabilities() -> Capabilities {
        Capabilities {
            motion: true,
            orientation: true,
            permission_required: false,
            geolocation: true,
        }
    }

    fn motion(linear: f64, timestamp_ms: i64) -> MotionReading {
        MotionReading::new(
            Some(Acceleration {
                x: 0.0,
                y: 0.0,
                z: DEFAULT_GRAVITY + linear,
            }),
            timestamp_ms,
        )
    }

    fn drain(s: &mut SensorSession<Vec<DashboardUpdate>>) -> Vec<DashboardUpdate> {
        std::mem::take(s.sink_mut())
    }

    fn assert_sum_invariant(s: &SensorSession<Vec<DashboardUpdate>>) {
        let closed: u64 = s.history().iter().map(|b| b.step_count).sum();
        assert_eq!(closed + s.current_minute_steps(), s.total_steps());
    }

    #[test]
    fn test_no_motion_support_goes_straight_to_simulation() {
        let mut s = session();
        let outcome = s
            .start(
                Capabilities {
                    geolocation: true,
                    ..Capabilities::default()
                },
                BASE,
            )
            .unwrap();

        assert_eq!(outcome.permission_request, None);
        assert!(outcome.location_watch.is_some());
        assert_eq!(
            s.state(),
            SessionState::Active {
                motion: SourceKind::Simulated,
                heading: SourceKind::Simulated
            }
        );
        assert_eq!(s.fallback(), Some(&FallbackReason::CapabilityUnavailable));

        let updates = drain(&mut s);
        assert!(updates.contains(&DashboardUpdate::Control {
            enabled: false,
            label: LABEL_SIMULATED.to_string()
        }));
    }

    #[test]
    fn test_capability_without_prompt_uses_device() {
        let mut s = session();
        let outcome = s.start(all_capabilities(), BASE).unwrap();
        assert_eq!(outcome.permission_request, None);
        assert_eq!(
            s.state(),
            SessionState::Active {
                motion: SourceKind::Device,
                heading: SourceKind::Device
            }
        );
        assert_eq!(s.fallback(), None);
    }

    #[test]
    fn test_permission_granted() {
        let mut s = session();
        let caps = Capabilities {
            permission_required: true,
            ..all_capabilities()
        };
        let request = s.start(caps, BASE).unwrap().permission_request.unwrap();
        assert_eq!(s.pending_permission(), Some(request));
        assert_eq!(
            s.state(),
            SessionState::AwaitingPermission {
                request: Some(request)
            }
        );

        s.resolve_permission(request, PermissionOutcome::Granted, BASE + 800);
        assert_eq!(s.motion_source(), SourceKind::Device);
        assert_eq!(s.heading_source(), SourceKind::Device);
        assert_eq!(s.pending_permission(), None);
    }

    #[test]
    fn test_permission_denied_falls_back() {
        let mut s = session();
        let caps = Capabilities {
            permission_required: true,
            ..all_capabilities()
        };
        let request = s.start(caps, BASE).unwrap().permission_request.unwrap();
        s.resolve_permission(request, PermissionOutcome::Denied, BASE + 100);

        assert_eq!(s.motion_source(), SourceKind::Simulated);
        assert_eq!(s.heading_source(), SourceKind::Simulated);
        assert_eq!(s.fallback(), Some(&FallbackReason::PermissionDenied));
    }

    #[test]
    fn test_permission_error_falls_back() {
        let mut s = session();
        let caps = Capabilities {
            permission_required: true,
            ..all_capabilities()
        };
        let request = s.start(caps, BASE).unwrap().permission_request.unwrap();
        s.resolve_permission(
            request,
            PermissionOutcome::Error("NotAllowedError".to_string()),
            BASE + 100,
        );
        assert_eq!(
            s.fallback(),
            Some(&FallbackReason::PermissionError("NotAllowedError".to_string()))
        );
        assert!(s.state().is_active());
    }

    #[test]
    fn test_stale_permission_result_ignored() {
        let mut s = session();
        let caps = Capabilities {
            permission_required: true,
            ..all_capabilities()
        };
        let request = s.start(caps, BASE).unwrap().permission_request.unwrap();

        s.resolve_permission(PermissionRequestId(request.0 + 1), PermissionOutcome::Granted, BASE);
        assert_eq!(s.pending_permission(), Some(request));

        s.resolve_permission(request, PermissionOutcome::Granted, BASE + 10);
        // a duplicate answer after activation changes nothing
        s.resolve_permission(request, PermissionOutcome::Denied, BASE + 20);
        assert_eq!(s.motion_source(), SourceKind::Device);
        assert_eq!(s.fallback(), None);
    }

    #[test]
    fn test_permission_resolving_after_stop_is_noop() {
        let mut s = session();
        let caps = Capabilities {
            permission_required: true,
            ..all_capabilities()
        };
        let request = s.start(caps, BASE).unwrap().permission_request.unwrap();
        s.stop();
        drain(&mut s);

        s.resolve_permission(request, PermissionOutcome::Granted, BASE + 5_000);
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(drain(&mut s).is_empty());
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut s = session();
        s.start(all_capabilities(), BASE).unwrap();
        assert!(matches!(
            s.start(all_capabilities(), BASE),
            Err(SensingError::InvalidTransition { action: "start", .. })
        ));
    }

    #[test]
    fn test_device_pipeline_end_to_end() {
        let mut s = session();
        s.start(all_capabilities(), BASE).unwrap();
        drain(&mut s);

        s.on_motion(&motion(0.0, BASE));
        s.on_motion(&motion(3.0, BASE + 50));
        s.on_motion(&motion(3.0, BASE + 60));
        s.on_motion(&motion(3.0, BASE + 400));
        s.on_motion(&MotionReading::new(None, BASE + 410));
        s.on_orientation(&OrientationSample::new(Some(92.0), BASE + 420));
        s.on_orientation(&OrientationSample::new(None, BASE + 430));

        let updates = drain(&mut s);
        assert_eq!(
            updates,
            vec![
                DashboardUpdate::Steps {
                    total: 1,
                    current_minute: 1,
                    last_step_ms: Some(BASE + 50)
                },
                DashboardUpdate::Steps {
                    total: 2,
                    current_minute: 2,
                    last_step_ms: Some(BASE + 400)
                },
                DashboardUpdate::Compass(crate::types::CompassState {
                    heading_degrees: 92.0,
                    direction: CompassDirection::East
                }),
            ]
        );
    }

    #[test]
    fn test_device_samples_dropped_when_simulated() {
        let mut s = session();
        s.start(Capabilities::default(), BASE).unwrap();
        drain(&mut s);

        s.on_motion(&motion(5.0, BASE + 10));
        s.on_orientation(&OrientationSample::new(Some(45.0), BASE + 20));
        assert!(drain(&mut s).is_empty());
        assert_eq!(s.total_steps(), 0);
    }

    #[test]
    fn test_missing_orientation_simulates_heading_only() {
        let mut s = session();
        s.start(
            Capabilities {
                orientation: false,
                ..all_capabilities()
            },
            BASE,
        )
        .unwrap();
        assert_eq!(s.motion_source(), SourceKind::Device);
        assert_eq!(s.heading_source(), SourceKind::Simulated);
        drain(&mut s);

        s.tick(BASE + 1_000);
        let compass: Vec<f64> = drain(&mut s)
            .into_iter()
            .filter_map(|u| match u {
                DashboardUpdate::Compass(c) => Some(c.heading_degrees),
                _ => None,
            })
            .collect();
        assert_eq!(compass, vec![10.0, 20.0]);
    }

    #[test]
    fn test_minute_rollover_resets_tally() {
        let mut s = session();
        s.start(all_capabilities(), BASE).unwrap();

        s.on_motion(&motion(3.0, BASE + 1_000));
        s.on_motion(&motion(3.0, BASE + 2_000));
        s.tick(BASE + 30_000);
        assert!(s.history().is_empty());
        assert_eq!(s.current_minute_steps(), 2);
        drain(&mut s);

        s.tick(BASE + MINUTE);
        assert_eq!(
            s.history(),
            &[MinuteBucket {
                minute_label: "07".to_string(),
                step_count: 2
            }]
        );
        assert_eq!(s.current_minute_steps(), 0);
        assert_eq!(s.total_steps(), 2);

        let updates = drain(&mut s);
        assert!(matches!(updates[0], DashboardUpdate::History { .. }));
        assert_eq!(
            updates[1],
            DashboardUpdate::Steps {
                total: 2,
                current_minute: 0,
                last_step_ms: Some(BASE + 2_000)
            }
        );

        // quiet minute
        s.tick(BASE + 2 * MINUTE);
        assert_eq!(s.history()[1].step_count, 0);
        assert_sum_invariant(&s);
    }

    #[test]
    fn test_simulated_session_sum_invariant() {
        let mut s = SensorSession::new(seeded_config(0.3), Vec::new()).unwrap();
        s.start(Capabilities::default(), BASE).unwrap();

        let mut now = BASE;
        while now < BASE + 5 * MINUTE {
            now += 250;
            s.tick(now);
            assert_sum_invariant(&s);
        }

        assert_eq!(s.history().len(), 5);
        assert!(s.total_steps() > 0);
        let labels: Vec<&str> = s.history().iter().map(|b| b.minute_label.as_str()).collect();
        assert_eq!(labels, vec!["07", "08", "09", "10", "11"]);
    }

    #[test]
    fn test_late_tick_attributes_steps_to_their_minute() {
        let mut config = seeded_config(1.0);
        config.simulation.max_catch_up_samples = 5_000;
        let mut s = SensorSession::new(config, Vec::new()).unwrap();
        s.start(Capabilities::default(), BASE).unwrap();

        // one heartbeat covering 14:07:00..14:08:59
        s.tick(BASE + 119_000);

        let history = s.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].minute_label, "07");
        assert!(history[0].step_count > 0);
        assert!(s.current_minute_steps() > 0);
        assert_sum_invariant(&s);
    }

    #[test]
    fn test_extreme_timestamps() {
        let mut s = session();
        assert!(matches!(
            s.start(Capabilities::default(), -1),
            Err(SensingError::InvalidTimestamp(-1))
        ));
        assert_eq!(s.state(), SessionState::Idle);

        s.start(Capabilities::default(), 0).unwrap();
        s.handle(SessionEvent::Tick { now_ms: i64::MAX }).unwrap();
        s.tick(i64::MAX);
        assert!(s.state().is_active());
        assert_sum_invariant(&s);

        let mut s = session();
        s.start(all_capabilities(), i64::MAX - 10).unwrap();
        s.on_motion(&motion(3.0, i64::MAX - 5));
        s.on_motion(&motion(3.0, i64::MIN));
        s.tick(i64::MAX);
        assert_eq!(s.total_steps(), 1);

        let mut s = session();
        s.start(Capabilities::default(), i64::MAX - 10).unwrap();
        s.tick(i64::MAX);
        s.tick(i64::MAX);
        assert!(s.snapshot().compass.is_some());
    }

    #[test]
    fn test_simulated_session_is_deterministic() {
        let run = || {
            let mut s = SensorSession::new(seeded_config(0.2), Vec::new()).unwrap();
            s.start(Capabilities::default(), BASE).unwrap();
            for i in 1..=240 {
                s.tick(BASE + i * 500);
            }
            (s.total_steps(), s.history().to_vec())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_location_independent_of_motion_permission() {
        let mut s = session();
        let caps = Capabilities {
            permission_required: true,
            ..all_capabilities()
        };
        let request = s.start(caps, BASE).unwrap().permission_request.unwrap();
        s.resolve_permission(request, PermissionOutcome::Denied, BASE + 10);
        drain(&mut s);

        s.on_location(&LocationEvent::Fix {
            latitude: 52.37,
            longitude: 4.89,
            timestamp_ms: BASE + 20,
        });
        assert_eq!(
            drain(&mut s),
            vec![DashboardUpdate::Position(PositionState::Fix(
                PositionFix::new(52.37, 4.89).unwrap()
            ))]
        );
    }

    #[test]
    fn test_location_unsupported_and_timeout() {
        let mut s = session();
        s.start(
            Capabilities {
                geolocation: false,
                ..all_capabilities()
            },
            BASE,
        )
        .unwrap();
        assert_eq!(
            s.snapshot().position,
            Some(PositionState::Unavailable {
                reason: PositionUnavailableReason::Unsupported
            })
        );

        let mut s = session();
        s.start(all_capabilities(), BASE).unwrap();
        s.tick(BASE + 5_000);
        assert_eq!(
            s.snapshot().position,
            Some(PositionState::Unavailable {
                reason: PositionUnavailableReason::Timeout
            })
        );

        s.on_location(&LocationEvent::Error {
            code: LocationErrorCode::PermissionDenied,
            timestamp_ms: BASE + 6_000,
        });
        assert_eq!(
            s.snapshot().position,
            Some(PositionState::Unavailable {
                reason: PositionUnavailableReason::PermissionDenied
            })
        );
    }

    #[test]
    fn test_no_updates_after_stop() {
        let mut s = session();
        s.start(Capabilities::default(), BASE).unwrap();
        s.tick(BASE + 10_000);
        s.stop();
        let before = s.snapshot();
        drain(&mut s);

        s.tick(BASE + 10 * MINUTE);
        s.on_motion(&motion(5.0, BASE + 10 * MINUTE));
        s.on_location(&LocationEvent::Fix {
            latitude: 1.0,
            longitude: 1.0,
            timestamp_ms: BASE + 10 * MINUTE,
        });
        s.stop();

        assert!(drain(&mut s).is_empty());
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_events_before_start_ignored() {
        let mut s = session();
        s.on_motion(&motion(5.0, BASE));
        s.tick(BASE + MINUTE);
        assert!(drain(&mut s).is_empty());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_handle_dispatches_events() {
        let mut s = session();
        s.handle(SessionEvent::Start {
            capabilities: Capabilities {
                permission_required: true,
                ..all_capabilities()
            },
            now_ms: BASE,
        })
        .unwrap();
        let request = s.pending_permission().unwrap();
        s.handle(SessionEvent::PermissionResolved {
            request,
            outcome: PermissionOutcome::Granted,
            now_ms: BASE + 1,
        })
        .unwrap();
        s.handle(SessionEvent::Motion(motion(3.0, BASE + 2))).unwrap();
        s.handle(SessionEvent::Tick { now_ms: BASE + MINUTE }).unwrap();
        s.handle(SessionEvent::Stop).unwrap();

        assert_eq!(s.total_steps(), 1);
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(s
            .handle(SessionEvent::Start {
                capabilities: all_capabilities(),
                now_ms: BASE
            })
            .is_err());
    }

    #[test]
    fn test_fn_sink() {
        let mut seen = 0;
        {
            let sink = FnSink(|_: DashboardUpdate| seen += 1);
            let mut s = SensorSession::new(seeded_config(0.0), sink).unwrap();
            s.start(Capabilities::default(), BASE).unwrap();
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_separate_sessions_do_not_share_state() {
        let mut a = session();
        let mut b = session();
        a.start(all_capabilities(), BASE).unwrap();
        b.start(all_capabilities(), BASE).unwrap();
        a.on_motion(&motion(3.0, BASE + 10));
        assert_eq!(a.total_steps(), 1);
        assert_eq!(b.total_steps(), 0);
        assert_ne!(a.id(), b.id());
    }
}
