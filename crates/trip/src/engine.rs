use analysis::{Classifier, SampleWindow, Stabilizer};
use crossbeam_channel::TryRecvError;
use model::{ClassificationResult, Location, TripPhase, Vec3};
use motion_ingest_core::{LocationFix, SensorEvent, SensorRx};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trip_io::{StoreError, TripStore};

use crate::config::EngineConfig;
use crate::machine::{TickInput, TripEvent, TripMachine, TripMachineState};
use crate::motion::MotionDetector;
use crate::sync::{run_sync_loop, ConnectivityHandle, SyncTransport};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug)]
pub struct TickOutcome {
    pub is_moving: bool,
    pub classification: ClassificationResult,
    pub event: TripEvent,
}

/// Owns the whole per-vehicle pipeline: sensor window, classification,
/// stabilization, the trip machine and the background sync task.
pub struct TripEngine {
    config: EngineConfig,
    window: SampleWindow,
    classifier: Classifier,
    stabilizer: Stabilizer,
    motion: MotionDetector,
    machine: TripMachine,
    store: Arc<dyn TripStore>,
    connectivity: ConnectivityHandle,
    sync_task: Option<JoinHandle<()>>,
    last_rotation: Vec3,
    /// Latest fix and the wall-clock time it arrived.
    last_fix: Option<(LocationFix, u64)>,
}

impl TripEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn TripStore>) -> Self {
        let mut machine = TripMachine::new(&config);
        if let Err(e) = machine.refresh_pending(store.as_ref()) {
            warn!("could not count pending trips: {e}");
        }
        Self {
            window: SampleWindow::new(config.window_size),
            classifier: Classifier::new(),
            stabilizer: Stabilizer::new(config.history_length),
            motion: MotionDetector::new(config.motion_threshold),
            machine,
            store,
            connectivity: ConnectivityHandle::new(false),
            sync_task: None,
            last_rotation: Vec3::default(),
            last_fix: None,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &TripMachineState {
        self.machine.state()
    }

    pub fn phase(&self) -> TripPhase {
        self.machine.phase()
    }

    pub fn motion_supported(&self) -> bool {
        self.motion.is_supported()
    }

    pub fn connectivity(&self) -> ConnectivityHandle {
        self.connectivity.clone()
    }

    pub fn store(&self) -> Arc<dyn TripStore> {
        self.store.clone()
    }

    /// Routes one sensor reading. A fix is aged from its arrival time, so
    /// the sensor clock never has to agree with the tick clock.
    pub fn ingest(&mut self, event: SensorEvent) {
        self.ingest_at(event, now_ms());
    }

    pub fn ingest_at(&mut self, event: SensorEvent, received_ms: u64) {
        if !event.is_valid() {
            warn!(?event, "dropping non-finite sensor reading");
            return;
        }
        match event {
            SensorEvent::Acceleration(sample) => {
                self.motion.observe(&sample);
                self.window.push(sample);
            }
            SensorEvent::Rotation(r) => {
                self.last_rotation = Vec3::new(r.alpha, r.beta, r.gamma);
            }
            SensorEvent::Location(fix) => {
                self.last_fix = Some((fix, received_ms));
            }
        }
    }

    /// One sampling tick using the motion detector's flag.
    pub fn tick(&mut self, now_ms: u64) -> Result<TickOutcome, EngineError> {
        let is_moving = self.motion.take_is_moving();
        self.tick_with(now_ms, is_moving)
    }

    /// One sampling tick with an externally supplied motion flag.
    pub fn tick_with(&mut self, now_ms: u64, is_moving: bool) -> Result<TickOutcome, EngineError> {
        let raw = self.classifier.classify(self.window.samples());
        let classification = self.stabilizer.stabilize(raw);

        let acceleration = self
            .window
            .latest()
            .map(|s| Vec3::new(s.x, s.y, s.z))
            .unwrap_or_default();
        let input = TickInput {
            now_ms,
            is_moving,
            movement: classification.movement_type,
            confidence: classification.confidence,
            acceleration,
            rotation: self.last_rotation,
            location: self.fresh_location(now_ms),
        };
        let event = self.machine.evaluate(&input, self.store.as_ref())?;
        debug!(
            movement = classification.movement_type.as_str(),
            confidence = classification.confidence,
            is_moving,
            ?event,
            "tick"
        );
        Ok(TickOutcome { is_moving, classification, event })
    }

    /// Ends an active trip, if any.
    pub fn close(&mut self, now_ms: u64) -> Result<TripEvent, EngineError> {
        Ok(self.machine.close(now_ms, self.store.as_ref())?)
    }

    fn fresh_location(&self, now_ms: u64) -> Option<Location> {
        let (fix, received_ms) = self.last_fix.as_ref()?;
        if now_ms.saturating_sub(*received_ms) > self.config.location_max_age_ms {
            return None;
        }
        Some(Location {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            source: fix.source,
        })
    }

    /// Starts the background sync loop. Must be called inside a tokio
    /// runtime. A previous loop is aborted.
    pub fn spawn_sync(&mut self, transport: Arc<dyn SyncTransport>) {
        if let Some(old) = self.sync_task.take() {
            old.abort();
        }
        let task = tokio::spawn(run_sync_loop(
            self.store.clone(),
            transport,
            Duration::from_millis(self.config.sync_interval_ms),
            self.connectivity.subscribe(),
        ));
        self.sync_task = Some(task);
    }

    /// Drains `rx` every sampling interval and ticks until the sensor
    /// side hangs up, then closes any active trip.
    pub async fn run(&mut self, rx: SensorRx) {
        let period = Duration::from_millis(self.config.sampling_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        info!(vehicle = %self.config.vehicle_id, ?period, "engine running");

        loop {
            ticker.tick().await;
            let mut disconnected = false;
            loop {
                match rx.try_recv() {
                    Ok(event) => self.ingest(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
            if let Err(e) = self.tick(now_ms()) {
                warn!("tick failed: {e}");
            }
            if disconnected {
                break;
            }
        }

        if !self.motion_supported() {
            warn!("no accelerometer data was ever received");
        }
        match self.close(now_ms()) {
            Ok(TripEvent::Ended { id, .. }) => info!(%id, "active trip closed on shutdown"),
            Ok(_) => {}
            Err(e) => warn!("could not close active trip: {e}"),
        }
    }
}

impl Drop for TripEngine {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::EndReason;
    use model::MovementType;
    use motion_ingest_core::{AccelerationSample, RotationSample};
    use trip_io::MemoryTripStore;

    const RATE_HZ: u64 = 20;

    /// Lateral sway at 0.5 Hz on x and z, one second of samples ending at `sec`.
    fn feed_vehicle_second(engine: &mut TripEngine, sec: u64) {
        for i in 0..RATE_HZ {
            let t_ms = (sec - 1) * 1000 + i * 1000 / RATE_HZ;
            let phase = 2.0 * std::f64::consts::PI * 0.5 * (t_ms as f64 / 1000.0) + 0.3;
            let v = 0.8 * phase.sin();
            engine.ingest(SensorEvent::Acceleration(AccelerationSample::new(v, 0.02, v, t_ms)));
        }
    }

    fn feed_still_second(engine: &mut TripEngine, sec: u64) {
        for i in 0..RATE_HZ {
            let t_ms = (sec - 1) * 1000 + i * 1000 / RATE_HZ;
            engine.ingest(SensorEvent::Acceleration(AccelerationSample::new(0.01, 0.01, 0.01, t_ms)));
        }
    }

    fn engine() -> (TripEngine, Arc<MemoryTripStore>) {
        let store = Arc::new(MemoryTripStore::new());
        (TripEngine::new(EngineConfig::default(), store.clone()), store)
    }

    #[test]
    fn test_no_sensor_data_stays_idle() {
        let (mut e, store) = engine();
        for s in 0..200 {
            let out = e.tick(s * 1000).unwrap();
            assert!(!out.is_moving);
            assert_eq!(out.classification.movement_type, MovementType::Stationary);
        }
        assert!(!e.motion_supported());
        assert_eq!(e.phase(), TripPhase::Idle);
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_vehicle_drive_records_and_finishes_a_trip() {
        let (mut e, store) = engine();
        e.tick_with(0, true).unwrap();
        let mut started = None;
        for s in 1..=40 {
            feed_vehicle_second(&mut e, s);
            if let TripEvent::Started(id) = e.tick_with(s * 1000, true).unwrap().event {
                started = Some((s, id));
            }
        }
        let (start_sec, id) = started.expect("trip should start");
        // earliest possible start is after 30 s of continuous motion
        assert!((31..=35).contains(&start_sec), "started at {start_sec}");
        assert!(e.motion_supported());
        assert_eq!(e.state().pending_sync_count, 0);

        let mut ended = None;
        for s in 41..=170 {
            feed_still_second(&mut e, s);
            if let TripEvent::Ended { reason, .. } = e.tick_with(s * 1000, false).unwrap().event {
                ended = Some((s, reason));
                break;
            }
        }
        assert_eq!(ended, Some((160, EndReason::Stationary)));

        let seg = store.get(id).unwrap().unwrap();
        assert!(seg.is_finished());
        assert!(!seg.synced);
        assert_eq!(e.state().pending_sync_count, 1);
    }

    fn fix(timestamp_ms: u64) -> LocationFix {
        LocationFix {
            latitude: 48.1,
            longitude: 11.5,
            accuracy: 5.0,
            source: model::LocationSource::Gps,
            timestamp_ms,
        }
    }

    #[test]
    fn test_points_carry_fresh_location_and_rotation() {
        let (mut e, store) = engine();
        e.tick_with(0, true).unwrap();
        e.ingest_at(SensorEvent::Rotation(RotationSample { alpha: 1.0, beta: 2.0, gamma: 3.0, timestamp_ms: 0 }), 0);
        // sensor clock far behind the tick clock; only arrival time counts
        e.ingest_at(SensorEvent::Location(fix(7)), 30_000);
        for s in 1..=70 {
            feed_vehicle_second(&mut e, s);
            e.tick_with(s * 1000, true).unwrap();
        }
        let seg = store.list_unsynced().unwrap().pop().unwrap();
        let first = &seg.points[0];
        assert_eq!(first.rotation_snapshot, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(first.location.as_ref().map(|l| l.source), Some(model::LocationSource::Gps));
        // arrived at 30 s, stale after 60 s
        assert!(seg.points.last().unwrap().location.is_none());
    }

    #[test]
    fn test_fix_with_boot_clock_timestamp_is_fresh_on_wall_clock_tick() {
        let (mut e, _store) = engine();
        e.ingest(SensorEvent::Location(fix(5_000)));
        assert!(e.fresh_location(now_ms()).is_some());
        assert!(e.fresh_location(now_ms() + 31_000).is_none());
    }

    #[test]
    fn test_non_finite_readings_never_reach_the_store() {
        let (mut e, store) = engine();
        e.tick_with(0, true).unwrap();
        e.ingest_at(SensorEvent::Rotation(RotationSample { alpha: 1.0, beta: 1.0, gamma: 1.0, timestamp_ms: 0 }), 0);
        e.ingest_at(SensorEvent::Rotation(RotationSample { alpha: f64::NAN, beta: 0.0, gamma: 0.0, timestamp_ms: 1 }), 0);
        e.ingest_at(SensorEvent::Location(LocationFix { accuracy: f64::NAN, ..fix(1) }), 0);
        for s in 1..=40 {
            feed_vehicle_second(&mut e, s);
            e.tick_with(s * 1000, true).unwrap();
        }
        let seg = store.list_unsynced().unwrap().pop().unwrap();
        assert!(seg.points.iter().all(|p| p.rotation_snapshot == Vec3::new(1.0, 1.0, 1.0)));
        assert!(seg.points.iter().all(|p| p.location.is_none()));
    }

    #[test]
    fn test_close_ends_active_trip() {
        let (mut e, store) = engine();
        e.tick_with(0, true).unwrap();
        for s in 1..=35 {
            feed_vehicle_second(&mut e, s);
            e.tick_with(s * 1000, true).unwrap();
        }
        assert_eq!(e.phase(), TripPhase::Tracking);
        assert!(matches!(
            e.close(36_000).unwrap(),
            TripEvent::Ended { reason: EndReason::Shutdown, .. }
        ));
        assert!(store.list_unsynced().unwrap()[0].is_finished());
    }

    #[tokio::test]
    async fn test_run_returns_when_sensor_side_hangs_up() {
        let store = Arc::new(MemoryTripStore::new());
        let cfg = EngineConfig { sampling_interval_ms: 5, ..EngineConfig::default() };
        let mut e = TripEngine::new(cfg, store);
        let (tx, rx) = motion_ingest_core::channel();
        tx.send(SensorEvent::Acceleration(AccelerationSample::new(0.0, 2.0, 0.0, 0))).unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), e.run(rx)).await.unwrap();
        assert!(e.motion_supported());
    }
}
