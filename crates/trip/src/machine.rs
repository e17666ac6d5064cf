use model::{Location, MovementType, TripPhase, TripPoint, TripSegment, Vec3};
use serde::Serialize;
use tracing::{info, warn};
use trip_io::{StoreError, TripStore};
use uuid::Uuid;

use crate::config::EngineConfig;

const START_VEHICLE_CONFIDENCE: f64 = 0.6;
const EXIT_WALKING_CONFIDENCE: f64 = 0.7;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripMachineState {
    pub phase: TripPhase,
    pub current_trip_id: Option<Uuid>,
    pub trip_start_time: Option<u64>,
    pub last_stationary_time: Option<u64>,
    pub last_moving_time: Option<u64>,
    pub pending_sync_count: usize,
}

/// Everything one evaluation step looks at.
#[derive(Clone, Debug)]
pub struct TickInput {
    pub now_ms: u64,
    pub is_moving: bool,
    pub movement: MovementType,
    pub confidence: f64,
    pub acceleration: Vec3,
    pub rotation: Vec3,
    pub location: Option<Location>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Stationary,
    WalkingDetected,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TripEvent {
    None,
    Started(Uuid),
    PointRecorded(Uuid),
    Ended { id: Uuid, reason: EndReason },
}

/// Idle/Tracking lifecycle for one vehicle. All transitions go through
/// [`TripMachine::evaluate`].
pub struct TripMachine {
    vehicle_id: String,
    user_id: String,
    min_moving_time_ms: u64,
    min_stationary_time_ms: u64,
    state: TripMachineState,
}

impl TripMachine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            vehicle_id: config.vehicle_id.clone(),
            user_id: config.user_id.clone(),
            min_moving_time_ms: config.min_moving_time_ms,
            min_stationary_time_ms: config.min_stationary_time_ms,
            state: TripMachineState::default(),
        }
    }

    pub fn state(&self) -> &TripMachineState {
        &self.state
    }

    pub fn phase(&self) -> TripPhase {
        self.state.phase
    }

    /// Seeds the pending counter, e.g. after reopening a store.
    pub fn refresh_pending(&mut self, store: &dyn TripStore) -> Result<usize, StoreError> {
        self.state.pending_sync_count = store.unsynced_count()?;
        Ok(self.state.pending_sync_count)
    }

    pub fn evaluate(&mut self, input: &TickInput, store: &dyn TripStore) -> Result<TripEvent, StoreError> {
        let now = input.now_ms;
        let last_stationary = *self.state.last_stationary_time.get_or_insert(now);
        let last_moving = *self.state.last_moving_time.get_or_insert(now);
        if input.is_moving {
            self.state.last_moving_time = Some(now);
        } else {
            self.state.last_stationary_time = Some(now);
        }

        match self.state.phase {
            TripPhase::Idle => {
                let moving_for = now.saturating_sub(last_stationary);
                if input.is_moving
                    && moving_for > self.min_moving_time_ms
                    && input.movement == MovementType::Vehicle
                    && input.confidence > START_VEHICLE_CONFIDENCE
                {
                    return self.start(input, store);
                }
                Ok(TripEvent::None)
            }
            TripPhase::Tracking => {
                let Some(id) = self.state.current_trip_id else {
                    warn!("tracking without an active trip, back to idle");
                    self.reset_to_idle();
                    return Ok(TripEvent::None);
                };
                if input.movement == MovementType::Walking && input.confidence > EXIT_WALKING_CONFIDENCE {
                    // walking restarts the continuous-motion timer
                    self.state.last_stationary_time = Some(now);
                    return self.end(id, now, EndReason::WalkingDetected, store);
                }
                if !input.is_moving && now.saturating_sub(last_moving) >= self.min_stationary_time_ms {
                    return self.end(id, now, EndReason::Stationary, store);
                }
                store.append_point(id, point(input))?;
                Ok(TripEvent::PointRecorded(id))
            }
        }
    }

    /// Closes the active trip regardless of motion, e.g. on shutdown.
    pub fn close(&mut self, now_ms: u64, store: &dyn TripStore) -> Result<TripEvent, StoreError> {
        match (self.state.phase, self.state.current_trip_id) {
            (TripPhase::Tracking, Some(id)) => self.end(id, now_ms, EndReason::Shutdown, store),
            _ => Ok(TripEvent::None),
        }
    }

    fn start(&mut self, input: &TickInput, store: &dyn TripStore) -> Result<TripEvent, StoreError> {
        let mut segment = TripSegment::new(&self.vehicle_id, &self.user_id, input.now_ms);
        segment.points.push(point(input));
        let id = segment.id;
        store.insert(segment)?;

        self.state.phase = TripPhase::Tracking;
        self.state.current_trip_id = Some(id);
        self.state.trip_start_time = Some(input.now_ms);
        info!(%id, vehicle = %self.vehicle_id, confidence = input.confidence, "trip started");
        Ok(TripEvent::Started(id))
    }

    fn end(&mut self, id: Uuid, now: u64, reason: EndReason, store: &dyn TripStore) -> Result<TripEvent, StoreError> {
        store.finish(id, now)?;
        let started = self.state.trip_start_time.unwrap_or(now);
        self.reset_to_idle();
        self.state.pending_sync_count = store.unsynced_count()?;
        info!(
            %id,
            ?reason,
            duration_ms = now.saturating_sub(started),
            pending = self.state.pending_sync_count,
            "trip ended"
        );
        Ok(TripEvent::Ended { id, reason })
    }

    fn reset_to_idle(&mut self) {
        self.state.phase = TripPhase::Idle;
        self.state.current_trip_id = None;
        self.state.trip_start_time = None;
    }
}

fn point(input: &TickInput) -> TripPoint {
    TripPoint {
        timestamp: input.now_ms,
        is_moving: input.is_moving,
        confidence: input.confidence,
        acceleration_snapshot: input.acceleration,
        rotation_snapshot: input.rotation,
        location: input.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trip_io::MemoryTripStore;

    fn tick(now_ms: u64, is_moving: bool, movement: MovementType, confidence: f64) -> TickInput {
        TickInput {
            now_ms,
            is_moving,
            movement,
            confidence,
            acceleration: Vec3::new(0.1, 0.2, 1.5),
            rotation: Vec3::default(),
            location: None,
        }
    }

    fn drive(machine: &mut TripMachine, store: &MemoryTripStore, secs: std::ops::RangeInclusive<u64>) -> Vec<(u64, TripEvent)> {
        secs.map(|s| {
            let ev = machine
                .evaluate(&tick(s * 1000, true, MovementType::Vehicle, 0.8), store)
                .unwrap();
            (s, ev)
        })
        .collect()
    }

    #[test]
    fn test_trip_lifecycle_start_and_stationary_end() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());

        let events = drive(&mut m, &store, 0..=40);
        let started: Vec<_> = events.iter().filter(|(_, e)| matches!(e, TripEvent::Started(_))).collect();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].0, 31);
        let id = m.state().current_trip_id.unwrap();
        assert_eq!(m.phase(), TripPhase::Tracking);

        let mut ended_at = None;
        for s in 41..=200 {
            let ev = m.evaluate(&tick(s * 1000, false, MovementType::Stationary, 0.9), &store).unwrap();
            if let TripEvent::Ended { reason, .. } = ev {
                assert_eq!(reason, EndReason::Stationary);
                ended_at = Some(s);
                break;
            }
        }
        assert_eq!(ended_at, Some(160));
        assert_eq!(m.phase(), TripPhase::Idle);

        let seg = store.get(id).unwrap().unwrap();
        assert_eq!(seg.start_time, 31_000);
        assert_eq!(seg.end_time, Some(160_000));
        assert!(!seg.synced);
        // 31..=40 moving, 41..=159 stationary
        assert_eq!(seg.points.len(), 10 + 119);
        assert_eq!(m.state().pending_sync_count, 1);
    }

    #[test]
    fn test_short_motion_does_not_start_a_trip() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());
        drive(&mut m, &store, 0..=20);
        m.evaluate(&tick(21_000, false, MovementType::Stationary, 0.9), &store).unwrap();
        drive(&mut m, &store, 22..=45);
        assert_eq!(m.phase(), TripPhase::Idle);
        assert_eq!(store.unsynced_count().unwrap(), 0);
    }

    #[test]
    fn test_walking_or_weak_vehicle_never_starts() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());
        for s in 0..=60 {
            m.evaluate(&tick(s * 1000, true, MovementType::Walking, 0.9), &store).unwrap();
            m.evaluate(&tick(s * 1000 + 500, true, MovementType::Vehicle, 0.6), &store).unwrap();
        }
        assert_eq!(m.phase(), TripPhase::Idle);
    }

    #[test]
    fn test_confident_walking_ends_trip_early() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());
        drive(&mut m, &store, 0..=35);
        let id = m.state().current_trip_id.unwrap();

        let ev = m.evaluate(&tick(36_000, true, MovementType::Walking, 0.65), &store).unwrap();
        assert_eq!(ev, TripEvent::PointRecorded(id));

        let ev = m.evaluate(&tick(37_000, true, MovementType::Walking, 0.75), &store).unwrap();
        assert_eq!(ev, TripEvent::Ended { id, reason: EndReason::WalkingDetected });
        assert_eq!(store.get(id).unwrap().unwrap().end_time, Some(37_000));
    }

    #[test]
    fn test_walking_exit_restarts_the_moving_timer() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());
        drive(&mut m, &store, 0..=35);
        m.evaluate(&tick(36_000, true, MovementType::Walking, 0.75), &store).unwrap();
        assert_eq!(m.phase(), TripPhase::Idle);

        let events = drive(&mut m, &store, 37..=70);
        let started: Vec<u64> = events
            .iter()
            .filter(|(_, e)| matches!(e, TripEvent::Started(_)))
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(started, vec![67]);
    }

    #[test]
    fn test_brief_stop_keeps_tracking() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());
        drive(&mut m, &store, 0..=35);
        for s in 36..=100 {
            let ev = m.evaluate(&tick(s * 1000, false, MovementType::Stationary, 0.9), &store).unwrap();
            assert!(matches!(ev, TripEvent::PointRecorded(_)));
        }
        drive(&mut m, &store, 101..=110);
        assert_eq!(m.phase(), TripPhase::Tracking);
    }

    #[test]
    fn test_close_finishes_active_trip() {
        let store = MemoryTripStore::new();
        let mut m = TripMachine::new(&EngineConfig::default());
        assert_eq!(m.close(0, &store).unwrap(), TripEvent::None);
        drive(&mut m, &store, 0..=32);
        let id = m.state().current_trip_id.unwrap();
        assert_eq!(m.close(33_000, &store).unwrap(), TripEvent::Ended { id, reason: EndReason::Shutdown });
        assert!(store.get(id).unwrap().unwrap().is_finished());
    }
}
