//! Trip lifecycle on top of the movement classifier: per-tick
//! evaluation, durable trip segments and the background sync loop.

pub mod config;
pub mod engine;
pub mod machine;
pub mod motion;
pub mod sync;

pub use config::EngineConfig;
pub use engine::{now_ms, EngineError, TickOutcome, TripEngine};
pub use machine::{EndReason, TickInput, TripEvent, TripMachine, TripMachineState};
pub use motion::MotionDetector;
pub use sync::{run_sync_loop, sync_once, ConnectivityHandle, HttpSyncTransport, SyncError, SyncReport, SyncTransport};
