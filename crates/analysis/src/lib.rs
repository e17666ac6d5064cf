//! Movement classification: windowed accelerometer samples in, stabilized
//! vehicle / walking / stationary judgments out.

pub mod classifier;
pub mod frequency;
pub mod patterns;
pub mod signature;
pub mod stabilizer;
pub mod summary;
pub mod window;

mod stats;

pub use classifier::{classify, Classifier};
pub use frequency::analyze;
pub use patterns::{match_patterns, PatternBand, VEHICLE_PATTERNS, WALKING_PATTERNS};
pub use signature::{vehicle_signature, walking_signature};
pub use stabilizer::{Stabilizer, DEFAULT_HISTORY_LENGTH};
pub use summary::{path_length_m, trip_summary};
pub use window::{SampleWindow, MIN_WINDOW_SAMPLES};

#[cfg(test)]
pub(crate) mod synth {
    use motion_ingest_core::AccelerationSample;

    #[derive(Clone, Copy, PartialEq)]
    pub enum Axis {
        X,
        Y,
        Z,
    }

    /// Idle axes hold a small constant so they never cross zero.
    const IDLE_OFFSET: f64 = 0.02;
    const PHASE: f64 = 0.3;

    pub fn sine_window(axes: &[Axis], hz: f64, amplitude: f64, rate_hz: f64, seconds: f64) -> Vec<AccelerationSample> {
        let n = (rate_hz * seconds).round() as usize;
        let step_ms = 1000.0 / rate_hz;
        (0..n)
            .map(|i| {
                let t = i as f64 / rate_hz;
                let v = amplitude * (2.0 * std::f64::consts::PI * hz * t + PHASE).sin();
                let pick = |a: Axis| if axes.contains(&a) { v } else { IDLE_OFFSET };
                AccelerationSample::new(pick(Axis::X), pick(Axis::Y), pick(Axis::Z), (i as f64 * step_ms) as u64)
            })
            .collect()
    }
}
