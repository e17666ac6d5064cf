//! Raw sensor contract shared by motion sources and the trip engine

use serde::{Serialize, Deserialize};

pub use model::LocationSource;

/// One tri-axial linear acceleration reading (gravity removed, m/s²).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub magnitude: f64,
    pub timestamp_ms: u64,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: u64) -> Self {
        let magnitude = (x * x + y * y + z * z).sqrt();
        Self { x, y, z, magnitude, timestamp_ms }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.magnitude.is_finite()
    }
}

/// Rotation rate around the device axes (deg/s).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RotationSample {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub timestamp_ms: u64,
}

impl RotationSample {
    pub fn is_finite(&self) -> bool {
        self.alpha.is_finite() && self.beta.is_finite() && self.gamma.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub source: LocationSource,
    pub timestamp_ms: u64,
}

impl LocationFix {
    /// Finite values and coordinates on the globe.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.accuracy.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SensorEvent {
    Acceleration(AccelerationSample),
    Rotation(RotationSample),
    Location(LocationFix),
}

impl SensorEvent {
    /// False for readings that cannot be stored, e.g. NaN from a
    /// misbehaving bridge.
    pub fn is_valid(&self) -> bool {
        match self {
            SensorEvent::Acceleration(s) => s.is_finite(),
            SensorEvent::Rotation(r) => r.is_finite(),
            SensorEvent::Location(f) => f.is_valid(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SensorTx = crossbeam_channel::Sender<SensorEvent>;
pub type SensorRx = crossbeam_channel::Receiver<SensorEvent>;

/// Trait for any live sensor connector
#[async_trait::async_trait]
pub trait SensorSource: Send + Sync {
    async fn run(&self, tx: SensorTx) -> Result<(), IngestError>;
}

pub fn channel() -> (SensorTx, SensorRx) {
    crossbeam_channel::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_is_euclidean_norm() {
        let s = AccelerationSample::new(3.0, 4.0, 0.0, 10);
        assert!((s.magnitude - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (tx, rx) = channel();
        tx.send(SensorEvent::Acceleration(AccelerationSample::new(0.0, 1.0, 0.0, 1))).unwrap();
        tx.send(SensorEvent::Acceleration(AccelerationSample::new(0.0, 2.0, 0.0, 2))).unwrap();
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        match got[1] {
            SensorEvent::Acceleration(s) => assert_eq!(s.timestamp_ms, 2),
            _ => panic!("unexpected event"),
        }
    }

    #[test]
    fn test_non_finite_readings_are_invalid() {
        let rot = RotationSample { alpha: f64::NAN, beta: 0.0, gamma: 0.0, timestamp_ms: 1 };
        assert!(!SensorEvent::Rotation(rot).is_valid());
        let fix = LocationFix {
            latitude: 48.1,
            longitude: 11.6,
            accuracy: f64::INFINITY,
            source: LocationSource::Gps,
            timestamp_ms: 1,
        };
        assert!(!SensorEvent::Location(fix).is_valid());
        assert!(SensorEvent::Location(LocationFix { accuracy: 4.0, ..fix }).is_valid());
        assert!(!SensorEvent::Acceleration(AccelerationSample::new(f64::INFINITY, 0.0, 0.0, 1)).is_valid());
    }
}
