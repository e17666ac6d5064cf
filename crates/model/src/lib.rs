use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Vehicle,
    Walking,
    Stationary,
    Unknown,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::Vehicle,
        MovementType::Walking,
        MovementType::Stationary,
        MovementType::Unknown,
    ];

    pub fn index(self) -> usize {
        match self {
            MovementType::Vehicle => 0,
            MovementType::Walking => 1,
            MovementType::Stationary => 2,
            MovementType::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Vehicle => "vehicle",
            MovementType::Walking => "walking",
            MovementType::Stationary => "stationary",
            MovementType::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyData {
    pub peak_frequency: Option<f64>,
    pub spectral_energy: f64,
    /// At most five, sorted descending.
    #[serde(default)]
    pub dominant_frequencies: Vec<f64>,
    pub spectral_centroid: f64,
    pub walking_signature: Option<f64>,
    pub vehicle_signature: Option<f64>,
}

impl FrequencyData {
    /// Neutral result for windows too short to analyse.
    pub fn empty() -> Self {
        Self {
            peak_frequency: None,
            spectral_energy: 0.0,
            dominant_frequencies: Vec::new(),
            spectral_centroid: 0.0,
            walking_signature: None,
            vehicle_signature: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub confidence: f64,
    pub vehicle_confidence: f64,
    pub walking_confidence: f64,
    pub stationary_confidence: f64,
    pub frequency_signature: FrequencyData,
    pub vehicle_pattern_match: f64,
    pub walking_pattern_match: f64,
}

impl ClassificationResult {
    /// A bare result carrying only a type and confidence, mostly useful for
    /// feeding the stabilizer and trip machine directly.
    pub fn simple(movement_type: MovementType, confidence: f64) -> Self {
        let per_type = |t: MovementType| if t == movement_type { confidence } else { 0.0 };
        Self {
            movement_type,
            confidence,
            vehicle_confidence: per_type(MovementType::Vehicle),
            walking_confidence: per_type(MovementType::Walking),
            stationary_confidence: per_type(MovementType::Stationary),
            frequency_signature: FrequencyData::empty(),
            vehicle_pattern_match: 0.0,
            walking_pattern_match: 0.0,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Gps,
    Network,
    Unknown,
}

impl LocationSource {
    /// Wire code used by sensor bridges: 1 GPS, 2 network.
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => LocationSource::Gps,
            2 => LocationSource::Network,
            _ => LocationSource::Unknown,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Location {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    pub accuracy: f64,
    pub source: LocationSource,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripPoint {
    pub timestamp: u64,
    pub is_moving: bool,
    pub confidence: f64,
    pub acceleration_snapshot: Vec3,
    pub rotation_snapshot: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripSegment {
    pub id: Uuid,
    pub vehicle_id: String,
    pub user_id: String,
    pub start_time: u64,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub points: Vec<TripPoint>,
    #[serde(default)]
    pub synced: bool,
}

impl TripSegment {
    pub fn new(vehicle_id: &str, user_id: &str, start_time: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id: vehicle_id.into(),
            user_id: user_id.into(),
            start_time,
            end_time: None,
            points: vec![],
            synced: false,
        }
    }

    /// A segment is finished once the trip machine has left `Tracking`.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TripPhase {
    #[default]
    Idle,
    Tracking,
}
