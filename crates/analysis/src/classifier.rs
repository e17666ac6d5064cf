//! Fuses pattern scores, signatures and physical heuristics into one
//! `ClassificationResult` per window.
//!
//! The heuristic adjustments run in a fixed order; each corrects a bias
//! left by the previous ones, so reordering them changes results.

use model::{ClassificationResult, FrequencyData, MovementType};
use motion_ingest_core::AccelerationSample;
use tracing::debug;

use crate::frequency::analyze;
use crate::patterns::{vehicle_match, walking_match};
use crate::signature::{peak_intervals, vertical_peaks};
use crate::stats::{coefficient_of_variation, mean, unit};
use crate::window::smoothed_magnitudes;

const STATIONARY_MAGNITUDE: f64 = 0.25;

const WALKING_SIGNATURE_FLOOR: f64 = 0.65;
const WALKING_SIGNATURE_LIFT: f64 = 1.1;
const VEHICLE_SIGNATURE_FLOOR: f64 = 0.75;

const GAIT_BAND_HZ: (f64, f64) = (1.3, 2.8);
const SLOW_GAIT_BAND_HZ: (f64, f64) = (0.9, 1.3);
const SWAY_BAND_HZ: (f64, f64) = (0.2, 0.9);

const VERTICAL_RATIO: f64 = 1.3;
const VERTICAL_RATIO_STRONG: f64 = 2.0;
const VERTICAL_MIN_MEAN: f64 = 0.25;

const MIN_GAIT_PEAKS: usize = 3;
const MIN_CONSISTENT_PEAK_INTERVALS: usize = 2;
const PEAK_INTERVAL_MAX_CV: f64 = 0.4;

const TIE_FLOOR: f64 = 0.4;
const TIE_SPREAD: f64 = 0.2;

const STATIONARY_DECISION: f64 = 0.8;
const WALKING_DECISION: f64 = 0.55;
const VEHICLE_OVERRIDE_RATIO: f64 = 1.4;
const VEHICLE_OVERRIDE_MIN: f64 = 0.75;
const VEHICLE_DECISION: f64 = 0.7;
const WALKING_FALLBACK: f64 = 0.45;
const UNKNOWN_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, samples: &[AccelerationSample]) -> ClassificationResult {
        classify(samples)
    }
}

pub fn classify(samples: &[AccelerationSample]) -> ClassificationResult {
    let fd = analyze(samples);
    let vehicle_pattern = vehicle_match(&fd);
    let walking_pattern = walking_match(&fd);

    let avg_magnitude = mean(&smoothed_magnitudes(samples));
    let stationary = if avg_magnitude < STATIONARY_MAGNITUDE {
        1.0 - avg_magnitude / STATIONARY_MAGNITUDE
    } else {
        0.0
    };

    let mut c = Confidences { vehicle: vehicle_pattern, walking: walking_pattern };
    apply_signatures(&mut c, &fd);
    apply_frequency_bands(&mut c, &fd);
    apply_vertical_dominance(&mut c, samples);
    apply_gait_peaks(&mut c, samples);
    apply_tie_break(&mut c);

    let (movement_type, confidence) = decide(c.vehicle, c.walking, stationary);
    debug!(
        "classified {} (conf {:.2}; vehicle {:.2}, walking {:.2}, stationary {:.2})",
        movement_type.as_str(), confidence, c.vehicle, c.walking, stationary
    );

    ClassificationResult {
        movement_type,
        confidence,
        vehicle_confidence: unit(c.vehicle),
        walking_confidence: unit(c.walking),
        stationary_confidence: unit(stationary),
        frequency_signature: fd,
        vehicle_pattern_match: vehicle_pattern,
        walking_pattern_match: walking_pattern,
    }
}

struct Confidences {
    vehicle: f64,
    walking: f64,
}

impl Confidences {
    fn scale(&mut self, walking: f64, vehicle: f64) {
        self.walking = unit(self.walking * walking);
        self.vehicle = unit(self.vehicle * vehicle);
    }
}

fn apply_signatures(c: &mut Confidences, fd: &FrequencyData) {
    if let Some(w) = fd.walking_signature {
        if w > WALKING_SIGNATURE_FLOOR {
            c.walking = unit(c.walking.max(w * WALKING_SIGNATURE_LIFT));
        }
    }
    // Higher bar than walking: vehicle false positives are the common failure.
    if let Some(v) = fd.vehicle_signature {
        if v > VEHICLE_SIGNATURE_FLOOR {
            c.vehicle = unit(c.vehicle.max(v));
        }
    }
}

fn apply_frequency_bands(c: &mut Confidences, fd: &FrequencyData) {
    let Some(peak) = fd.peak_frequency else {
        return;
    };
    if (GAIT_BAND_HZ.0..=GAIT_BAND_HZ.1).contains(&peak) {
        c.scale(1.3, 0.7);
    } else if (SLOW_GAIT_BAND_HZ.0..GAIT_BAND_HZ.0).contains(&peak) {
        c.scale(1.1, 0.9);
    } else if (SWAY_BAND_HZ.0..SLOW_GAIT_BAND_HZ.0).contains(&peak) && c.vehicle > 0.5 && c.walking < 0.6 {
        c.scale(1.0, 1.15);
    }
}

fn apply_vertical_dominance(c: &mut Confidences, samples: &[AccelerationSample]) {
    if samples.is_empty() {
        return;
    }
    let vertical = mean(&samples.iter().map(|s| s.y.abs()).collect::<Vec<_>>());
    let horizontal = mean(&samples.iter().map(|s| s.x.abs()).collect::<Vec<_>>());
    let lateral = mean(&samples.iter().map(|s| s.z.abs()).collect::<Vec<_>>());
    let ratio = vertical / (horizontal + lateral + 0.01);
    if ratio > VERTICAL_RATIO && vertical > VERTICAL_MIN_MEAN {
        c.scale(1.4, 0.6);
        if ratio > VERTICAL_RATIO_STRONG {
            c.scale(1.2, 0.5);
        }
    }
}

fn apply_gait_peaks(c: &mut Confidences, samples: &[AccelerationSample]) {
    let peaks = vertical_peaks(samples);
    if peaks.len() < MIN_GAIT_PEAKS {
        return;
    }
    let intervals = peak_intervals(samples, &peaks);
    if intervals.len() < MIN_CONSISTENT_PEAK_INTERVALS {
        return;
    }
    if coefficient_of_variation(&intervals).is_some_and(|cv| cv < PEAK_INTERVAL_MAX_CV) {
        c.scale(1.25, 0.7);
    }
}

/// Close calls lean walking.
fn apply_tie_break(c: &mut Confidences) {
    if c.walking > TIE_FLOOR && c.vehicle > TIE_FLOOR && (c.walking - c.vehicle).abs() < TIE_SPREAD {
        c.scale(1.15, 0.9);
    }
}

fn decide(vehicle: f64, walking: f64, stationary: f64) -> (MovementType, f64) {
    if stationary > STATIONARY_DECISION {
        return (MovementType::Stationary, unit(stationary));
    }
    if walking > WALKING_DECISION {
        if vehicle > VEHICLE_OVERRIDE_RATIO * walking && vehicle > VEHICLE_OVERRIDE_MIN {
            return (MovementType::Vehicle, unit(vehicle));
        }
        return (MovementType::Walking, unit(walking));
    }
    if vehicle > VEHICLE_DECISION {
        return (MovementType::Vehicle, unit(vehicle));
    }
    if walking > WALKING_FALLBACK {
        return (MovementType::Walking, unit(walking));
    }
    (MovementType::Unknown, UNKNOWN_CONFIDENCE)
}
