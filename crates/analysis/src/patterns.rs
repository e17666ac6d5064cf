//! Static frequency/energy band tables and the matcher that scores a
//! `FrequencyData` against them.

use model::FrequencyData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternBand {
    pub min_freq: f64,
    pub max_freq: f64,
    pub min_energy: f64,
    pub max_energy: f64,
    pub weight: f64,
}

const fn band(min_freq: f64, max_freq: f64, min_energy: f64, max_energy: f64, weight: f64) -> PatternBand {
    PatternBand { min_freq, max_freq, min_energy, max_energy, weight }
}

/// Vehicle motion: low-frequency sway, engine idle, road texture. Tunable.
pub const VEHICLE_PATTERNS: [PatternBand; 11] = [
    band(0.10, 0.40, 0.05, 1.5, 1.0),  // steady cruise
    band(0.20, 0.60, 0.10, 2.0, 1.2),  // urban driving
    band(0.30, 0.80, 0.10, 2.5, 1.2),  // stop and go
    band(0.40, 1.00, 0.20, 3.0, 1.0),  // suspension bounce
    band(0.50, 1.20, 0.20, 3.0, 0.9),  // cornering
    band(0.15, 0.50, 0.05, 1.0, 0.8),  // low speed crawl
    band(0.25, 0.70, 0.30, 4.0, 1.1),  // engine idle harmonic
    band(0.60, 1.50, 0.30, 4.0, 0.7),  // rough road
    band(0.80, 2.00, 0.50, 5.0, 0.5),  // gravel, cobbles
    band(0.10, 0.30, 0.02, 0.6, 0.6),  // highway
    band(0.35, 0.90, 0.15, 2.0, 1.0),  // mixed traffic
];

/// Human gait cadences across speeds and carrying positions. Tunable.
pub const WALKING_PATTERNS: [PatternBand; 15] = [
    band(1.20, 2.50, 0.30, 2.5, 1.0),  // generic gait
    band(1.50, 2.20, 0.40, 2.0, 1.3),  // normal pace
    band(1.60, 2.00, 0.50, 1.8, 1.5),  // normal pace, hand held
    band(1.40, 1.80, 0.30, 1.5, 1.1),  // relaxed
    band(1.80, 2.40, 0.50, 2.5, 1.1),  // brisk
    band(1.00, 1.40, 0.20, 1.2, 0.7),  // stroll
    band(2.00, 2.80, 0.60, 3.0, 0.8),  // hurried
    band(1.30, 1.70, 0.30, 1.4, 1.0),  // pocket, slow
    band(1.70, 2.10, 0.40, 2.2, 1.4),  // pocket, normal
    band(1.50, 1.90, 0.30, 2.0, 1.2),  // bag
    band(2.20, 3.00, 0.80, 3.5, 0.6),  // jogging onset
    band(1.10, 1.50, 0.20, 1.0, 0.8),  // elderly
    band(1.60, 2.30, 0.50, 2.8, 1.2),  // stairs
    band(1.90, 2.60, 0.60, 3.0, 1.0),  // fast walk
    band(1.20, 1.60, 0.25, 1.2, 0.9),  // shuffle
];

const W_FREQ: f64 = 0.4;
const W_ENERGY: f64 = 0.2;
const W_ADDITIONAL: f64 = 0.2;
const W_SIGNATURE: f64 = 0.2;

/// 1 at the band midpoint falling linearly to 0 at the edges.
fn range_match(value: f64, min: f64, max: f64) -> f64 {
    if value < min || value > max {
        return 0.0;
    }
    let half = (max - min) / 2.0;
    if half <= 0.0 {
        return 1.0;
    }
    let mid = (min + max) / 2.0;
    1.0 - ((value - mid).abs() / half).min(1.0)
}

fn band_score(fd: &FrequencyData, peak: f64, b: &PatternBand, signature: f64) -> f64 {
    let freq = range_match(peak, b.min_freq, b.max_freq);
    let energy = range_match(fd.spectral_energy, b.min_energy, b.max_energy);
    let additional = if fd.dominant_frequencies.is_empty() {
        0.0
    } else {
        fd.dominant_frequencies
            .iter()
            .filter(|f| (b.min_freq..=b.max_freq).contains(*f))
            .count() as f64
            / fd.dominant_frequencies.len() as f64
    };
    W_FREQ * freq + W_ENERGY * energy + W_ADDITIONAL * additional + W_SIGNATURE * signature
}

/// Weighted mean band score in [0, 1]; zero when no peak frequency exists.
pub fn match_patterns(fd: &FrequencyData, table: &[PatternBand], signature: Option<f64>) -> f64 {
    let Some(peak) = fd.peak_frequency else {
        return 0.0;
    };
    let sig = signature.unwrap_or(0.0).clamp(0.0, 1.0);
    let mut num = 0.0;
    let mut den = 0.0;
    for b in table {
        num += b.weight * band_score(fd, peak, b, sig);
        den += b.weight;
    }
    if den > 0.0 { (num / den).clamp(0.0, 1.0) } else { 0.0 }
}

pub fn vehicle_match(fd: &FrequencyData) -> f64 {
    match_patterns(fd, &VEHICLE_PATTERNS, fd.vehicle_signature)
}

pub fn walking_match(fd: &FrequencyData) -> f64 {
    match_patterns(fd, &WALKING_PATTERNS, fd.walking_signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd(peak: Option<f64>, energy: f64, dominant: Vec<f64>) -> FrequencyData {
        FrequencyData {
            peak_frequency: peak,
            spectral_energy: energy,
            dominant_frequencies: dominant,
            spectral_centroid: 0.0,
            walking_signature: None,
            vehicle_signature: None,
        }
    }

    #[test]
    fn test_no_peak_scores_zero() {
        let f = fd(None, 1.0, vec![1.8]);
        assert_eq!(walking_match(&f), 0.0);
        assert_eq!(vehicle_match(&f), 0.0);
    }

    #[test]
    fn test_walking_band_prefers_gait_frequency() {
        let gait = fd(Some(1.8), 1.0, vec![1.8, 1.7]);
        let sway = fd(Some(0.5), 1.0, vec![0.5, 0.4]);
        assert!(walking_match(&gait) > walking_match(&sway));
        assert!(vehicle_match(&sway) > vehicle_match(&gait));
    }

    #[test]
    fn test_signature_raises_score() {
        let mut f = fd(Some(1.8), 1.0, vec![1.8]);
        let without = walking_match(&f);
        f.walking_signature = Some(1.0);
        let with = walking_match(&f);
        assert!((with - without - W_SIGNATURE).abs() < 1e-9);
    }

    #[test]
    fn test_range_match_shape() {
        assert_eq!(range_match(1.5, 1.0, 2.0), 1.0);
        assert_eq!(range_match(2.5, 1.0, 2.0), 0.0);
        assert!((range_match(1.25, 1.0, 2.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_table_sizes() {
        assert_eq!(VEHICLE_PATTERNS.len(), 11);
        assert_eq!(WALKING_PATTERNS.len(), 15);
        assert!(VEHICLE_PATTERNS.iter().chain(WALKING_PATTERNS.iter()).all(|b| b.min_freq < b.max_freq));
    }
}
