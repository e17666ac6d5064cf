//! Zero-crossing frequency analysis over one sample window.

use model::FrequencyData;
use motion_ingest_core::AccelerationSample;

use crate::signature::{vehicle_signature, walking_signature};
use crate::stats::{crossing_frequency, mean, variance};
use crate::window::{axis_x, axis_y, axis_z, duration_s, smoothed_magnitudes, MIN_WINDOW_SAMPLES};

pub const MAX_DOMINANT_FREQUENCIES: usize = 5;

// Centroid weighting per evidence band (Hz). Tunable.
const WALKING_BAND_HZ: (f64, f64) = (1.2, 2.5);
const VEHICLE_BAND_HZ: (f64, f64) = (0.2, 1.2);
const WALKING_BAND_BOOST: f64 = 1.5;
const VEHICLE_BAND_BOOST: f64 = 1.3;

const MIN_SLICE_SAMPLES: usize = 5;

pub fn analyze(samples: &[AccelerationSample]) -> FrequencyData {
    if samples.len() < MIN_WINDOW_SAMPLES {
        return FrequencyData::empty();
    }

    let duration = duration_s(samples);
    let vertical = crossing_frequency(&axis_y(samples), duration);
    let horizontal = crossing_frequency(&axis_x(samples), duration);
    let lateral = crossing_frequency(&axis_z(samples), duration);
    let peak = vertical.max(horizontal).max(lateral);

    let mags = smoothed_magnitudes(samples);
    let spectral_energy = mean(&mags) * (1.0 + variance(&mags).sqrt());

    let dominant_frequencies = dominant_frequencies(samples);
    let spectral_centroid = spectral_centroid(&dominant_frequencies);

    FrequencyData {
        peak_frequency: (peak > 0.0).then_some(peak),
        spectral_energy,
        dominant_frequencies,
        spectral_centroid,
        walking_signature: walking_signature(samples),
        vehicle_signature: vehicle_signature(samples),
    }
}

/// Vertical and horizontal crossing frequencies over sliding thirds of the
/// window, deduplicated at 0.01 Hz and sorted descending.
pub fn dominant_frequencies(samples: &[AccelerationSample]) -> Vec<f64> {
    let n = samples.len();
    let slice_len = (n / 3).max(MIN_SLICE_SAMPLES);
    if n < slice_len {
        return Vec::new();
    }
    let step = (slice_len / 2).max(1);

    let mut freqs = Vec::new();
    let mut start = 0;
    while start + slice_len <= n {
        let slice = &samples[start..start + slice_len];
        let d = duration_s(slice);
        for f in [
            crossing_frequency(&axis_y(slice), d),
            crossing_frequency(&axis_x(slice), d),
        ] {
            if f > 0.0 {
                freqs.push((f * 100.0).round() / 100.0);
            }
        }
        start += step;
    }

    freqs.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    freqs.dedup();
    freqs.truncate(MAX_DOMINANT_FREQUENCIES);
    freqs
}

pub fn spectral_centroid(freqs: &[f64]) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for &f in freqs {
        let w = if (WALKING_BAND_HZ.0..=WALKING_BAND_HZ.1).contains(&f) {
            WALKING_BAND_BOOST
        } else if (VEHICLE_BAND_HZ.0..VEHICLE_BAND_HZ.1).contains(&f) {
            VEHICLE_BAND_BOOST
        } else {
            1.0
        };
        num += w * f;
        den += w;
    }
    if den > 0.0 { num / den } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{sine_window, Axis};

    #[test]
    fn test_small_window_is_degraded_not_error() {
        let s = sine_window(&[Axis::Y], 1.8, 1.0, 20.0, 0.25);
        assert_eq!(s.len(), 5);
        let fd = analyze(&s);
        assert!(fd.peak_frequency.is_none());
        assert_eq!(fd.spectral_energy, 0.0);
        assert!(fd.dominant_frequencies.is_empty());
        assert!(fd.walking_signature.is_none());
    }

    #[test]
    fn test_peak_tracks_fastest_axis() {
        let s = sine_window(&[Axis::Y], 1.8, 1.0, 20.0, 4.0);
        let fd = analyze(&s);
        let peak = fd.peak_frequency.unwrap();
        assert!((peak - 1.8).abs() < 0.2, "peak {peak}");
        assert!(fd.spectral_energy > 0.5);
    }

    #[test]
    fn test_dominant_frequencies_sorted_and_bounded() {
        let s = sine_window(&[Axis::X, Axis::Z], 0.5, 1.0, 20.0, 4.0);
        let d = dominant_frequencies(&s);
        assert!(!d.is_empty());
        assert!(d.len() <= MAX_DOMINANT_FREQUENCIES);
        assert!(d.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_centroid_favours_supported_band() {
        // 2.0 Hz carries the walking boost, 3.0 Hz none.
        let c = spectral_centroid(&[3.0, 2.0]);
        assert!(c < 2.5);
        assert_eq!(spectral_centroid(&[]), 0.0);
    }

    #[test]
    fn test_flat_signal_has_no_peak() {
        let s: Vec<_> = (0..40u64)
            .map(|i| AccelerationSample::new(0.0, 0.0, 0.0, i * 50))
            .collect();
        let fd = analyze(&s);
        assert!(fd.peak_frequency.is_none());
        assert_eq!(fd.spectral_energy, 0.0);
    }
}
