use std::collections::VecDeque;
use motion_ingest_core::AccelerationSample;

use crate::stats::moving_average;

/// Fewest samples the analyzers will work with.
pub const MIN_WINDOW_SAMPLES: usize = 10;

const SMOOTHING_WIDTH: usize = 3;

/// Bounded ring buffer of the most recent acceleration samples.
pub struct SampleWindow {
    samples: VecDeque<AccelerationSample>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_WINDOW_SAMPLES);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, sample: AccelerationSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Samples oldest first, as a contiguous slice.
    pub fn samples(&mut self) -> &[AccelerationSample] {
        self.samples.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= MIN_WINDOW_SAMPLES
    }

    pub fn latest(&self) -> Option<&AccelerationSample> {
        self.samples.back()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Per-sample magnitudes with light 3-point smoothing.
pub fn smoothed_magnitudes(samples: &[AccelerationSample]) -> Vec<f64> {
    let raw: Vec<f64> = samples.iter().map(|s| s.magnitude).collect();
    moving_average(&raw, SMOOTHING_WIDTH)
}

/// Seconds between the first and last sample.
pub fn duration_s(samples: &[AccelerationSample]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some(a), Some(b)) => b.timestamp_ms.saturating_sub(a.timestamp_ms) as f64 / 1000.0,
        _ => 0.0,
    }
}

pub(crate) fn axis_x(samples: &[AccelerationSample]) -> Vec<f64> {
    samples.iter().map(|s| s.x).collect()
}

pub(crate) fn axis_y(samples: &[AccelerationSample]) -> Vec<f64> {
    samples.iter().map(|s| s.y).collect()
}

pub(crate) fn axis_z(samples: &[AccelerationSample]) -> Vec<f64> {
    samples.iter().map(|s| s.z).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = SampleWindow::new(10);
        for i in 0..15u64 {
            w.push(AccelerationSample::new(0.0, i as f64, 0.0, i * 50));
        }
        assert_eq!(w.len(), 10);
        assert_eq!(w.samples()[0].timestamp_ms, 250);
        assert_eq!(w.latest().map(|s| s.timestamp_ms), Some(700));
        assert!(w.is_ready());
    }

    #[test]
    fn test_duration_uses_actual_timestamps() {
        let s = vec![
            AccelerationSample::new(0.0, 0.0, 0.0, 1000),
            AccelerationSample::new(0.0, 0.0, 0.0, 1040),
            AccelerationSample::new(0.0, 0.0, 0.0, 2500),
        ];
        assert!((duration_s(&s) - 1.5).abs() < 1e-12);
        assert_eq!(duration_s(&[]), 0.0);
    }
}
