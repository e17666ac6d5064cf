use motion_ingest_core::AccelerationSample;

/// Raw "is moving" flag: did any sample since the last tick exceed the
/// motion threshold.
pub struct MotionDetector {
    threshold: f64,
    peak: f64,
    seen: bool,
    supported: bool,
}

impl MotionDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, peak: 0.0, seen: false, supported: false }
    }

    pub fn observe(&mut self, sample: &AccelerationSample) {
        if sample.magnitude.is_finite() {
            self.peak = self.peak.max(sample.magnitude);
        }
        self.seen = true;
        self.supported = true;
    }

    /// Reads and resets the per-tick state. No samples means not moving.
    pub fn take_is_moving(&mut self) -> bool {
        let moving = self.seen && self.peak > self.threshold;
        self.peak = 0.0;
        self.seen = false;
        moving
    }

    /// True once any accelerometer sample has arrived.
    pub fn is_supported(&self) -> bool {
        self.supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_resets_every_tick() {
        let mut m = MotionDetector::new(1.2);
        assert!(!m.take_is_moving());
        assert!(!m.is_supported());

        m.observe(&AccelerationSample::new(0.0, 1.5, 0.0, 0));
        m.observe(&AccelerationSample::new(0.0, 0.1, 0.0, 50));
        assert!(m.take_is_moving());
        assert!(!m.take_is_moving());
        assert!(m.is_supported());

        m.observe(&AccelerationSample::new(0.5, 0.5, 0.5, 100));
        assert!(!m.take_is_moving());
    }
}
