//! Walking and vehicle signatures: scalar 0..1 resemblance scores computed
//! from the raw axes, independent of the pattern tables.
//!
//! The constants below are empirically tuned and have no physical
//! derivation. Adjust them as a set.

use motion_ingest_core::AccelerationSample;

use crate::stats::{bell, coefficient_of_variation, crossing_frequency, mean, ratio_or, unit, variance, moving_average, local_maxima, EPS};
use crate::window::{axis_x, axis_y, axis_z, duration_s, MIN_WINDOW_SAMPLES};

// walking
const STEP_SMOOTHING_WIDTH: usize = 5;
const STEP_MIN_SLOPE: f64 = 0.02;
const NEAR_ZERO_ACCEL: f64 = 0.05;
const STEP_PAUSE_MS: u64 = 1500;
const STEP_DECAY: f64 = 0.3;
const WALK_PEAK_HZ: f64 = 1.8;
const WALK_FREQ_WIDTH: f64 = 0.6;
const WALK_RATE_WIDTH: f64 = 1.0;
const HUMAN_STEP_INTERVAL_MS: (f64, f64) = (400.0, 1200.0);
const CADENCE_RANGE_BOOST: f64 = 1.2;
const CADENCE_CONSISTENT_BOOST: f64 = 1.1;
const MIN_CONSISTENT_INTERVALS: usize = 4;
const DOMINANCE_EXPONENT: f64 = 1.3;
const PEAK_THRESHOLD_FACTOR: f64 = 1.5;
const PEAK_THRESHOLD_FLOOR: f64 = 0.2;

/// Named walking cadence sub-ranges: (name, center Hz, width Hz).
const WALKING_CADENCES: [(&str, f64, f64); 5] = [
    ("stroll", 1.3, 0.15),
    ("relaxed", 1.55, 0.15),
    ("normal", 1.8, 0.15),
    ("brisk", 2.05, 0.15),
    ("fast", 2.3, 0.15),
];

const W_STEP_REGULARITY: f64 = 0.22;
const W_CADENCE: f64 = 0.20;
const W_VERTICAL_DOMINANCE: f64 = 0.20;
const W_WALK_FREQ: f64 = 0.15;
const W_PEAK_REGULARITY: f64 = 0.10;
const W_STEP_FREQ: f64 = 0.08;
const W_SYMMETRY: f64 = 0.05;

// vehicle
const VEHICLE_PEAK_HZ: f64 = 0.6;
const VEHICLE_FREQ_WIDTH: f64 = 0.4;
const LATERAL_THRESHOLD_FACTOR: f64 = 1.2;
const LATERAL_THRESHOLD_FLOOR: f64 = 0.1;
const LATERAL_FULL_PEAKS: f64 = 3.0;
const NOT_WALKING_FULL_PEAKS: f64 = 6.0;
const ACCEL_EVENT_THRESHOLD: f64 = 0.3;
const ACCEL_EVENT_MIN_MS: u64 = 500;
const ACCEL_FULL_EVENTS: f64 = 2.0;
const ENGINE_RATIO_FULL: f64 = 3.0;
const ENGINE_BAND_HZ: (f64, f64) = (0.25, 0.7);
const ENGINE_BAND_BOOST: f64 = 1.25;

const W_HORIZONTAL_DOMINANCE: f64 = 0.15;
const W_CONSISTENCY: f64 = 0.15;
const W_VEHICLE_FREQ: f64 = 0.15;
const W_LATERAL: f64 = 0.10;
const W_SUSTAINED: f64 = 0.15;
const W_NOT_WALKING: f64 = 0.10;
const W_ACCEL_PATTERN: f64 = 0.10;
const W_ENGINE: f64 = 0.10;

pub fn walking_signature(samples: &[AccelerationSample]) -> Option<f64> {
    if samples.len() < MIN_WINDOW_SAMPLES {
        return None;
    }
    let ys = axis_y(samples);
    let duration = duration_s(samples);

    let steps = count_steps(samples, &moving_average(&ys, STEP_SMOOTHING_WIDTH));
    let intervals: Vec<f64> = steps.times_ms.windows(2).map(|w| (w[1] - w[0]) as f64).collect();

    let (vertical_energy, horizontal_energy) = active_window_energies(samples);
    let dominance = ratio_or(vertical_energy, vertical_energy + horizontal_energy, 0.5)
        .powf(DOMINANCE_EXPONENT);

    let vertical_hz = crossing_frequency(&ys, duration);
    let peaks = vertical_peaks(samples);

    let score = W_STEP_REGULARITY * step_regularity(steps.count, &intervals, duration)
        + W_CADENCE * cadence_consistency(&intervals)
        + W_VERTICAL_DOMINANCE * dominance
        + W_WALK_FREQ * bell(vertical_hz, WALK_PEAK_HZ, WALK_FREQ_WIDTH)
        + W_PEAK_REGULARITY * peak_regularity(&ys, &peaks)
        + W_STEP_FREQ * cadence_match(vertical_hz)
        + W_SYMMETRY * symmetry(&ys);
    Some(unit(score))
}

pub fn vehicle_signature(samples: &[AccelerationSample]) -> Option<f64> {
    if samples.len() < MIN_WINDOW_SAMPLES {
        return None;
    }
    let xs = axis_x(samples);
    let zs = axis_z(samples);
    let duration = duration_s(samples);
    let mags: Vec<f64> = samples.iter().map(|s| s.magnitude).collect();

    let (vertical_energy, horizontal_energy) = active_window_energies(samples);
    let horizontal_dominance = ratio_or(horizontal_energy, vertical_energy + horizontal_energy, 0.5);
    let horizontal_hz = crossing_frequency(&xs, duration);
    let not_walking = 1.0 - (vertical_peaks(samples).len() as f64 / NOT_WALKING_FULL_PEAKS).min(1.0);

    let score = W_HORIZONTAL_DOMINANCE * horizontal_dominance
        + W_CONSISTENCY * magnitude_consistency(&mags)
        + W_VEHICLE_FREQ * bell(horizontal_hz, VEHICLE_PEAK_HZ, VEHICLE_FREQ_WIDTH)
        + W_LATERAL * lateral_movement(&zs)
        + W_SUSTAINED * sustained_vibration(&mags)
        + W_NOT_WALKING * not_walking
        + W_ACCEL_PATTERN * acceleration_events(samples)
        + W_ENGINE * engine_vibration(samples, horizontal_hz);
    Some(unit(score))
}

struct StepTrace {
    count: f64,
    times_ms: Vec<u64>,
}

/// Upward zero crossings of the smoothed vertical axis. Near-zero readings
/// after a gait pause shave a fraction of a step instead of resetting.
fn count_steps(samples: &[AccelerationSample], smooth: &[f64]) -> StepTrace {
    let mut count = 0.0_f64;
    let mut times_ms: Vec<u64> = Vec::new();
    for i in 1..smooth.len() {
        let (prev, cur) = (smooth[i - 1], smooth[i]);
        let t = samples[i].timestamp_ms;
        if prev < 0.0 && cur >= 0.0 && cur - prev >= STEP_MIN_SLOPE {
            count += 1.0;
            times_ms.push(t);
        } else if cur.abs() < NEAR_ZERO_ACCEL {
            let paused = times_ms.last().map_or(true, |last| t.saturating_sub(*last) > STEP_PAUSE_MS);
            if paused {
                count = (count - STEP_DECAY).max(0.0);
            }
        }
    }
    StepTrace { count, times_ms }
}

fn step_regularity(count: f64, intervals: &[f64], duration: f64) -> f64 {
    if count < 2.0 || intervals.is_empty() || duration <= EPS {
        return 0.0;
    }
    let rate = bell(count / duration, WALK_PEAK_HZ, WALK_RATE_WIDTH);
    let regularity = coefficient_of_variation(intervals).map_or(0.0, |cv| 1.0 - cv.min(1.0));
    unit(rate * (0.5 + 0.5 * regularity))
}

fn cadence_consistency(intervals: &[f64]) -> f64 {
    let Some(cv) = coefficient_of_variation(intervals) else {
        return 0.0;
    };
    let avg = mean(intervals);
    let mut score = 1.0 - cv.min(1.0);
    if (HUMAN_STEP_INTERVAL_MS.0..=HUMAN_STEP_INTERVAL_MS.1).contains(&avg) {
        score *= CADENCE_RANGE_BOOST;
    }
    let consistent = intervals.iter().filter(|i| (*i - avg).abs() < 0.2 * avg).count();
    if consistent >= MIN_CONSISTENT_INTERVALS {
        score *= CADENCE_CONSISTENT_BOOST;
    }
    unit(score)
}

/// (vertical, horizontal + lateral) energy inside the most active third
/// of the window.
fn active_window_energies(samples: &[AccelerationSample]) -> (f64, f64) {
    let n = samples.len();
    let len = (n / 3).max(1);
    let step = (len / 2).max(1);
    let mut best = (0.0, 0.0);
    let mut best_total = -1.0;
    let mut start = 0;
    while start + len <= n {
        let slice = &samples[start..start + len];
        let v: f64 = slice.iter().map(|s| s.y * s.y).sum();
        let h: f64 = slice.iter().map(|s| s.x * s.x + s.z * s.z).sum();
        if v + h > best_total {
            best_total = v + h;
            best = (v, h);
        }
        start += step;
    }
    best
}

/// Local maxima of the vertical axis above an adaptive threshold.
pub(crate) fn vertical_peaks(samples: &[AccelerationSample]) -> Vec<usize> {
    let ys = axis_y(samples);
    let abs_mean = mean(&ys.iter().map(|y| y.abs()).collect::<Vec<_>>());
    let threshold = (PEAK_THRESHOLD_FACTOR * abs_mean).max(PEAK_THRESHOLD_FLOOR);
    local_maxima(&ys, threshold)
}

/// Intervals (ms) between consecutive vertical peaks.
pub(crate) fn peak_intervals(samples: &[AccelerationSample], peaks: &[usize]) -> Vec<f64> {
    peaks
        .windows(2)
        .map(|w| samples[w[1]].timestamp_ms.saturating_sub(samples[w[0]].timestamp_ms) as f64)
        .collect()
}

fn peak_regularity(ys: &[f64], peaks: &[usize]) -> f64 {
    if peaks.len() < 3 {
        return 0.0;
    }
    let gaps: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let heights: Vec<f64> = peaks.iter().map(|&i| ys[i]).collect();
    let regularity = coefficient_of_variation(&gaps).map_or(0.0, |cv| 1.0 - cv.min(1.0));
    let height_consistency = coefficient_of_variation(&heights).map_or(0.0, |cv| 1.0 - cv.min(1.0));
    let avg_gap = mean(&gaps);
    let interval_consistency = gaps.iter().filter(|g| (*g - avg_gap).abs() <= 0.25 * avg_gap).count() as f64
        / gaps.len() as f64;
    unit((regularity + height_consistency + interval_consistency) / 3.0)
}

fn cadence_match(hz: f64) -> f64 {
    WALKING_CADENCES
        .iter()
        .map(|(_, center, width)| bell(hz, *center, *width))
        .fold(0.0, f64::max)
}

fn symmetry(ys: &[f64]) -> f64 {
    let up: f64 = ys.iter().filter(|y| **y > 0.0).sum();
    let down: f64 = ys.iter().filter(|y| **y < 0.0).map(|y| -y).sum();
    ratio_or(up.min(down), up.max(down), 0.0)
}

/// 1 - CV of magnitudes after an interquartile outlier trim.
fn magnitude_consistency(mags: &[f64]) -> f64 {
    if mags.len() < 4 {
        return 0.5;
    }
    let mut sorted = mags.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q1 = sorted[sorted.len() / 4];
    let q3 = sorted[(sorted.len() * 3) / 4];
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let kept: Vec<f64> = sorted.into_iter().filter(|m| *m >= lo && *m <= hi).collect();
    coefficient_of_variation(&kept).map_or(0.0, |cv| 1.0 - cv.min(1.0))
}

/// Turns and lane changes show up as peaks in |lateral|.
fn lateral_movement(zs: &[f64]) -> f64 {
    let abs: Vec<f64> = zs.iter().map(|z| z.abs()).collect();
    let threshold = (LATERAL_THRESHOLD_FACTOR * mean(&abs)).max(LATERAL_THRESHOLD_FLOOR);
    (local_maxima(&abs, threshold).len() as f64 / LATERAL_FULL_PEAKS).min(1.0)
}

/// Within-window vs between-window variance over overlapping quarters.
/// Steady vibration keeps sub-window means close together.
fn sustained_vibration(mags: &[f64]) -> f64 {
    let len = (mags.len() / 4).max(4);
    let step = (len / 2).max(1);
    let mut means = Vec::new();
    let mut vars = Vec::new();
    let mut start = 0;
    while start + len <= mags.len() {
        let slice = &mags[start..start + len];
        means.push(mean(slice));
        vars.push(variance(slice));
        start += step;
    }
    if means.len() < 2 {
        return 0.5;
    }
    let within = mean(&vars);
    let between = variance(&means);
    unit(ratio_or(within, within + between, 0.5))
}

/// Sustained same-sign horizontal pushes (speeding up, braking).
fn acceleration_events(samples: &[AccelerationSample]) -> f64 {
    let mut events = 0usize;
    // (first ts, sign, last ts) of the current run
    let mut run: Option<(u64, bool, u64)> = None;
    for s in samples {
        let active = s.x.abs() > ACCEL_EVENT_THRESHOLD;
        let sign = s.x > 0.0;
        run = match run {
            Some((t0, run_sign, _)) if active && run_sign == sign => Some((t0, run_sign, s.timestamp_ms)),
            Some((t0, _, last)) => {
                if last.saturating_sub(t0) >= ACCEL_EVENT_MIN_MS {
                    events += 1;
                }
                active.then_some((s.timestamp_ms, sign, s.timestamp_ms))
            }
            None => active.then_some((s.timestamp_ms, sign, s.timestamp_ms)),
        };
    }
    if let Some((t0, _, last)) = run {
        if last.saturating_sub(t0) >= ACCEL_EVENT_MIN_MS {
            events += 1;
        }
    }
    (events as f64 / ACCEL_FULL_EVENTS).min(1.0)
}

fn engine_vibration(samples: &[AccelerationSample], horizontal_hz: f64) -> f64 {
    let vertical: f64 = samples.iter().map(|s| s.y * s.y).sum();
    let horizontal: f64 = samples.iter().map(|s| s.x * s.x + s.z * s.z).sum();
    let base = if vertical < EPS {
        if horizontal > EPS { 1.0 } else { 0.0 }
    } else {
        (horizontal / vertical / ENGINE_RATIO_FULL).min(1.0)
    };
    let boost = if (ENGINE_BAND_HZ.0..=ENGINE_BAND_HZ.1).contains(&horizontal_hz) {
        ENGINE_BAND_BOOST
    } else {
        1.0
    };
    unit(base * boost)
}
