//! Small numeric helpers. Every function here returns a finite value for
//! empty or degenerate input.

pub(crate) const EPS: f64 = 1e-9;

pub(crate) fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

pub(crate) fn variance(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let m = mean(v);
    v.iter().map(|x| {
        let d = *x - m;
        d * d
    }).sum::<f64>() / (v.len() as f64)
}

pub(crate) fn std_dev(v: &[f64]) -> f64 {
    variance(v).sqrt()
}

/// `None` when the mean is too close to zero for the ratio to mean anything.
pub(crate) fn coefficient_of_variation(v: &[f64]) -> Option<f64> {
    let m = mean(v);
    if v.len() < 2 || m.abs() < EPS {
        return None;
    }
    Some(std_dev(v) / m.abs())
}

/// Gaussian bell peaking at 1.0 when `x == center`.
pub(crate) fn bell(x: f64, center: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return 0.0;
    }
    let d = (x - center) / width;
    (-d * d).exp()
}

pub(crate) fn ratio_or(num: f64, den: f64, fallback: f64) -> f64 {
    if den.abs() < EPS {
        return fallback;
    }
    let r = num / den;
    if r.is_finite() { r } else { fallback }
}

/// Clamp into [0, 1]; NaN collapses to 0.
pub(crate) fn unit(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

/// Sign changes between consecutive values. Exact zeros never count.
pub(crate) fn zero_crossings(v: &[f64]) -> usize {
    v.windows(2).filter(|w| w[0] * w[1] < 0.0).count()
}

pub(crate) fn crossing_frequency(v: &[f64], duration_s: f64) -> f64 {
    if duration_s <= EPS {
        return 0.0;
    }
    zero_crossings(v) as f64 / (2.0 * duration_s)
}

/// Indices of strict local maxima above `threshold`.
pub(crate) fn local_maxima(v: &[f64], threshold: f64) -> Vec<usize> {
    let n = v.len();
    if n < 3 {
        return Vec::new();
    }
    let mut peaks = Vec::new();
    for i in 1..n - 1 {
        if v[i] >= threshold && v[i] > v[i - 1] && v[i] >= v[i + 1] {
            peaks.push(i);
        }
    }
    peaks
}

/// Centered moving average, truncated at the edges.
pub(crate) fn moving_average(v: &[f64], width: usize) -> Vec<f64> {
    let n = v.len();
    let half = width / 2;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let from = i.saturating_sub(half);
        let to = (i + half + 1).min(n);
        out.push(mean(&v[from..to]));
    }
    out
}
