//! Order statistics over `f64` slices.

use std::cmp::Ordering;

/// Linearly interpolated percentile (`q` in `[0, 100]`), matching NumPy's default method.
///
/// Returns `None` for an empty slice or when any value is NaN.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    if lo == hi {
        return Some(sorted[lo]);
    }
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Largest value, ignoring NaNs. `None` for an empty (or all-NaN) slice.
pub fn max_value(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}
