//! Model-free curve descriptors
//!
//! These are computed from the concentration curve itself, independently of
//! the kinetic fit, so they are available for every voxel.
//!
//! ## Area under the curve
//!
//! Linear trapezoidal rule over a window starting at the bolus arrival frame:
//!
//! ```text
//! AUC_segment = (C₁ + C₂) / 2 × (t₂ - t₁)
//! ```
//!
//! A segment crossing the end of the window is cut at the window end, with the
//! concentration there linearly interpolated.

/// Area of one trapezoid. Returns 0.0 if the interval is empty or reversed.
#[inline]
pub fn auc_segment(t1: f64, c1: f64, t2: f64, c2: f64) -> f64 {
    let dt = t2 - t1;
    if dt <= 0.0 {
        return 0.0;
    }
    (c1 + c2) / 2.0 * dt
}

/// AUC over `[times[start], times[start] + interval]`.
///
/// # Panics
///
/// Panics if `times` and `concentrations` have different lengths.
///
/// # Examples
///
/// ```rust
/// use dcesol::fit::auc_window;
///
/// let times = vec![0.0, 1.0, 2.0, 3.0];
/// let concs = vec![0.0, 2.0, 2.0, 0.0];
///
/// // from frame 1 over 1.5 time units: 2.0 + half of the last segment
/// let auc = auc_window(&times, &concs, 1, 1.5);
/// assert!((auc - 2.75).abs() < 1e-12);
/// ```
pub fn auc_window(times: &[f64], concentrations: &[f64], start: usize, interval: f64) -> f64 {
    assert_eq!(
        times.len(),
        concentrations.len(),
        "times and concentrations must have the same length"
    );

    if times.len() < 2 || start >= times.len() - 1 || interval <= 0.0 {
        return 0.0;
    }

    let end = times[start] + interval;
    let mut auc = 0.0;

    for i in (start + 1)..times.len() {
        let (t1, c1) = (times[i - 1], concentrations[i - 1]);
        let (t2, c2) = (times[i], concentrations[i]);

        if t2 <= end {
            auc += auc_segment(t1, c1, t2, c2);
            continue;
        }

        if t1 < end {
            let c_end = c1 + (c2 - c1) * (end - t1) / (t2 - t1);
            auc += auc_segment(t1, c1, end, c_end);
        }
        break;
    }

    auc
}

/// Steepest rise of the curve, `max (C[i+1] - C[i]) / (t[i+1] - t[i])`.
///
/// Intervals of zero length are ignored; a curve with no usable interval gives 0.0.
pub fn max_slope(times: &[f64], concentrations: &[f64]) -> f64 {
    times
        .windows(2)
        .zip(concentrations.windows(2))
        .filter(|(t, _)| t[1] > t[0])
        .map(|(t, c)| (c[1] - c[0]) / (t[1] - t[0]))
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
        .unwrap_or(0.0)
}

/// Coefficient of determination of `fitted` against `observed`.
///
/// A flat observed curve has no variance to explain and gives 0.0.
pub fn r_squared(observed: &[f64], fitted: &[f64]) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let ss_tot: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(fitted)
        .map(|(o, f)| (o - f).powi(2))
        .sum();

    if ss_tot <= 0.0 || !ss_res.is_finite() {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}
