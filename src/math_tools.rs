//! Magnitude and phase extraction from complex spectra, and the sequential phase unwrap.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Floor applied to magnitudes before taking the logarithm.
pub const MAG_FLOOR: f64 = 1e-12;

/// Computes the linear and logarithmic magnitude of a complex spectrum.
///
/// # Arguments
/// - `spectrum`: The complex spectrum.
///
/// # Returns
/// `(magnitude, magnitude_db)` where `magnitude_db = 20 log10(max(magnitude, 1e-12))`, so the
/// dB value never reaches `-inf`.
pub fn compute_mag(spectrum: &Array1<Complex64>) -> (Array1<f64>, Array1<f64>) {
    let magnitude = spectrum.mapv(|c| c.norm());
    let magnitude_db = magnitude.mapv(|m| 20.0 * m.max(MAG_FLOOR).log10());
    (magnitude, magnitude_db)
}

/// Principal argument of every bin, in `(-π, π]`.
pub fn compute_phase(spectrum: &Array1<Complex64>) -> Array1<f64> {
    spectrum.mapv(|c| c.arg())
}

/// Unwraps a wrapped phase curve.
///
/// Walks the samples in order and removes every jump larger than π between consecutive
/// samples by adding the matching multiple of 2π.
pub fn unwrap_phase(wrapped: &Array1<f64>) -> Array1<f64> {
    numpy_unwrap(&wrapped.to_vec(), 2.0 * PI)
}

/// Unwraps a periodic signal's values based on the provided period.
///
/// Same semantics as numpy's `unwrap` with `discont = period / 2`: a jump of exactly half a
/// period is left alone, and an ambiguous `+period / 2` step maps to `+period / 2`.
fn numpy_unwrap(x: &[f64], period: f64) -> Array1<f64> {
    let half = period / 2.0;
    let mut unwrapped = x.to_owned();
    let mut correction = 0.0;
    for i in 1..x.len() {
        let dd = x[i] - x[i - 1];
        if dd.abs() >= half {
            let mut ddmod = (dd + half).rem_euclid(period) - half;
            if ddmod == -half && dd > 0.0 {
                ddmod = half;
            }
            correction += ddmod - dd;
        }
        unwrapped[i] = x[i] + correction;
    }
    Array1::from_vec(unwrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_compute_mag_clamps_db() {
        let spectrum = Array1::from_vec(vec![
            Complex64::new(3.0, 4.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.1, 0.0),
        ]);
        let (mag, db) = compute_mag(&spectrum);
        assert_abs_diff_eq!(mag[0], 5.0, epsilon = 1e-12);
        assert_eq!(mag[1], 0.0);
        assert_abs_diff_eq!(db[1], -240.0, epsilon = 1e-9);
        assert_abs_diff_eq!(db[2], -20.0, epsilon = 1e-9);
        assert!(db.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_compute_phase_range() {
        let spectrum = Array1::from_vec(vec![
            Complex64::new(-1.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(0.0, -1.0),
        ]);
        let phase = compute_phase(&spectrum);
        assert_abs_diff_eq!(phase[0], PI, epsilon = 1e-12);
        assert_abs_diff_eq!(phase[1], PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(phase[2], -PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unwrap_removes_jumps() {
        // a steep descending ramp sampled below Nyquist
        let truth = Array1::from_shape_fn(50, |k| -0.9 * k as f64);
        let wrapped = truth.mapv(|p| Complex64::from_polar(1.0, p).arg());
        let unwrapped = unwrap_phase(&wrapped);
        for (a, b) in unwrapped.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unwrap_is_idempotent() {
        let wrapped = Array1::from_shape_fn(40, |k| Complex64::from_polar(1.0, 1.3 * k as f64).arg());
        let once = unwrap_phase(&wrapped);
        let twice = unwrap_phase(&once);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_linear_phase_round_trip() {
        let c = 0.01;
        let truth = Array1::from_shape_fn(100, |k| c * k as f64);
        let spectrum = truth.mapv(|p| Complex64::from_polar(2.0, p));
        let unwrapped = unwrap_phase(&compute_phase(&spectrum));
        for (a, b) in unwrapped.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_unwrap_short_inputs() {
        assert!(unwrap_phase(&Array1::zeros(0)).is_empty());
        assert_eq!(unwrap_phase(&Array1::from_vec(vec![3.0])).to_vec(), vec![3.0]);
    }
}
