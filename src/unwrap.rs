//! Phase unwrapping of spectra: the blind sequential unwrap and the reference-informed
//! reconstruction of the transmission phase.
//!
//! The informed method follows Jepsen, "Phase retrieval in terahertz time-domain measurements:
//! a how-to tutorial" (J. Infrared Milli. Terahz. Waves, 2019). The linear phase ramp caused by
//! the time-of-flight difference between sample and reference is removed before unwrapping, so
//! only the slowly varying remainder has to be unwrapped. The remaining whole-cycle ambiguity
//! is fixed by extrapolating a linear fit of the remainder to zero frequency.

use crate::data_container::{InformedDetails, NormalizedSpectrum, PhaseResult, UnwrapMethod};
use crate::error::{Error, Result};
use crate::math_tools::{compute_phase, unwrap_phase};
use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Default relative magnitude threshold for the bins used in the intercept fit.
pub const DEFAULT_MAG_THRESHOLD: f64 = 0.2;

/// The intercept fit is only performed when the mask selects more points than this.
pub const MIN_FIT_POINTS: usize = 5;

/// Output of [`unwrap_phase_informed`].
#[derive(Debug, Clone)]
pub struct InformedUnwrap {
    /// Reconstructed phase difference, ramp included.
    pub unwrapped_phase: Array1<f64>,
    pub details: InformedDetails,
}

/// Reconstructs the continuous phase of a transmission spectrum `T = FFT(sample) / FFT(reference)`.
///
/// # Arguments
/// - `freqs_thz`: Frequency axis (THz).
/// - `t_complex`: Normalized spectrum, same length as `freqs_thz`.
/// - `t0_sample_ps`, `t0_reference_ps`: Peak times of the windowed sample and reference traces.
/// - `fit_mask`: Bins used for the linear fit. Defaults to `f > 0` and
///   `|T| > mag_threshold * max|T|`.
/// - `mag_threshold`: Relative magnitude threshold of the default mask.
///
/// # Returns
/// The reconstructed phase with the reduced phase and the fit intercept as diagnostics, or
/// [`Error::LengthMismatch`] if the inputs are not aligned.
pub fn unwrap_phase_informed(
    freqs_thz: &Array1<f64>,
    t_complex: &Array1<Complex64>,
    t0_sample_ps: f64,
    t0_reference_ps: f64,
    fit_mask: Option<&Array1<bool>>,
    mag_threshold: f64,
) -> Result<InformedUnwrap> {
    if t_complex.len() != freqs_thz.len() {
        return Err(Error::LengthMismatch {
            expected: freqs_thz.len(),
            got: t_complex.len(),
        });
    }
    if let Some(mask) = fit_mask {
        if mask.len() != freqs_thz.len() {
            return Err(Error::LengthMismatch {
                expected: freqs_thz.len(),
                got: mask.len(),
            });
        }
    }

    let dt0 = t0_sample_ps - t0_reference_ps;
    let phi0_diff = freqs_thz.mapv(|f| 2.0 * PI * f * dt0);

    let reduced = t_complex
        .iter()
        .zip(phi0_diff.iter())
        .map(|(t, phi)| *t * Complex64::from_polar(1.0, -phi))
        .collect::<Array1<Complex64>>();
    let dphi0_star = unwrap_phase(&compute_phase(&reduced));

    let mask = match fit_mask {
        Some(mask) => mask.clone(),
        None => default_mask(freqs_thz, t_complex, mag_threshold),
    };

    let (omega, y): (Vec<f64>, Vec<f64>) = freqs_thz
        .iter()
        .zip(dphi0_star.iter())
        .zip(mask.iter())
        .filter(|(_, m)| **m)
        .map(|((f, p), _)| (2.0 * PI * f, *p))
        .unzip();

    let intercept = if omega.len() > MIN_FIT_POINTS {
        linear_fit(&omega, &y).1
    } else {
        0.0
    };

    let cycles = (intercept / (2.0 * PI)).round_ties_even();
    let dphi0 = dphi0_star.mapv(|p| p - 2.0 * PI * cycles);
    let unwrapped_phase = &dphi0 + &phi0_diff;

    Ok(InformedUnwrap {
        unwrapped_phase,
        details: InformedDetails {
            reduced_unwrapped_phase: dphi0,
            fit_intercept: intercept,
            t0_sample_ps,
            t0_reference_ps,
        },
    })
}

fn default_mask(
    freqs_thz: &Array1<f64>,
    t_complex: &Array1<Complex64>,
    mag_threshold: f64,
) -> Array1<bool> {
    let mag = t_complex.mapv(|t| t.norm());
    let max = mag.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    freqs_thz
        .iter()
        .zip(mag.iter())
        .map(|(f, m)| *f > 0.0 && *m > mag_threshold * max)
        .collect()
}

/// Ordinary least squares fit `y = a x + b`, returns `(a, b)`.
fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let (sxy, sxx) = x
        .iter()
        .zip(y.iter())
        .fold((0.0, 0.0), |(sxy, sxx), (xi, yi)| {
            let dx = xi - x_mean;
            (sxy + dx * (yi - y_mean), sxx + dx * dx)
        });
    if sxx == 0.0 {
        return (0.0, y_mean);
    }
    let slope = sxy / sxx;
    (slope, y_mean - slope * x_mean)
}

/// Wrapped phase and blind unwrap of a spectrum.
pub fn blind_phase(freqs: &Array1<f64>, spectrum: &Array1<Complex64>) -> PhaseResult {
    let phase = compute_phase(spectrum);
    let unwrapped_phase = unwrap_phase(&phase);
    PhaseResult {
        freqs: freqs.clone(),
        phase,
        unwrapped_phase,
        method: UnwrapMethod::Blind,
        informed: None,
    }
}

/// Wrapped phase and informed unwrap of a normalized spectrum, using its stored peak times.
pub fn informed_phase(
    normalized: &NormalizedSpectrum,
    fit_mask: Option<&Array1<bool>>,
    mag_threshold: f64,
) -> Result<PhaseResult> {
    let informed = unwrap_phase_informed(
        &normalized.freqs,
        &normalized.spectrum,
        normalized.sample_peak_time_ps,
        normalized.reference_peak_time_ps,
        fit_mask,
        mag_threshold,
    )?;
    Ok(PhaseResult {
        freqs: normalized.freqs.clone(),
        phase: compute_phase(&normalized.spectrum),
        unwrapped_phase: informed.unwrapped_phase,
        method: UnwrapMethod::Informed,
        informed: Some(informed.details),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_pure_delay_is_recovered() {
        // finely sampled so that the reduced phase has no aliasing between bins
        let freqs = Array1::from_shape_fn(600, |k| k as f64 * 0.01);
        let dt = 2.0;
        let t = freqs.mapv(|f| Complex64::from_polar(1.0, -2.0 * PI * f * dt));

        let res = unwrap_phase_informed(&freqs, &t, dt, 0.0, None, DEFAULT_MAG_THRESHOLD).unwrap();

        for (p, f) in res.unwrapped_phase.iter().zip(freqs.iter()) {
            assert_abs_diff_eq!(*p, -2.0 * PI * f * dt, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(res.details.fit_intercept, 0.0, epsilon = 1e-8);
        assert_eq!(res.details.t0_sample_ps, 2.0);
        assert_eq!(res.details.t0_reference_ps, 0.0);
    }

    #[test]
    fn test_ramp_resolves_ambiguity_blind_cannot() {
        let freqs = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let dt = 2.0;
        let t = freqs.mapv(|f| Complex64::from_polar(1.0, 2.0 * PI * f * dt));

        // every bin is a whole number of cycles, so the blind unwrap sees a flat phase
        let blind = blind_phase(&freqs, &t);
        for p in blind.unwrapped_phase.iter() {
            assert_abs_diff_eq!(*p, 0.0, epsilon = 1e-9);
        }

        let res = unwrap_phase_informed(&freqs, &t, dt, 0.0, None, DEFAULT_MAG_THRESHOLD).unwrap();
        for (p, f) in res.unwrapped_phase.iter().zip(freqs.iter()) {
            assert_abs_diff_eq!(*p, 2.0 * PI * f * dt, epsilon = 1e-9);
        }
        // five usable bins are not enough for a fit
        assert_eq!(res.details.fit_intercept, 0.0);
    }

    #[test]
    fn test_whole_cycle_delay_on_integer_bins() {
        // every bin is a whole number of cycles, so the delay sign cannot be recovered and the
        // ramp is added on top of a flat reduced phase
        let freqs = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let t = freqs.mapv(|f| Complex64::from_polar(1.0, -2.0 * PI * f * 2.0));

        let res = unwrap_phase_informed(&freqs, &t, 2.0, 0.0, None, DEFAULT_MAG_THRESHOLD).unwrap();

        for (p, f) in res.unwrapped_phase.iter().zip(freqs.iter()) {
            assert_abs_diff_eq!(*p, 4.0 * PI * f, epsilon = 1e-9);
        }
        assert_eq!(res.details.fit_intercept, 0.0);
    }

    #[test]
    fn test_whole_cycle_offset_is_removed() {
        let n = 12;
        let freqs = Array1::from_shape_fn(n, |k| k as f64 * 0.1);
        let wrapped = Array1::from_shape_fn(n, |k| match k {
            0 => 0.0,
            1 => 2.0,
            _ => -2.0 + 0.05 * (k as f64 - 2.0),
        });
        let t = wrapped.mapv(|p| Complex64::from_polar(1.0, p));
        let mask = Array1::from_shape_fn(n, |k| k >= 2);

        let res = unwrap_phase_informed(&freqs, &t, 0.0, 0.0, Some(&mask), 0.2).unwrap();

        assert_abs_diff_eq!(res.details.fit_intercept, 2.0 * PI - 2.1, epsilon = 1e-9);
        for k in 2..n {
            assert_abs_diff_eq!(res.unwrapped_phase[k], wrapped[k], epsilon = 1e-9);
        }
        assert_abs_diff_eq!(res.unwrapped_phase[0], -2.0 * PI, epsilon = 1e-9);
        assert_abs_diff_eq!(res.unwrapped_phase[1], 2.0 - 2.0 * PI, epsilon = 1e-9);
    }

    #[test]
    fn test_default_mask_skips_weak_bins() {
        let freqs = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let t = Array1::from_vec(vec![
            Complex64::new(5.0, 0.0),
            Complex64::new(0.5, 0.0),
            Complex64::new(2.0, 0.0),
            Complex64::new(10.0, 0.0),
        ]);
        let mask = default_mask(&freqs, &t, 0.2);
        assert_eq!(mask.to_vec(), vec![false, false, false, true]);
    }

    #[test]
    fn test_mask_length_mismatch() {
        let freqs = Array1::from_vec(vec![0.0, 1.0, 2.0]);
        let t = Array1::from_elem(3, Complex64::new(1.0, 0.0));
        let mask = Array1::from_elem(2, true);
        let res = unwrap_phase_informed(&freqs, &t, 0.0, 0.0, Some(&mask), 0.2);
        assert!(matches!(res, Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn test_linear_fit() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let (a, b) = linear_fit(&x, &y);
        assert_abs_diff_eq!(a, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_informed_phase_uses_stored_peak_times() {
        let freqs = Array1::from_shape_fn(200, |k| k as f64 * 0.02);
        let normalized = NormalizedSpectrum {
            spectrum: freqs.mapv(|f| Complex64::from_polar(0.8, -2.0 * PI * f * 0.5)),
            freqs: freqs.clone(),
            sample_peak_time_ps: 3.5,
            reference_peak_time_ps: 3.0,
        };
        let phase = informed_phase(&normalized, None, DEFAULT_MAG_THRESHOLD).unwrap();
        assert_eq!(phase.method, UnwrapMethod::Informed);
        let details = phase.informed.as_ref().unwrap();
        assert_eq!(details.t0_sample_ps, 3.5);
        assert_eq!(details.t0_reference_ps, 3.0);
        for (p, f) in phase.unwrapped_phase.iter().zip(freqs.iter()) {
            assert_abs_diff_eq!(*p, -2.0 * PI * f * 0.5, epsilon = 1e-8);
        }
    }
}
