//! Windowed discrete Fourier transform of a trace and normalization against a reference spectrum.

use crate::data_container::{NormalizedSpectrum, SpectrumResult, WindowMeta};
use crate::error::{Error, Result};
use crate::window::{apply_window, WindowSpec};
use ndarray::Array1;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Reference bins with a smaller magnitude are replaced by this value before dividing.
pub const DIVIDE_FLOOR: f64 = 1e-12;

/// Computes the windowed FFT of a complex time-domain trace.
///
/// The signal is windowed with [`apply_window`] (samples outside the window set to zero) and
/// transformed over its full length `N`, so windowing changes the amplitude, not the array
/// length. Only the first `N / 2` bins are returned: the traces are real-valued in the time
/// domain and the negative half of the spectrum carries no extra information.
///
/// # Arguments
/// - `time`: Uniformly sampled time axis (ps). Only `time[1] - time[0]` is used for `dt`.
/// - `signal`: Complex signal, same length as `time`.
/// - `window`: Window to apply.
/// - `start_idx`, `stop_idx`: Window region, clamped as in [`apply_window`].
///
/// # Returns
/// The half spectrum with its frequency axis (THz) and the time of the largest absolute real
/// part of the windowed signal. Traces shorter than two samples are rejected.
pub fn compute_fft(
    time: &Array1<f64>,
    signal: &Array1<Complex64>,
    window: &WindowSpec,
    start_idx: usize,
    stop_idx: Option<usize>,
) -> Result<SpectrumResult> {
    if time.len() != signal.len() {
        return Err(Error::LengthMismatch {
            expected: time.len(),
            got: signal.len(),
        });
    }
    let n = signal.len();
    if n < 2 {
        return Err(Error::TooFewSamples(n));
    }

    let windowed = apply_window(time, signal, window, start_idx, stop_idx, true);
    let peak_time_ps = peak_time(time, &windowed.signal);

    let mut buffer = windowed.signal.to_vec();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let dt = time[1] - time[0];
    let half = n / 2;
    let freqs = Array1::from_shape_fn(half, |k| k as f64 / (n as f64 * dt));
    let spectrum = buffer.into_iter().take(half).collect::<Array1<Complex64>>();

    Ok(SpectrumResult {
        freqs,
        spectrum,
        peak_time_ps,
        window_meta: WindowMeta {
            window: window.clone(),
            start_idx: windowed.start_idx,
            stop_idx: windowed.stop_idx,
        },
    })
}

/// Time at the first index of the maximum `|Re(x)|`, `NaN` for an empty signal.
fn peak_time(time: &Array1<f64>, signal: &Array1<Complex64>) -> f64 {
    let mut best: Option<(usize, f64)> = None;
    for (i, x) in signal.iter().enumerate() {
        let amplitude = x.re.abs();
        match best {
            Some((_, b)) if amplitude <= b => {}
            _ => best = Some((i, amplitude)),
        }
    }
    best.map(|(i, _)| time[i]).unwrap_or(f64::NAN)
}

/// Divides a spectrum by a reference spectrum bin by bin.
///
/// Reference bins with a magnitude below [`DIVIDE_FLOOR`] are replaced by `DIVIDE_FLOOR + 0i`,
/// which keeps the quotient finite. Both spectra must come from traces on the same time axis;
/// a different bin count is reported as [`Error::LengthMismatch`].
pub fn normalize_fft(
    spectrum: &SpectrumResult,
    reference: &SpectrumResult,
) -> Result<NormalizedSpectrum> {
    if spectrum.spectrum.len() != reference.spectrum.len() {
        return Err(Error::LengthMismatch {
            expected: reference.spectrum.len(),
            got: spectrum.spectrum.len(),
        });
    }
    let floor = Complex64::new(DIVIDE_FLOOR, 0.0);
    let quotient = spectrum
        .spectrum
        .iter()
        .zip(reference.spectrum.iter())
        .map(|(x, r)| {
            let r = if r.norm() < DIVIDE_FLOOR { floor } else { *r };
            *x / r
        })
        .collect::<Array1<Complex64>>();

    Ok(NormalizedSpectrum {
        freqs: spectrum.freqs.clone(),
        spectrum: quotient,
        sample_peak_time_ps: spectrum.peak_time_ps,
        reference_peak_time_ps: reference.peak_time_ps,
    })
}
