//! Runs the processing steps over every trace in a [`MeasurementStore`] and caches the results.

use crate::config::{ProcessingConfig, TimeWindow};
use crate::data_container::{PhaseResult, Trace, UnwrapMethod};
use crate::error::Result;
use crate::spectrum::{compute_fft, normalize_fft};
use crate::store::MeasurementStore;
use crate::unwrap::{blind_phase, informed_phase};
use crate::window::WindowSpec;
use rayon::prelude::*;
use std::time::Instant;

/// Computes spectra, normalized spectra and phases as described by `config`.
pub fn run(store: &mut MeasurementStore, config: &ProcessingConfig) -> Result<()> {
    compute_spectra(store, &config.window, &config.time_window)?;
    compute_phases(store, config.unwrap_method, config.mag_threshold)
}

/// Computes the windowed spectrum of every trace, then normalizes against the reference.
///
/// The bounds are snapped on the shared time axis. Spectra are only committed when every trace
/// succeeded, so on error the previous results stay untouched. Committing a spectrum drops the
/// results derived from the old one.
pub fn compute_spectra(
    store: &mut MeasurementStore,
    window: &WindowSpec,
    bounds: &TimeWindow,
) -> Result<()> {
    let Some(axis) = store.axis() else {
        log::debug!("no traces loaded, nothing to transform");
        return Ok(());
    };
    let (start_idx, stop_idx) = bounds.to_indices(axis);
    let start = Instant::now();

    let spectra = store
        .all()
        .par_iter()
        .map(|trace| compute_fft(trace.time(), trace.signal(), window, start_idx, stop_idx))
        .collect::<Result<Vec<_>>>()?;

    for (trace, spectrum) in store.iter_mut().zip(spectra) {
        if trace.results().spectrum().is_some() {
            log::debug!("{}: spectrum changed, dropping cached phases", trace.name());
        }
        trace.results_mut().set_spectrum(spectrum);
    }
    log::info!(
        "computed {} spectra with window {} [{}, {:?}) in {:?}",
        store.len(),
        window,
        start_idx,
        stop_idx,
        start.elapsed()
    );

    compute_normalized_spectra(store)
}

/// Divides every cached spectrum by the reference spectrum.
///
/// Without a reference, or while the reference has no spectrum, the normalized spectra are
/// removed instead; this is not an error.
pub fn compute_normalized_spectra(store: &mut MeasurementStore) -> Result<()> {
    let Some(reference) = store
        .get_reference()
        .and_then(|r| r.results().spectrum())
        .cloned()
    else {
        log::debug!("no reference spectrum, normalized spectra not available");
        store
            .iter_mut()
            .for_each(|t| t.results_mut().clear_normalized_spectrum());
        return Ok(());
    };

    let normalized = store
        .all()
        .par_iter()
        .map(|trace| {
            trace
                .results()
                .spectrum()
                .map(|s| normalize_fft(s, &reference))
                .transpose()
        })
        .collect::<Result<Vec<_>>>()?;

    for (trace, normalized) in store.iter_mut().zip(normalized) {
        match normalized {
            Some(n) => trace.results_mut().set_normalized_spectrum(n),
            None => trace.results_mut().clear_normalized_spectrum(),
        }
    }
    Ok(())
}

/// Derives the phase of every trace from its cached spectra.
///
/// All previous phase entries are replaced, or left untouched on error. The raw spectrum always gets a blind unwrap; the
/// normalized spectrum is unwrapped with `method`. The reference trace is skipped for the
/// informed method, traces without a normalized spectrum are skipped, and a trace with a
/// non-finite peak time falls back to the blind unwrap.
pub fn compute_phases(
    store: &mut MeasurementStore,
    method: UnwrapMethod,
    mag_threshold: f64,
) -> Result<()> {
    let reference = store.reference_identity().map(str::to_string);

    let phases = store
        .all()
        .par_iter()
        .map(|trace| -> Result<_> {
            let is_reference = reference.as_deref() == Some(trace.identity());
            let phase = trace
                .results()
                .spectrum()
                .map(|s| blind_phase(&s.freqs, &s.spectrum));
            let normalized_phase = normalized_phase(trace, method, is_reference, mag_threshold)?;
            Ok((phase, normalized_phase))
        })
        .collect::<Result<Vec<_>>>()?;

    for (trace, (phase, normalized_phase)) in store.iter_mut().zip(phases) {
        trace.results_mut().clear_phases();
        if let Some(p) = phase {
            trace.results_mut().set_phase(p);
        }
        if let Some(p) = normalized_phase {
            trace.results_mut().set_normalized_phase(p);
        }
    }
    log::info!("computed phases ({method})");
    Ok(())
}

fn normalized_phase(
    trace: &Trace,
    method: UnwrapMethod,
    is_reference: bool,
    mag_threshold: f64,
) -> Result<Option<PhaseResult>> {
    let Some(normalized) = trace.results().normalized_spectrum() else {
        return Ok(None);
    };
    match method {
        UnwrapMethod::Blind => Ok(Some(blind_phase(&normalized.freqs, &normalized.spectrum))),
        UnwrapMethod::Informed if is_reference => {
            log::debug!("{}: reference trace, informed unwrap skipped", trace.name());
            Ok(None)
        }
        UnwrapMethod::Informed => {
            if !(normalized.sample_peak_time_ps.is_finite()
                && normalized.reference_peak_time_ps.is_finite())
            {
                log::warn!(
                    "{}: peak time not available, falling back to blind unwrap",
                    trace.name()
                );
                return Ok(Some(blind_phase(&normalized.freqs, &normalized.spectrum)));
            }
            informed_phase(normalized, None, mag_threshold).map(Some)
        }
    }
}

/// The cached phase of the raw spectrum, `None` if not computed.
pub fn phase_of(trace: &Trace) -> Option<&PhaseResult> {
    trace.results().phase()
}

/// The cached phase of the normalized spectrum, `None` if not computed.
pub fn normalized_phase_of(trace: &Trace) -> Option<&PhaseResult> {
    trace.results().normalized_phase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::PhaseState;
    use crate::error::Error;
    use crate::window::WindowType;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;
    use num_complex::Complex64;
    use std::f64::consts::PI;

    const N: usize = 512;
    const DT: f64 = 0.05;

    fn pulse(name: &str, t0: f64, amplitude: f64) -> Trace {
        let time = Array1::from_shape_fn(N, |i| i as f64 * DT);
        let signal = time.mapv(|t| Complex64::new(amplitude * (-((t - t0) / 0.1).powi(2)).exp(), 0.0));
        Trace::new(name, name, time, signal).unwrap()
    }

    fn store_with_reference() -> MeasurementStore {
        let mut store = MeasurementStore::new();
        store.insert(pulse("ref", 5.0, 1.0));
        store.insert(pulse("sample", 5.5, 0.8));
        store.set_reference(Some("ref"));
        store
    }

    #[test]
    fn test_spectra_and_normalization() {
        let mut store = store_with_reference();
        compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default()).unwrap();

        let reference = store.get("ref").unwrap();
        let unity = reference.results().normalized_spectrum().unwrap();
        for x in unity.spectrum.iter() {
            assert_abs_diff_eq!(x.re, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(x.im, 0.0, epsilon = 1e-9);
        }

        let sample = store.get("sample").unwrap();
        let normalized = sample.results().normalized_spectrum().unwrap();
        assert_eq!(normalized.freqs.len(), N / 2);
        assert_abs_diff_eq!(normalized.sample_peak_time_ps, 5.5, epsilon = 1e-9);
        assert_abs_diff_eq!(normalized.reference_peak_time_ps, 5.0, epsilon = 1e-9);
        for x in normalized.spectrum.iter() {
            assert_abs_diff_eq!(x.norm(), 0.8, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_no_reference_means_no_normalized_spectrum() {
        let mut store = store_with_reference();
        store.set_reference(None);
        compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default()).unwrap();
        for trace in store.all() {
            assert!(trace.results().spectrum().is_some());
            assert!(trace.results().normalized_spectrum().is_none());
        }
        compute_phases(&mut store, UnwrapMethod::Informed, 0.2).unwrap();
        for trace in store.all() {
            assert!(phase_of(trace).is_some());
            assert!(normalized_phase_of(trace).is_none());
        }
    }

    #[test]
    fn test_informed_phase_of_delayed_sample() {
        let mut store = store_with_reference();
        compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default()).unwrap();
        compute_phases(&mut store, UnwrapMethod::Informed, 0.2).unwrap();

        let reference = store.get("ref").unwrap();
        assert!(normalized_phase_of(reference).is_none());
        assert!(phase_of(reference).is_some());

        let sample = store.get("sample").unwrap();
        let phase = normalized_phase_of(sample).unwrap();
        assert_eq!(phase.method, UnwrapMethod::Informed);
        assert_eq!(
            sample.results().phase_state(),
            PhaseState::HasPhase(UnwrapMethod::Informed)
        );
        for (p, f) in phase.unwrapped_phase.iter().zip(phase.freqs.iter()) {
            assert_abs_diff_eq!(*p, -2.0 * PI * f * 0.5, epsilon = 1e-6);
        }
        assert_eq!(phase_of(sample).unwrap().method, UnwrapMethod::Blind);
    }

    #[test]
    fn test_switching_method_replaces_phases() {
        let mut store = store_with_reference();
        compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default()).unwrap();
        compute_phases(&mut store, UnwrapMethod::Informed, 0.2).unwrap();
        compute_phases(&mut store, UnwrapMethod::Blind, 0.2).unwrap();

        let reference = store.get("ref").unwrap();
        assert_eq!(
            normalized_phase_of(reference).unwrap().method,
            UnwrapMethod::Blind
        );
        let sample = store.get("sample").unwrap();
        let phase = normalized_phase_of(sample).unwrap();
        assert_eq!(phase.method, UnwrapMethod::Blind);
        assert!(phase.informed.is_none());
    }

    #[test]
    fn test_failed_phase_pass_keeps_previous_phases() {
        let mut store = store_with_reference();
        compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default()).unwrap();
        compute_phases(&mut store, UnwrapMethod::Blind, 0.2).unwrap();

        // a normalized spectrum whose bins do not line up with its frequency axis
        let sample = store.get_mut("sample").unwrap();
        let mut broken = sample.results().normalized_spectrum().unwrap().clone();
        broken.freqs = Array1::zeros(3);
        sample.results_mut().set_normalized_spectrum(broken);

        let res = compute_phases(&mut store, UnwrapMethod::Informed, 0.2);
        assert!(matches!(res, Err(Error::LengthMismatch { .. })));
        for trace in store.all() {
            assert_eq!(phase_of(trace).unwrap().method, UnwrapMethod::Blind);
        }
        let reference = store.get("ref").unwrap();
        assert_eq!(
            normalized_phase_of(reference).unwrap().method,
            UnwrapMethod::Blind
        );
    }

    #[test]
    fn test_new_window_invalidates_phases() {
        let mut store = store_with_reference();
        compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default()).unwrap();
        compute_phases(&mut store, UnwrapMethod::Blind, 0.2).unwrap();
        assert!(phase_of(store.get("sample").unwrap()).is_some());

        let hann = WindowSpec::new(WindowType::Hann, vec![]).unwrap();
        let bounds = TimeWindow {
            start_ps: Some(2.0),
            stop_ps: Some(10.0),
        };
        compute_spectra(&mut store, &hann, &bounds).unwrap();

        let sample = store.get("sample").unwrap();
        assert!(phase_of(sample).is_none());
        assert!(normalized_phase_of(sample).is_none());
        assert_eq!(sample.results().phase_state(), PhaseState::HasSpectrum);
        let meta = &sample.results().spectrum().unwrap().window_meta;
        assert_eq!(meta.window, hann);
        let (start_idx, stop_idx) = bounds.to_indices(sample.time());
        assert_eq!(meta.start_idx, start_idx);
        assert_eq!(Some(meta.stop_idx), stop_idx);
        assert!(meta.start_idx > 0 && meta.stop_idx < N);
        // normalized again against the new reference spectrum
        assert!(sample.results().normalized_spectrum().is_some());
    }

    #[test]
    fn test_failed_transform_commits_nothing() {
        let mut store = MeasurementStore::new();
        let trace = Trace::from_columns("one", "one", vec![0.0], vec![1.0], vec![0.0]).unwrap();
        store.insert(trace);
        let res = compute_spectra(&mut store, &WindowSpec::default(), &TimeWindow::default());
        assert!(matches!(res, Err(Error::TooFewSamples(1))));
        assert!(store.all()[0].results().spectrum().is_none());
    }

    #[test]
    fn test_empty_store_is_a_no_op() {
        let mut store = MeasurementStore::new();
        let config = ProcessingConfig::default();
        run(&mut store, &config).unwrap();
        assert!(store.is_empty());
    }
}
