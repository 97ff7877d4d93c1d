//! This module defines the measurement data structures: loaded traces, the results derived from
//! them (spectra, normalized spectra, phases) and the per-trace results cache.

use crate::error::{Error, Result};
use crate::window::WindowSpec;
use ndarray::Array1;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Phase unwrapping methods.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnwrapMethod {
    /// Local 2π-jump detection only.
    #[default]
    Blind,
    /// Reference-informed reconstruction using the time-of-flight offset (Jepsen).
    Informed,
}

impl Display for UnwrapMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnwrapMethod::Blind => write!(f, "Blind"),
            UnwrapMethod::Informed => write!(f, "Informed"),
        }
    }
}

impl FromStr for UnwrapMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blind" => Ok(UnwrapMethod::Blind),
            "informed" | "jepsen" => Ok(UnwrapMethod::Informed),
            _ => Err(Error::UnknownUnwrapMethod(s.to_string())),
        }
    }
}

/// The window configuration a spectrum was computed with.
///
/// # Fields
/// - `window`: The window type and its parameters.
/// - `start_idx`, `stop_idx`: The clamped window region `[start_idx, stop_idx)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMeta {
    pub window: WindowSpec,
    pub start_idx: usize,
    pub stop_idx: usize,
}

/// The non-negative half spectrum of a windowed trace.
///
/// # Fields
/// - `freqs`: Frequency axis (THz).
/// - `spectrum`: Complex FFT values, same length as `freqs`.
/// - `peak_time_ps`: Time at which the real part of the windowed signal has its largest
///   absolute value. `NaN` for an empty signal.
/// - `window_meta`: The window the spectrum was computed with.
#[derive(Debug, Clone)]
pub struct SpectrumResult {
    pub freqs: Array1<f64>,
    pub spectrum: Array1<Complex64>,
    pub peak_time_ps: f64,
    pub window_meta: WindowMeta,
}

/// A spectrum divided by the reference spectrum (transmission function).
///
/// Both peak times are kept so that the informed unwrapping can be run from this value alone.
#[derive(Debug, Clone)]
pub struct NormalizedSpectrum {
    pub freqs: Array1<f64>,
    pub spectrum: Array1<Complex64>,
    pub sample_peak_time_ps: f64,
    pub reference_peak_time_ps: f64,
}

/// Diagnostics of the informed unwrapping.
///
/// # Fields
/// - `reduced_unwrapped_phase`: Unwrapped phase with the linear time-of-flight ramp removed,
///   after the whole-cycle correction.
/// - `fit_intercept`: Intercept `B` of the linear fit over the masked bins.
/// - `t0_sample_ps`, `t0_reference_ps`: The peak times used to build the ramp.
#[derive(Debug, Clone)]
pub struct InformedDetails {
    pub reduced_unwrapped_phase: Array1<f64>,
    pub fit_intercept: f64,
    pub t0_sample_ps: f64,
    pub t0_reference_ps: f64,
}

/// Wrapped and unwrapped phase of a spectrum.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub freqs: Array1<f64>,
    pub phase: Array1<f64>,
    pub unwrapped_phase: Array1<f64>,
    pub method: UnwrapMethod,
    /// Only set for [`UnwrapMethod::Informed`].
    pub informed: Option<InformedDetails>,
}

/// Phase derivation state of a single trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    NoSpectrum,
    HasSpectrum,
    HasPhase(UnwrapMethod),
}

/// Per-trace cache of derived results.
///
/// The fields are private so that the invalidation rules hold: a new spectrum drops every
/// result derived from the old one, and a new normalized spectrum drops the normalized phase.
#[derive(Debug, Clone, Default)]
pub struct TraceResults {
    spectrum: Option<SpectrumResult>,
    normalized_spectrum: Option<NormalizedSpectrum>,
    phase: Option<PhaseResult>,
    normalized_phase: Option<PhaseResult>,
}

impl TraceResults {
    pub fn spectrum(&self) -> Option<&SpectrumResult> {
        self.spectrum.as_ref()
    }

    pub fn normalized_spectrum(&self) -> Option<&NormalizedSpectrum> {
        self.normalized_spectrum.as_ref()
    }

    pub fn phase(&self) -> Option<&PhaseResult> {
        self.phase.as_ref()
    }

    pub fn normalized_phase(&self) -> Option<&PhaseResult> {
        self.normalized_phase.as_ref()
    }

    /// Stores a freshly computed spectrum and removes everything derived from the previous one.
    pub fn set_spectrum(&mut self, spectrum: SpectrumResult) {
        self.spectrum = Some(spectrum);
        self.phase = None;
        self.normalized_spectrum = None;
        self.normalized_phase = None;
    }

    pub fn set_normalized_spectrum(&mut self, normalized: NormalizedSpectrum) {
        self.normalized_spectrum = Some(normalized);
        self.normalized_phase = None;
    }

    pub fn clear_normalized_spectrum(&mut self) {
        self.normalized_spectrum = None;
        self.normalized_phase = None;
    }

    pub fn set_phase(&mut self, phase: PhaseResult) {
        self.phase = Some(phase);
    }

    pub fn set_normalized_phase(&mut self, phase: PhaseResult) {
        self.normalized_phase = Some(phase);
    }

    /// Drops both phase entries, e.g. when the unwrap method changes.
    pub fn clear_phases(&mut self) {
        self.phase = None;
        self.normalized_phase = None;
    }

    pub fn phase_state(&self) -> PhaseState {
        if self.spectrum.is_none() {
            return PhaseState::NoSpectrum;
        }
        match self.normalized_phase.as_ref().or(self.phase.as_ref()) {
            Some(p) => PhaseState::HasPhase(p.method),
            None => PhaseState::HasSpectrum,
        }
    }
}

/// One loaded THz-TDS measurement.
///
/// Time axis and signal are immutable once the trace is built; only the results cache changes.
#[derive(Debug, Clone)]
pub struct Trace {
    name: String,
    identity: String,
    time: Array1<f64>,
    signal: Array1<Complex64>,
    results: TraceResults,
}

impl Trace {
    /// Creates a trace from a time axis (ps) and a complex signal.
    ///
    /// # Arguments
    /// - `name`: Display name, usually the file stem.
    /// - `identity`: Opaque identity, usually the source path.
    /// - `time`: Strictly increasing time axis in ps.
    /// - `signal`: Complex amplitudes, same length as `time`.
    ///
    /// # Returns
    /// The trace, or [`Error::InvalidTrace`] if the lengths differ or the time axis is not
    /// strictly increasing.
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        time: Array1<f64>,
        signal: Array1<Complex64>,
    ) -> Result<Trace> {
        if time.len() != signal.len() {
            return Err(Error::InvalidTrace(format!(
                "time axis has {} samples but signal has {}",
                time.len(),
                signal.len()
            )));
        }
        if let Some(i) = time
            .windows(2)
            .into_iter()
            .position(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
        {
            return Err(Error::InvalidTrace(format!(
                "time axis is not strictly increasing at index {}",
                i + 1
            )));
        }
        Ok(Trace {
            name: name.into(),
            identity: identity.into(),
            time,
            signal,
            results: TraceResults::default(),
        })
    }

    /// Builds a trace from separate real and imaginary columns.
    pub fn from_columns(
        name: impl Into<String>,
        identity: impl Into<String>,
        time: Vec<f64>,
        real: Vec<f64>,
        imag: Vec<f64>,
    ) -> Result<Trace> {
        if real.len() != imag.len() {
            return Err(Error::InvalidTrace(format!(
                "real column has {} samples but imag column has {}",
                real.len(),
                imag.len()
            )));
        }
        let signal = real
            .into_iter()
            .zip(imag)
            .map(|(re, im)| Complex64::new(re, im))
            .collect::<Array1<Complex64>>();
        Trace::new(name, identity, Array1::from_vec(time), signal)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn signal(&self) -> &Array1<Complex64> {
        &self.signal
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn results(&self) -> &TraceResults {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut TraceResults {
        &mut self.results
    }
}
