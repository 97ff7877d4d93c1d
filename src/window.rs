//! Amplitude windows applied to a sub-range of a complex time-domain trace before the FFT.
//!
//! The window family follows the conventions of the standard spectral-analysis toolboxes:
//! every window is generated in its periodic (DFT-even) form, i.e. a symmetric window of
//! length `m + 1` with the last sample dropped.

use crate::error::{Error, Result};
use ndarray::{s, Array1};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Enum representing the window functions supported by [`apply_window`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum WindowType {
    /// No window, all ones. Arguments are ignored.
    None,
    /// Rectangular window.
    Boxcar,
    /// Hann (raised cosine) window
    Hann,
    /// Hamming window
    Hamming,
    /// Original Blackman window
    Blackman,
    /// Triangular window with zero end points
    Bartlett,
    /// Flat Top
    FlatTop,
    /// Tapered cosine window, parameter `alpha` in [0, 1].
    Tukey,
    /// Gaussian window, parameter `std` in samples.
    Gaussian,
    /// Kaiser window, parameter `beta`.
    Kaiser,
}

impl WindowType {
    /// All supported window types, in the order they are offered to users.
    pub const ALL: [WindowType; 10] = [
        WindowType::None,
        WindowType::Boxcar,
        WindowType::Hann,
        WindowType::Hamming,
        WindowType::Blackman,
        WindowType::Bartlett,
        WindowType::FlatTop,
        WindowType::Tukey,
        WindowType::Gaussian,
        WindowType::Kaiser,
    ];

    /// Default parameters, used when a window is configured with an empty argument list.
    pub fn default_args(&self) -> &'static [f64] {
        match self {
            WindowType::Tukey => &[0.5],
            WindowType::Gaussian => &[7.0],
            WindowType::Kaiser => &[14.0],
            _ => &[],
        }
    }

    /// Number of numeric parameters the window takes.
    pub fn n_args(&self) -> usize {
        self.default_args().len()
    }

    /// Short help text describing the expected arguments.
    pub fn help(&self) -> &'static str {
        match self {
            WindowType::None => "No window, args ignored.",
            WindowType::Tukey => "Enter alpha [0, 1].",
            WindowType::Gaussian => "Enter standard deviation (samples) > 0.",
            WindowType::Kaiser => "Enter beta >= 0.",
            _ => "No args needed.",
        }
    }
}

impl Display for WindowType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WindowType::None => "None",
            WindowType::Boxcar => "boxcar",
            WindowType::Hann => "hann",
            WindowType::Hamming => "hamming",
            WindowType::Blackman => "blackman",
            WindowType::Bartlett => "bartlett",
            WindowType::FlatTop => "flattop",
            WindowType::Tukey => "tukey",
            WindowType::Gaussian => "gaussian",
            WindowType::Kaiser => "kaiser",
        };
        write!(f, "{name}")
    }
}

impl FromStr for WindowType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(WindowType::None),
            "boxcar" | "rectangular" => Ok(WindowType::Boxcar),
            "hann" | "hanning" => Ok(WindowType::Hann),
            "hamming" => Ok(WindowType::Hamming),
            "blackman" => Ok(WindowType::Blackman),
            "bartlett" | "triangle" => Ok(WindowType::Bartlett),
            "flattop" | "flat top" => Ok(WindowType::FlatTop),
            "tukey" => Ok(WindowType::Tukey),
            "gaussian" => Ok(WindowType::Gaussian),
            "kaiser" => Ok(WindowType::Kaiser),
            _ => Err(Error::UnknownWindow(s.to_string())),
        }
    }
}

/// A validated window configuration: the window type plus its ordered numeric parameters.
///
/// Construction is the only place where the arguments are checked, so a `WindowSpec`
/// always generates a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWindowSpec", into = "RawWindowSpec")]
pub struct WindowSpec {
    kind: WindowType,
    args: Vec<f64>,
}

/// Serialized form of [`WindowSpec`], validated again when deserialized.
#[derive(Serialize, Deserialize)]
struct RawWindowSpec {
    window_type: String,
    window_args: Vec<f64>,
}

impl TryFrom<RawWindowSpec> for WindowSpec {
    type Error = Error;

    fn try_from(raw: RawWindowSpec) -> Result<Self> {
        WindowSpec::new(raw.window_type.parse()?, raw.window_args)
    }
}

impl From<WindowSpec> for RawWindowSpec {
    fn from(spec: WindowSpec) -> Self {
        RawWindowSpec {
            window_type: spec.kind.to_string(),
            window_args: spec.args,
        }
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        WindowSpec {
            kind: WindowType::None,
            args: vec![],
        }
    }
}

impl WindowSpec {
    /// Creates a window spec, checking the argument count and domain.
    ///
    /// # Arguments
    /// - `kind`: The window type.
    /// - `args`: The window parameters. An empty list selects the defaults of the window.
    ///
    /// # Returns
    /// The validated spec, or a configuration error for a wrong argument count or a value
    /// outside the window's domain. `WindowType::None` ignores its arguments.
    pub fn new(kind: WindowType, args: Vec<f64>) -> Result<Self> {
        if kind == WindowType::None {
            return Ok(WindowSpec { kind, args: vec![] });
        }
        let args = if args.is_empty() {
            kind.default_args().to_vec()
        } else {
            args
        };
        if args.len() != kind.n_args() {
            return Err(Error::WindowArgCount {
                window: kind.to_string(),
                expected: kind.n_args(),
                got: args.len(),
            });
        }
        if let Some(bad) = args.iter().find(|a| !a.is_finite()) {
            return Err(Error::InvalidWindowArg(format!("{kind}: {bad} is not finite")));
        }
        match kind {
            WindowType::Tukey if !(0.0..=1.0).contains(&args[0]) => Err(Error::InvalidWindowArg(
                format!("tukey alpha must be in [0, 1], got {}", args[0]),
            )),
            WindowType::Gaussian if args[0] <= 0.0 => Err(Error::InvalidWindowArg(format!(
                "gaussian std must be > 0, got {}",
                args[0]
            ))),
            WindowType::Kaiser if args[0] < 0.0 => Err(Error::InvalidWindowArg(format!(
                "kaiser beta must be >= 0, got {}",
                args[0]
            ))),
            _ => Ok(WindowSpec { kind, args }),
        }
    }

    /// Parses a window name and a comma separated argument string, e.g. `("tukey", "0.3")`.
    ///
    /// A blank argument string selects the defaults.
    pub fn parse(name: &str, args: &str) -> Result<Self> {
        let kind = name.parse::<WindowType>()?;
        if kind == WindowType::None {
            return Ok(WindowSpec::default());
        }
        let args = args
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<f64>()
                    .map_err(|_| Error::InvalidWindowArg(format!("{kind}: cannot parse {p:?}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        WindowSpec::new(kind, args)
    }

    pub fn kind(&self) -> WindowType {
        self.kind
    }

    pub fn args(&self) -> &[f64] {
        &self.args
    }

    /// Generates the window values for a region of `len` samples.
    pub fn generate(&self, len: usize) -> Array1<f64> {
        if len == 0 {
            return Array1::zeros(0);
        }
        if len == 1 {
            return Array1::ones(1);
        }
        // periodic form: symmetric window of len + 1, last sample dropped
        let m = len + 1;
        let symmetric = match self.kind {
            WindowType::None | WindowType::Boxcar => return Array1::ones(len),
            WindowType::Hann => general_cosine(m, &[0.5, 0.5]),
            WindowType::Hamming => general_cosine(m, &[0.54, 0.46]),
            WindowType::Blackman => general_cosine(m, &[0.42, 0.5, 0.08]),
            WindowType::FlatTop => general_cosine(
                m,
                &[
                    0.215_578_95,
                    0.416_631_58,
                    0.277_263_158,
                    0.083_578_947,
                    0.006_947_368,
                ],
            ),
            WindowType::Bartlett => bartlett(m),
            WindowType::Tukey => tukey(m, self.args[0]),
            WindowType::Gaussian => gaussian(m, self.args[0]),
            WindowType::Kaiser => kaiser(m, self.args[0]),
        };
        symmetric.slice(s![..len]).to_owned()
    }
}

impl Display for WindowSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "{}({})", self.kind, args.join(", "))
        }
    }
}

/// Symmetric sum-of-cosines window `a0 - a1 cos(x) + a2 cos(2x) - ...` with `x = 2 pi n / (m - 1)`.
fn general_cosine(m: usize, coeffs: &[f64]) -> Array1<f64> {
    let denom = (m - 1) as f64;
    Array1::from_shape_fn(m, |n| {
        let x = 2.0 * PI * n as f64 / denom;
        coeffs
            .iter()
            .enumerate()
            .map(|(k, a)| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * a * (k as f64 * x).cos()
            })
            .sum()
    })
}

fn bartlett(m: usize) -> Array1<f64> {
    let denom = (m - 1) as f64;
    Array1::from_shape_fn(m, |n| {
        let n = n as f64;
        if n <= denom / 2.0 {
            2.0 * n / denom
        } else {
            2.0 - 2.0 * n / denom
        }
    })
}

fn tukey(m: usize, alpha: f64) -> Array1<f64> {
    if alpha <= 0.0 {
        return Array1::ones(m);
    }
    if alpha >= 1.0 {
        return general_cosine(m, &[0.5, 0.5]);
    }
    let denom = alpha * (m - 1) as f64;
    let width = (denom / 2.0).floor() as usize;
    Array1::from_shape_fn(m, |n| {
        let x = n as f64;
        if n <= width {
            0.5 * (1.0 + (PI * (-1.0 + 2.0 * x / denom)).cos())
        } else if n < m - width - 1 {
            1.0
        } else {
            0.5 * (1.0 + (PI * (-2.0 / alpha + 1.0 + 2.0 * x / denom)).cos())
        }
    })
}

fn gaussian(m: usize, std: f64) -> Array1<f64> {
    let center = (m - 1) as f64 / 2.0;
    Array1::from_shape_fn(m, |n| {
        let x = n as f64 - center;
        (-x * x / (2.0 * std * std)).exp()
    })
}

fn kaiser(m: usize, beta: f64) -> Array1<f64> {
    let denom = (m - 1) as f64;
    let norm = bessel_i0e(beta);
    Array1::from_shape_fn(m, |n| {
        let r = 2.0 * n as f64 / denom - 1.0;
        let s = (1.0 - r * r).max(0.0).sqrt();
        // I0(beta s) / I0(beta) in scaled form, finite for any beta
        bessel_i0e(beta * s) / norm * (beta * (s - 1.0)).exp()
    })
}

/// Above this argument the scaled Bessel function switches to its asymptotic expansion.
const I0_SERIES_LIMIT: f64 = 500.0;

/// Exponentially scaled modified Bessel function `exp(-x) I0(x)` for `x >= 0`.
fn bessel_i0e(x: f64) -> f64 {
    if x <= I0_SERIES_LIMIT {
        bessel_i0(x) * (-x).exp()
    } else {
        bessel_i0e_asymptotic(x)
    }
}

/// Modified Bessel function of the first kind, order zero (power series).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > 1e-17 * sum {
        term *= (half / k) * (half / k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Large argument expansion `exp(-x) I0(x) ~ (1 + 1/(8x) + 9/(2 (8x)^2) + ...) / sqrt(2 pi x)`.
fn bessel_i0e_asymptotic(x: f64) -> f64 {
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..12 {
        let odd = (2 * k - 1) as f64;
        term *= odd * odd / (k as f64 * 8.0 * x);
        sum += term;
    }
    sum / (2.0 * PI * x).sqrt()
}

/// Result of [`apply_window`].
#[derive(Debug, Clone)]
pub struct Windowed {
    /// The windowed signal, same length as the input.
    pub signal: Array1<Complex64>,
    /// The window values, one per sample of the clamped region.
    pub window: Array1<f64>,
    pub start_idx: usize,
    pub stop_idx: usize,
}

/// Applies a window to the region `[start_idx, stop_idx)` of a complex time-domain signal.
///
/// # Arguments
/// - `time`: The time axis (ps), same length as `signal`.
/// - `signal`: The complex signal.
/// - `spec`: The window to apply.
/// - `start_idx`: Start of the region, clamped to `[0, len]`.
/// - `stop_idx`: End of the region (exclusive), defaults to `len`, clamped to `[start_idx, len]`.
/// - `zero_outside`: If `true` samples outside the region are set to zero, otherwise they are
///   passed through unchanged.
///
/// # Returns
/// The windowed signal, the window values and the clamped indices. An empty region returns
/// the unmodified signal and an empty window.
pub fn apply_window(
    time: &Array1<f64>,
    signal: &Array1<Complex64>,
    spec: &WindowSpec,
    start_idx: usize,
    stop_idx: Option<usize>,
    zero_outside: bool,
) -> Windowed {
    debug_assert_eq!(time.len(), signal.len());
    let len = signal.len();
    let start_idx = start_idx.min(len);
    let stop_idx = stop_idx.unwrap_or(len).min(len).max(start_idx);
    let region = stop_idx - start_idx;

    if region == 0 {
        return Windowed {
            signal: signal.clone(),
            window: Array1::zeros(0),
            start_idx,
            stop_idx,
        };
    }

    let window = spec.generate(region);
    let mut out = if zero_outside {
        Array1::zeros(len)
    } else {
        signal.clone()
    };
    out.slice_mut(s![start_idx..stop_idx])
        .iter_mut()
        .zip(signal.slice(s![start_idx..stop_idx]).iter())
        .zip(window.iter())
        .for_each(|((o, x), w)| *o = *x * *w);

    Windowed {
        signal: out,
        window,
        start_idx,
        stop_idx,
    }
}
