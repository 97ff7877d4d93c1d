//! Error type shared by the processing pipeline, the measurement store and the file I/O layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the toolkit.
///
/// Configuration errors are raised synchronously by the component that received the bad
/// input and never modify cached results. Load errors are reported per file by the
/// [`MeasurementStore`](crate::store::MeasurementStore) rather than propagated.
#[derive(Error, Debug)]
pub enum Error {
    /// The window name is not part of the supported family.
    #[error("unknown window type: {0:?}")]
    UnknownWindow(String),

    /// A window received the wrong number of parameters.
    #[error("{window} expects {expected} arg(s), got {got}")]
    WindowArgCount {
        window: String,
        expected: usize,
        got: usize,
    },

    /// A window parameter is outside its domain.
    #[error("invalid window argument: {0}")]
    InvalidWindowArg(String),

    /// A time bound could not be parsed.
    #[error("invalid time bound {0:?}")]
    InvalidTimeBound(String),

    /// The trace is too short to derive a sampling interval.
    #[error("trace has {0} sample(s), at least 2 are required")]
    TooFewSamples(usize),

    /// The unwrap method name is not recognized.
    #[error("unknown unwrap method: {0:?}")]
    UnknownUnwrapMethod(String),

    /// Two arrays that must be aligned bin by bin are not.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Time axis and signal violate the trace invariants.
    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    /// A trace file was read but its content is malformed.
    #[error("malformed trace file {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` for errors caused by invalid processing parameters.
    ///
    /// These are always recoverable: the caller can retry with corrected input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownWindow(_)
                | Error::WindowArgCount { .. }
                | Error::InvalidWindowArg(_)
                | Error::InvalidTimeBound(_)
                | Error::UnknownUnwrapMethod(_)
                | Error::TooFewSamples(_)
                | Error::LengthMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
