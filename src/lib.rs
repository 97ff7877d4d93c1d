//! Processing of terahertz time-domain spectroscopy (THz-TDS) traces: windowing, FFT,
//! normalization against a reference trace and phase unwrapping.

pub mod config;
pub mod data_container;
pub mod error;
pub mod io;
pub mod math_tools;
pub mod pipeline;
pub mod spectrum;
pub mod store;
pub mod unwrap;
pub mod window;

pub use crate::config::{ProcessingConfig, TimeWindow};
pub use crate::data_container::{PhaseResult, SpectrumResult, Trace, UnwrapMethod};
pub use crate::error::{Error, Result};
pub use crate::store::{LoadOutcome, LoadReport, MeasurementStore};
pub use crate::window::{WindowSpec, WindowType};
