//! The measurement store: the loaded traces, the shared time axis and the reference selection.

use crate::data_container::Trace;
use crate::error::Result;
use crate::io::CsvLoader;
use ndarray::Array1;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Absolute tolerance for comparing a time axis against the established one.
pub const AXIS_TOLERANCE: f64 = 1e-12;

const AXIS_MISMATCH_REASON: &str = "Time axis mismatch (does not match first dataset)";

/// Turns a file into a [`Trace`].
pub trait TraceLoader {
    fn load_trace(&self, path: &Path) -> Result<Trace>;
}

/// Result of loading one candidate file.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    SkippedAxisMismatch,
    SkippedParseFailure(String),
}

impl LoadOutcome {
    /// Human readable skip reason, `None` for a loaded trace.
    pub fn reason(&self) -> Option<String> {
        match self {
            LoadOutcome::Loaded => None,
            LoadOutcome::SkippedAxisMismatch => Some(AXIS_MISMATCH_REASON.to_string()),
            LoadOutcome::SkippedParseFailure(detail) => Some(detail.clone()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded)
    }
}

impl Display for LoadOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.reason() {
            None => write!(f, "loaded"),
            Some(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Per-file outcomes of a [`MeasurementStore::load`] call, in input order.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub outcomes: Vec<(PathBuf, LoadOutcome)>,
}

impl LoadReport {
    /// The files that were not loaded, with the reason.
    pub fn skipped(&self) -> Vec<(PathBuf, String)> {
        self.outcomes
            .iter()
            .filter_map(|(path, outcome)| outcome.reason().map(|r| (path.clone(), r)))
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_loaded()).count()
    }
}

/// Whether a canonical time axis has been fixed by the first loaded trace.
#[derive(Debug, Clone, Default)]
pub enum AxisState {
    #[default]
    Empty,
    Established(Array1<f64>),
}

/// Ordered collection of traces sharing one time axis, with an optional reference.
#[derive(Debug, Default)]
pub struct MeasurementStore {
    axis: AxisState,
    traces: Vec<Trace>,
    reference_identity: Option<String>,
}

impl MeasurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads CSV trace files. See [`MeasurementStore::load_with`].
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> LoadReport {
        self.load_with(paths, &CsvLoader)
    }

    /// Loads every path with `loader` and appends the traces that match the shared time axis.
    ///
    /// The first successfully parsed trace establishes the axis. Files that fail to parse or
    /// whose axis differs are skipped and reported, the remaining files are still processed.
    pub fn load_with<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        loader: &impl TraceLoader,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        for path in paths {
            let path = path.as_ref();
            let outcome = match loader.load_trace(path) {
                Ok(trace) => self.insert(trace),
                Err(err) => {
                    log::warn!("failed to load {:?}: {}", path, err);
                    LoadOutcome::SkippedParseFailure(err.to_string())
                }
            };
            report.outcomes.push((path.to_path_buf(), outcome));
        }
        log::info!(
            "loaded {} of {} file(s), {} trace(s) in store",
            report.loaded_count(),
            paths.len(),
            self.traces.len()
        );
        report
    }

    /// Appends an already parsed trace if its time axis matches the established one.
    pub fn insert(&mut self, trace: Trace) -> LoadOutcome {
        match &self.axis {
            AxisState::Empty => {
                log::debug!(
                    "time axis established by {} ({} samples)",
                    trace.name(),
                    trace.len()
                );
                self.axis = AxisState::Established(trace.time().clone());
            }
            AxisState::Established(axis) => {
                if !axis_matches(axis, trace.time()) {
                    log::warn!("{}: {}", trace.identity(), AXIS_MISMATCH_REASON);
                    return LoadOutcome::SkippedAxisMismatch;
                }
            }
        }
        log::info!("opened {:?}", trace.identity());
        self.traces.push(trace);
        LoadOutcome::Loaded
    }

    /// Selects the reference trace by identity. The identity is not validated here; an
    /// identity that does not resolve simply means "no reference".
    pub fn set_reference(&mut self, identity: Option<&str>) {
        log::info!("reference set to {:?}", identity);
        self.reference_identity = identity.map(str::to_string);
    }

    pub fn reference_identity(&self) -> Option<&str> {
        self.reference_identity.as_deref()
    }

    /// The current reference trace, if the selection resolves to a loaded trace.
    pub fn get_reference(&self) -> Option<&Trace> {
        self.reference_identity
            .as_deref()
            .and_then(|identity| self.get(identity))
    }

    pub fn get(&self, identity: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.identity() == identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut Trace> {
        self.traces.iter_mut().find(|t| t.identity() == identity)
    }

    pub fn all(&self) -> &[Trace] {
        &self.traces
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Trace> {
        self.traces.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// The canonical time axis, `None` while the store is empty.
    pub fn axis(&self) -> Option<&Array1<f64>> {
        match &self.axis {
            AxisState::Empty => None,
            AxisState::Established(axis) => Some(axis),
        }
    }

    /// Drops all traces, the time axis and the reference selection.
    pub fn clear(&mut self) {
        self.traces.clear();
        self.axis = AxisState::Empty;
        self.reference_identity = None;
        log::info!("store cleared");
    }
}

fn axis_matches(axis: &Array1<f64>, time: &Array1<f64>) -> bool {
    axis.len() == time.len()
        && axis
            .iter()
            .zip(time.iter())
            .all(|(a, t)| (a - t).abs() <= AXIS_TOLERANCE)
}
