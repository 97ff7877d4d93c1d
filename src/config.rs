//! Processing configuration and its JSON export document.

use crate::data_container::UnwrapMethod;
use crate::error::{Error, Result};
use crate::unwrap::DEFAULT_MAG_THRESHOLD;
use crate::window::WindowSpec;
use chrono::Utc;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "THz-TDS Toolkit";

/// Optional start/stop time (ps) of the FFT window region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ps: Option<f64>,
    pub stop_ps: Option<f64>,
}

impl TimeWindow {
    /// Parses the bounds from text. Blank text leaves a bound unset.
    pub fn parse(start: &str, stop: &str) -> Result<Self> {
        Ok(TimeWindow {
            start_ps: parse_bound(start)?,
            stop_ps: parse_bound(stop)?,
        })
    }

    /// Snaps the bounds to indices on `axis`.
    ///
    /// The start uses a left search (first sample `>= start`), the stop a right search
    /// (one past the last sample `<= stop`); both lie in `[0, axis.len()]`. An unset start
    /// maps to 0 and an unset stop to `None` (end of the trace).
    pub fn to_indices(&self, axis: &Array1<f64>) -> (usize, Option<usize>) {
        let start_idx = self
            .start_ps
            .map(|t| search_sorted(axis, t, Side::Left))
            .unwrap_or(0);
        let stop_idx = self.stop_ps.map(|t| search_sorted(axis, t, Side::Right));
        (start_idx, stop_idx)
    }
}

fn parse_bound(text: &str) -> Result<Option<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(Error::InvalidTimeBound(text.to_string())),
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

fn search_sorted(axis: &Array1<f64>, t: f64, side: Side) -> usize {
    let values = axis.as_slice();
    match (values, side) {
        (Some(v), Side::Left) => v.partition_point(|x| *x < t),
        (Some(v), Side::Right) => v.partition_point(|x| *x <= t),
        (None, Side::Left) => axis.iter().take_while(|x| **x < t).count(),
        (None, Side::Right) => axis.iter().take_while(|x| **x <= t).count(),
    }
}

/// All parameters of one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub window: WindowSpec,
    pub time_window: TimeWindow,
    pub unwrap_method: UnwrapMethod,
    pub mag_threshold: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            window: WindowSpec::default(),
            time_window: TimeWindow::default(),
            unwrap_method: UnwrapMethod::Blind,
            mag_threshold: DEFAULT_MAG_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

/// The `config` section of the export document, in the textual form the values were entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedConfig {
    pub window_type: String,
    pub window_args: String,
    pub start_time_ps: String,
    pub stop_time_ps: String,
    pub unwrap_method: String,
}

/// JSON document written by the configuration export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigExport {
    pub app: AppInfo,
    pub page: String,
    pub exported_at: String,
    pub config: ExportedConfig,
}

impl ConfigExport {
    /// Builds the export document for `config`, stamped with the current UTC time.
    pub fn new(page: &str, config: &ProcessingConfig) -> Self {
        let fmt_bound = |b: Option<f64>| b.map(|v| v.to_string()).unwrap_or_default();
        let window_args = config
            .window
            .args()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        ConfigExport {
            app: AppInfo {
                name: APP_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            page: page.to_string(),
            exported_at: Utc::now().to_rfc3339(),
            config: ExportedConfig {
                window_type: config.window.kind().to_string(),
                window_args,
                start_time_ps: fmt_bound(config.time_window.start_ps),
                stop_time_ps: fmt_bound(config.time_window.stop_ps),
                unwrap_method: config.unwrap_method.to_string(),
            },
        }
    }
}
