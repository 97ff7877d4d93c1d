//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a trace file with a header row and `time,real,imag` rows.
pub fn write_trace_csv(dir: &Path, name: &str, rows: &[(f64, f64, f64)]) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    writeln!(file, "Time (ps),Signal real,Signal imag").unwrap();
    for (t, re, im) in rows {
        writeln!(file, "{},{},{}", t, re, im).unwrap();
    }
    path
}

/// Gaussian pulse of width 0.1 ps on a uniform axis, real valued.
pub fn pulse_rows(n: usize, dt: f64, t0: f64, amplitude: f64) -> Vec<(f64, f64, f64)> {
    (0..n)
        .map(|i| {
            let t = i as f64 * dt;
            (t, amplitude * (-((t - t0) / 0.1).powi(2)).exp(), 0.0)
        })
        .collect()
}

/// Header line of a CSV file.
pub fn header(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}
