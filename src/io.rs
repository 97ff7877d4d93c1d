//! CSV trace loading and the CSV/JSON exporters.

use crate::config::ConfigExport;
use crate::data_container::{PhaseResult, Trace};
use crate::error::{Error, Result};
use crate::math_tools::compute_mag;
use crate::store::TraceLoader;
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array1;
use num_complex::Complex64;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Loads traces from CSV files with a header row and `time, real, imag` as the first three
/// columns. Header names are ignored, further columns are allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvLoader;

impl TraceLoader for CsvLoader {
    fn load_trace(&self, path: &Path) -> Result<Trace> {
        load_trace_csv(path)
    }
}

/// Reads one trace file. The display name is the file stem, the identity the full path.
pub fn load_trace_csv(path: &Path) -> Result<Trace> {
    let parse_error = |reason: String| Error::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut time = vec![];
    let mut real = vec![];
    let mut imag = vec![];
    for (i, result) in rdr.records().enumerate() {
        let row = result.map_err(|e| parse_error(e.to_string()))?;
        if row.len() < 3 {
            return Err(parse_error(format!(
                "row {} has {} column(s), expected at least 3",
                i + 1,
                row.len()
            )));
        }
        let mut values = [0.0; 3];
        for (value, field) in values.iter_mut().zip(row.iter()) {
            *value = field.trim().parse::<f64>().map_err(|_| {
                parse_error(format!("row {}: {:?} is not a number", i + 1, field))
            })?;
        }
        time.push(values[0]);
        real.push(values[1]);
        imag.push(values[2]);
    }
    if time.is_empty() {
        return Err(parse_error("no data rows".to_string()));
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let identity = path.to_string_lossy().into_owned();
    Trace::from_columns(name, identity, time, real, imag).map_err(|e| match e {
        Error::InvalidTrace(reason) => parse_error(reason),
        other => other,
    })
}

/// Writes the raw trace as `time,real,imag`.
pub fn save_time_domain_csv(trace: &Trace, path: &Path) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(["time", "real", "imag"])?;
    for (t, x) in trace.time().iter().zip(trace.signal().iter()) {
        wtr.write_record(&[t.to_string(), x.re.to_string(), x.im.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a spectrum as `freq,fft_real,fft_imag,fft_mag`.
pub fn save_spectrum_csv(
    freqs: &Array1<f64>,
    spectrum: &Array1<Complex64>,
    path: &Path,
) -> Result<()> {
    let (mag, _) = compute_mag(spectrum);
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(["freq", "fft_real", "fft_imag", "fft_mag"])?;
    for ((f, x), m) in freqs.iter().zip(spectrum.iter()).zip(mag.iter()) {
        wtr.write_record(&[
            f.to_string(),
            x.re.to_string(),
            x.im.to_string(),
            m.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a phase as `freq,phase,unwrapped_phase,unwrap_method`.
pub fn save_phase_csv(phase: &PhaseResult, path: &Path) -> Result<()> {
    let method = phase.method.to_string();
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(["freq", "phase", "unwrapped_phase", "unwrap_method"])?;
    for ((f, p), u) in phase
        .freqs
        .iter()
        .zip(phase.phase.iter())
        .zip(phase.unwrapped_phase.iter())
    {
        wtr.write_record(&[f.to_string(), p.to_string(), u.to_string(), method.clone()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the processing configuration document as pretty printed JSON.
pub fn save_config_json(export: &ConfigExport, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, export)?;
    log::info!("exported configuration to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_columns_are_positional() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "sample_01.csv",
            "Time/ps,Re,Im,extra\n0.0,1.0,0.5,9\n0.1,2.0,-0.5,9\n",
        );
        let trace = load_trace_csv(&path).unwrap();
        assert_eq!(trace.name(), "sample_01");
        assert_eq!(trace.identity(), path.to_string_lossy());
        assert_eq!(trace.time().to_vec(), vec![0.0, 0.1]);
        assert_eq!(trace.signal()[1].re, 2.0);
        assert_eq!(trace.signal()[1].im, -0.5);
    }

    #[test]
    fn test_malformed_files_are_parse_errors() {
        let dir = tempdir().unwrap();
        let cases = [
            ("empty.csv", "time,real,imag\n"),
            ("text.csv", "time,real,imag\n0.0,abc,0.0\n"),
            ("ragged.csv", "time,real,imag\n0.0,1.0,0.0\n0.1,1.0\n"),
            ("decreasing.csv", "time,real,imag\n0.1,1.0,0.0\n0.0,1.0,0.0\n"),
        ];
        for (name, content) in cases {
            let path = write_file(dir.path(), name, content);
            let res = load_trace_csv(&path);
            assert!(matches!(res, Err(Error::Parse { .. })), "{name}");
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_trace_csv(&dir.path().join("nope.csv")).is_err());
    }
}
