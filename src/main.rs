use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use thz_tds_toolkit::config::ConfigExport;
use thz_tds_toolkit::io::{save_config_json, save_phase_csv, save_spectrum_csv, save_time_domain_csv};
use thz_tds_toolkit::{pipeline, MeasurementStore, ProcessingConfig, TimeWindow, Trace, WindowSpec};

const EXPORT_PAGE: &str = "Phase";

/// Windowed FFT, reference normalization and phase unwrapping of THz-TDS traces.
#[derive(Parser, Debug)]
#[command(name = "thz-tds", version, about)]
struct Args {
    /// CSV trace files (header row, then time [ps], real, imag columns)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Trace used as reference for the normalization, loaded if not among FILES
    #[arg(short, long)]
    reference: Option<PathBuf>,

    /// Window type: None, boxcar, hann, hamming, blackman, bartlett, flattop, tukey, gaussian, kaiser
    #[arg(short, long, default_value = "None")]
    window: String,

    /// Comma separated window parameters, blank for the defaults
    #[arg(long, default_value = "")]
    window_args: String,

    /// Start of the window region in ps
    #[arg(long, default_value = "")]
    start_ps: String,

    /// End of the window region in ps
    #[arg(long, default_value = "")]
    stop_ps: String,

    /// Unwrap method for the normalized phase: blind or informed
    #[arg(short, long, default_value = "blind")]
    unwrap: String,

    /// Relative magnitude threshold for the informed unwrap fit
    #[arg(long, default_value_t = thz_tds_toolkit::unwrap::DEFAULT_MAG_THRESHOLD)]
    mag_threshold: f64,

    /// Directory for the exported CSV files
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Write the processing configuration to this JSON file
    #[arg(long)]
    export_config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn processing_config(&self) -> anyhow::Result<ProcessingConfig> {
        if !(self.mag_threshold.is_finite() && self.mag_threshold >= 0.0) {
            bail!("magnitude threshold must be >= 0, got {}", self.mag_threshold);
        }
        Ok(ProcessingConfig {
            window: WindowSpec::parse(&self.window, &self.window_args)?,
            time_window: TimeWindow::parse(&self.start_ps, &self.stop_ps)?,
            unwrap_method: self.unwrap.parse()?,
            mag_threshold: self.mag_threshold,
        })
    }
}

fn export_trace(trace: &Trace, dir: &Path) -> anyhow::Result<()> {
    let file = |suffix: &str| dir.join(format!("{}_{}.csv", trace.name(), suffix));
    save_time_domain_csv(trace, &file("time"))?;
    let results = trace.results();
    if let Some(s) = results.spectrum() {
        save_spectrum_csv(&s.freqs, &s.spectrum, &file("spectrum"))?;
    }
    if let Some(n) = results.normalized_spectrum() {
        save_spectrum_csv(&n.freqs, &n.spectrum, &file("normalized_spectrum"))?;
    }
    if let Some(p) = results.phase() {
        save_phase_csv(p, &file("phase"))?;
    }
    if let Some(p) = results.normalized_phase() {
        save_phase_csv(p, &file("normalized_phase"))?;
    }
    log::debug!("exported {} to {:?}", trace.name(), dir);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.processing_config()?;

    let mut files = args.files.clone();
    if let Some(reference) = &args.reference {
        if !files.contains(reference) {
            files.insert(0, reference.clone());
        }
    }

    let mut store = MeasurementStore::new();
    let report = store.load(files.as_slice());
    for (path, reason) in report.skipped() {
        eprintln!("skipped {}: {}", path.display(), reason);
    }
    if store.is_empty() {
        bail!("no trace could be loaded");
    }

    if let Some(reference) = &args.reference {
        let identity = reference.to_string_lossy();
        store.set_reference(Some(&*identity));
        if store.get_reference().is_none() {
            log::warn!("reference {:?} was not loaded, normalization disabled", identity);
        }
    }

    pipeline::run(&mut store, &config).context("processing failed")?;

    for trace in store.all() {
        let results = trace.results();
        let peak = results
            .spectrum()
            .map(|s| format!("{:.3} ps", s.peak_time_ps))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} peak {:>12}  {:?}",
            trace.name(),
            peak,
            results.phase_state()
        );
    }

    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {:?}", dir))?;
        for trace in store.all() {
            export_trace(trace, dir).with_context(|| format!("exporting {}", trace.name()))?;
        }
    }

    if let Some(path) = &args.export_config {
        save_config_json(&ConfigExport::new(EXPORT_PAGE, &config), path)
            .with_context(|| format!("writing {:?}", path))?;
    }
    Ok(())
}
