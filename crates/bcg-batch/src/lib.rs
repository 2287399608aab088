//! Multi-unit dataset driver.
//!
//! A unit is one (subject, recording) pair: a raw BCG file under
//! `<data-root>/<subject>/BCG/` and its reference heart-rate file under
//! `<data-root>/<subject>/Reference/RR/`, matched by the first eleven
//! characters of the file stem (`SS_YYYYMMDD`). Units share no state and
//! run in parallel; a unit failure is recorded with its stage and the
//! batch moves on. A unit's outputs are staged in a scratch directory and
//! published with a rename only after every stage succeeded, so a failed
//! unit never leaves partial files behind.

use anyhow::{Context, Result};
use bcg_lib::detectors::jpeak::{EdgeMode, HeightThreshold, JPeakConfig};
use bcg_lib::error::BcgError;
use bcg_lib::filters::{band_pass_filter, BandpassConfig, FilterProfile};
use bcg_lib::io::csv as csv_io;
use bcg_lib::metrics::agreement::{self, Agreement};
use bcg_lib::metrics::rate::{estimate_windowed_rates, RateEstimatorConfig};
use bcg_lib::resample::{reconstruct_timestamps, resample};
use bcg_lib::signal::{RatePoint, RateSeries, SampleSeries};
use bcg_lib::sync::synchronize;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Fully enumerated pipeline options; the TOML file may omit any field and
/// gets the documented default. There are no other configuration inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Resample target rate in Hz.
    #[serde(default = "default_fs_new")]
    pub fs_new: f64,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,
    /// Named cutoff pair, `cardiac` (alias `bcg`).
    #[serde(default = "default_filter_profile")]
    pub filter_profile: String,
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,
    #[serde(default = "default_min_peak_distance_s")]
    pub min_peak_distance_s: f64,
    #[serde(default = "default_prominence_fraction")]
    pub prominence_fraction: f64,
    /// Percentile height threshold, used unless `min_peak_height` is set.
    #[serde(default = "default_min_peak_height_percentile")]
    pub min_peak_height_percentile: f64,
    /// Absolute height threshold override.
    #[serde(default)]
    pub min_peak_height: Option<f64>,
}

fn default_fs_new() -> f64 {
    50.0
}
fn default_window_seconds() -> f64 {
    10.0
}
fn default_filter_profile() -> String {
    "cardiac".into()
}
fn default_filter_order() -> usize {
    4
}
fn default_min_peak_distance_s() -> f64 {
    0.5
}
fn default_prominence_fraction() -> f64 {
    0.05
}
fn default_min_peak_height_percentile() -> f64 {
    90.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fs_new: default_fs_new(),
            window_seconds: default_window_seconds(),
            filter_profile: default_filter_profile(),
            filter_order: default_filter_order(),
            min_peak_distance_s: default_min_peak_distance_s(),
            prominence_fraction: default_prominence_fraction(),
            min_peak_height_percentile: default_min_peak_height_percentile(),
            min_peak_height: None,
        }
    }
}

impl PipelineConfig {
    pub fn bandpass(&self) -> Result<BandpassConfig, BcgError> {
        let profile = FilterProfile::from_name(&self.filter_profile)?;
        let mut cfg = BandpassConfig::from_profile(profile);
        cfg.order = self.filter_order;
        Ok(cfg)
    }

    pub fn detector(&self) -> JPeakConfig {
        JPeakConfig {
            min_height: match self.min_peak_height {
                Some(v) => HeightThreshold::Absolute(v),
                None => HeightThreshold::Percentile(self.min_peak_height_percentile),
            },
            min_distance_s: self.min_peak_distance_s,
            prominence_fraction: self.prominence_fraction,
            edge: EdgeMode::Rising,
        }
    }

    pub fn estimator(&self) -> RateEstimatorConfig {
        RateEstimatorConfig {
            window_seconds: self.window_seconds,
            detector: self.detector(),
        }
    }
}

/// Read a pipeline config from a TOML file.
pub fn read_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

/// One processable (subject, recording) pair.
#[derive(Debug, Clone)]
pub struct Unit {
    pub subject: String,
    pub prefix: String,
    pub bcg_path: PathBuf,
    pub rr_path: PathBuf,
}

/// Walk the dataset and pair BCG recordings with their RR references.
pub fn find_units(data_root: &Path) -> Result<Vec<Unit>> {
    let mut subjects: Vec<PathBuf> = fs::read_dir(data_root)
        .with_context(|| format!("reading data root {}", data_root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    subjects.sort();

    let mut units = Vec::new();
    for subject_dir in subjects {
        let subject = match subject_dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let bcg_dir = subject_dir.join("BCG");
        let rr_dir = subject_dir.join("Reference").join("RR");
        if !bcg_dir.is_dir() || !rr_dir.is_dir() {
            continue;
        }
        let bcg_files = csv_files(&bcg_dir)?;
        let rr_files = csv_files(&rr_dir)?;
        let rr_map: HashMap<String, PathBuf> = rr_files
            .iter()
            .filter_map(|p| stem_prefix(p).map(|key| (key, p.clone())))
            .collect();
        for bcg_path in bcg_files {
            let Some(prefix) = stem_prefix(&bcg_path) else {
                continue;
            };
            match rr_map.get(&prefix) {
                Some(rr_path) => units.push(Unit {
                    subject: subject.clone(),
                    prefix,
                    bcg_path,
                    rr_path: rr_path.clone(),
                }),
                None => log::warn!(
                    "no RR match for {} (prefix {prefix})",
                    bcg_path.display()
                ),
            }
        }
    }
    Ok(units)
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn stem_prefix(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.get(..11).unwrap_or(stem).to_string())
}

/// Outcome of one successfully processed unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub subject: String,
    pub prefix: String,
    /// Number of estimated windows.
    pub windows: usize,
    /// Rows surviving exact-timestamp synchronization.
    pub matched: usize,
    /// Synced rows excluded from evaluation because either side was
    /// undefined.
    pub dropped_undefined: usize,
    pub agreement: Agreement,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub subject: String,
    pub prefix: String,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub completed: Vec<UnitReport>,
    pub failed: Vec<UnitFailure>,
}

struct StageError {
    stage: &'static str,
    source: anyhow::Error,
}

trait WithStage<T> {
    fn stage(self, stage: &'static str) -> std::result::Result<T, StageError>;
}

impl<T, E> WithStage<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn stage(self, stage: &'static str) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            source: e.into(),
        })
    }
}

/// Process one unit into `<results-root>/<subject>/<prefix>/`.
///
/// All outputs go to a staging directory first and are published atomically
/// on success; any failure removes the staging directory and reports the
/// failing stage.
pub fn run_unit(
    unit: &Unit,
    results_root: &Path,
    config: &PipelineConfig,
) -> std::result::Result<UnitReport, UnitFailure> {
    let fail = |stage: &str, message: String| UnitFailure {
        subject: unit.subject.clone(),
        prefix: unit.prefix.clone(),
        stage: stage.to_string(),
        message,
    };

    let subject_dir = results_root.join(&unit.subject);
    let final_dir = subject_dir.join(&unit.prefix);
    let staging = subject_dir.join(format!("{}.partial", unit.prefix));
    if staging.exists() {
        if let Err(e) = fs::remove_dir_all(&staging) {
            return Err(fail("prepare", e.to_string()));
        }
    }
    if let Err(e) = fs::create_dir_all(&staging) {
        return Err(fail("prepare", e.to_string()));
    }

    match pipeline(unit, &staging, config) {
        Ok(report) => {
            if final_dir.exists() {
                if let Err(e) = fs::remove_dir_all(&final_dir) {
                    let _ = fs::remove_dir_all(&staging);
                    return Err(fail("publish", e.to_string()));
                }
            }
            if let Err(e) = fs::rename(&staging, &final_dir) {
                let _ = fs::remove_dir_all(&staging);
                return Err(fail("publish", e.to_string()));
            }
            Ok(report)
        }
        Err(err) => {
            let _ = fs::remove_dir_all(&staging);
            Err(fail(err.stage, format!("{:#}", err.source)))
        }
    }
}

fn pipeline(
    unit: &Unit,
    out_dir: &Path,
    config: &PipelineConfig,
) -> std::result::Result<UnitReport, StageError> {
    let prefix = &unit.prefix;

    let raw = csv_io::read_raw_bcg(&unit.bcg_path).stage("load")?;
    let series = reconstruct_timestamps(&raw.values, raw.t0, raw.fs).stage("timestamps")?;
    let resampled = resample(&series, config.fs_new).stage("resample")?;
    csv_io::write_resampled_bcg(&out_dir.join(format!("{prefix}_bcg_resampled.csv")), &resampled)
        .stage("resample")?;

    let bandpass = config.bandpass().stage("filter")?;
    let values = band_pass_filter(&resampled.values, resampled.fs, &bandpass).stage("filter")?;
    let filtered = SampleSeries {
        fs: resampled.fs,
        timestamps: resampled.timestamps.clone(),
        values,
    };

    let rates = estimate_windowed_rates(&filtered, &config.estimator()).stage("estimate")?;
    csv_io::write_rate_series(&out_dir.join(format!("{prefix}_bcg_hr.csv")), &rates)
        .stage("estimate")?;
    csv_io::write_rate_series_formatted(
        &out_dir.join(format!("{prefix}_bcg_hr_ts_fmt.csv")),
        &rates,
    )
    .stage("format")?;

    let reference = csv_io::read_rate_series_formatted(&unit.rr_path).stage("reference")?;
    // The formatted step aligned the estimate to whole seconds on disk; the
    // in-memory copy gets the same truncation before exact matching.
    let estimate = truncate_to_seconds(&rates);
    let pair = synchronize(&estimate, &reference);
    if pair.is_empty() {
        return Err(BcgError::EmptyOverlap).stage("synchronize");
    }
    csv_io::write_rate_series_formatted(&out_dir.join(format!("{prefix}_hr_sync.csv")), &pair.a)
        .stage("synchronize")?;
    csv_io::write_rate_series_formatted(&out_dir.join(format!("{prefix}_rr_sync.csv")), &pair.b)
        .stage("synchronize")?;
    csv_io::write_merged_comparison(
        &out_dir.join(format!("{prefix}_comparison.csv")),
        &pair.b,
        &pair.a,
    )
    .stage("synchronize")?;

    let (ref_values, est_values, dropped) = paired_defined(&pair.b, &pair.a);
    if dropped > 0 {
        log::warn!(
            "{}/{}: excluded {dropped} undefined pair(s) from evaluation",
            unit.subject,
            unit.prefix
        );
    }
    let report = agreement::evaluate(&ref_values, &est_values).stage("evaluate")?;
    let file = fs::File::create(out_dir.join(format!("{prefix}_agreement.json")))
        .stage("evaluate")?;
    serde_json::to_writer_pretty(file, &report).stage("evaluate")?;

    Ok(UnitReport {
        subject: unit.subject.clone(),
        prefix: unit.prefix.clone(),
        windows: rates.len(),
        matched: pair.len(),
        dropped_undefined: dropped,
        agreement: report,
    })
}

fn truncate_to_seconds(rates: &RateSeries) -> RateSeries {
    RateSeries {
        points: rates
            .points
            .iter()
            .map(|p| RatePoint {
                timestamp: p.timestamp - p.timestamp.rem_euclid(1000),
                bpm: p.bpm,
            })
            .collect(),
    }
}

/// Split a synced pair into parallel value vectors, keeping only rows where
/// both sides are defined.
fn paired_defined(reference: &RateSeries, estimate: &RateSeries) -> (Vec<f64>, Vec<f64>, usize) {
    let mut ref_values = Vec::new();
    let mut est_values = Vec::new();
    let mut dropped = 0usize;
    for (r, e) in reference.points.iter().zip(&estimate.points) {
        match (r.bpm, e.bpm) {
            (Some(rv), Some(ev)) => {
                ref_values.push(rv);
                est_values.push(ev);
            }
            _ => dropped += 1,
        }
    }
    (ref_values, est_values, dropped)
}

/// Run every unit under `data_root`, writing to `results_root`.
///
/// Units are independent and processed in parallel; one bad recording is
/// recorded in the summary and never halts the batch.
pub fn run_batch(
    data_root: &Path,
    results_root: &Path,
    config: &PipelineConfig,
) -> Result<BatchSummary> {
    let units = find_units(data_root)?;
    if units.is_empty() {
        log::warn!("no BCG/RR pairs found under {}", data_root.display());
    }
    fs::create_dir_all(results_root)
        .with_context(|| format!("creating results root {}", results_root.display()))?;

    let results: Vec<_> = units
        .par_iter()
        .map(|unit| run_unit(unit, results_root, config))
        .collect();

    let mut summary = BatchSummary {
        completed: Vec::new(),
        failed: Vec::new(),
    };
    for result in results {
        match result {
            Ok(report) => {
                log::info!(
                    "completed {}/{}: {} windows, {} matched, MAE {:.2} bpm",
                    report.subject,
                    report.prefix,
                    report.windows,
                    report.matched,
                    report.agreement.mae
                );
                summary.completed.push(report);
            }
            Err(failure) => {
                log::error!(
                    "{}/{} failed at {}: {}",
                    failure.subject,
                    failure.prefix,
                    failure.stage,
                    failure.message
                );
                summary.failed.push(failure);
            }
        }
    }
    Ok(summary)
}
