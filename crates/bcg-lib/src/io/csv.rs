//! Schema-checked CSV readers and writers for every file role at the
//! pipeline boundary.
//!
//! Each reader verifies its header contract before touching a single
//! number: a missing required column is reported as a schema violation
//! naming the file role and the column, never as a numeric failure three
//! stages later. Undefined heart-rate values travel as empty fields.

use crate::error::BcgError;
use crate::io::timefmt;
use crate::signal::{PeakList, RatePoint, RateSeries, SampleSeries};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawBcgRow {
    #[serde(rename = "BCG")]
    bcg: f64,
    #[serde(rename = "Timestamp")]
    timestamp: f64,
    #[serde(rename = "fs")]
    fs: f64,
}

#[derive(Debug, Deserialize)]
struct ResampledBcgRow {
    #[serde(rename = "BCG")]
    bcg: i64,
    #[serde(rename = "Timestamp")]
    timestamp: i64,
    #[serde(rename = "fs")]
    fs: i64,
}

#[derive(Debug, Deserialize)]
struct RateRow {
    #[serde(rename = "Timestamp")]
    timestamp: i64,
    #[serde(rename = "Heart Rate")]
    bpm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DatetimeRateRow {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Heart Rate")]
    bpm: Option<f64>,
}

/// Raw BCG samples plus the trusted per-file parameters: the declared
/// first timestamp and the nominal rate.
#[derive(Debug, Clone)]
pub struct RawBcg {
    pub values: Vec<f64>,
    pub t0: f64,
    pub fs: f64,
}

fn open_checked(path: &Path, file_role: &str, required: &[&str]) -> Result<csv::Reader<std::fs::File>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {file_role} {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading {file_role} header in {}", path.display()))?;
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(BcgError::schema(file_role, *column))
                .with_context(|| format!("in {}", path.display()));
        }
    }
    Ok(reader)
}

/// Read a raw BCG recording: `BCG`, `Timestamp`, `fs` columns. The first
/// row supplies `t0` and `fs`; per-sample timestamps beyond the first are
/// untrusted and ignored.
pub fn read_raw_bcg(path: &Path) -> Result<RawBcg> {
    let mut reader = open_checked(path, "raw BCG input", &["BCG", "Timestamp", "fs"])?;
    let mut values = Vec::new();
    let mut t0 = None;
    let mut fs = None;
    for (idx, row) in reader.deserialize::<RawBcgRow>().enumerate() {
        let row = row.with_context(|| format!("parsing raw BCG row {}", idx + 1))?;
        if t0.is_none() {
            t0 = Some(row.timestamp);
            fs = Some(row.fs);
        }
        values.push(row.bcg);
    }
    match (t0, fs) {
        (Some(t0), Some(fs)) => Ok(RawBcg { values, t0, fs }),
        _ => Err(BcgError::input("raw BCG input has no data rows").into()),
    }
}

/// Write a resampled series: integer `BCG`, `Timestamp` (ms), `fs`.
/// Amplitudes were already truncated to the integer domain by the
/// resampler; the cast here cannot lose fractional content.
pub fn write_resampled_bcg(path: &Path, series: &SampleSeries) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["BCG", "Timestamp", "fs"])?;
    let fs = (series.fs as i64).to_string();
    for (&timestamp, &value) in series.timestamps.iter().zip(&series.values) {
        writer.write_record([
            (value as i64).to_string(),
            timestamp.to_string(),
            fs.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a resampled series back; `fs` comes from the first row.
pub fn read_resampled_bcg(path: &Path) -> Result<SampleSeries> {
    let mut reader = open_checked(path, "resampled BCG", &["BCG", "Timestamp", "fs"])?;
    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    let mut fs = None;
    for (idx, row) in reader.deserialize::<ResampledBcgRow>().enumerate() {
        let row = row.with_context(|| format!("parsing resampled BCG row {}", idx + 1))?;
        fs.get_or_insert(row.fs);
        timestamps.push(row.timestamp);
        values.push(row.bcg as f64);
    }
    let fs = fs.ok_or_else(|| BcgError::input("resampled BCG input has no data rows"))?;
    Ok(SampleSeries {
        fs: fs as f64,
        timestamps,
        values,
    })
}

/// Write an estimated rate series with millisecond timestamps. Undefined
/// windows serialize as empty `Heart Rate` fields.
pub fn write_rate_series(path: &Path, series: &RateSeries) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Timestamp", "Heart Rate"])?;
    for point in &series.points {
        writer.write_record([point.timestamp.to_string(), bpm_field(point.bpm)])?;
    }
    writer.flush()?;
    Ok(())
}

fn bpm_field(bpm: Option<f64>) -> String {
    bpm.map(|v| v.to_string()).unwrap_or_default()
}

/// Read a rate series with millisecond timestamps.
pub fn read_rate_series(path: &Path) -> Result<RateSeries> {
    let mut reader = open_checked(path, "heart-rate series", &["Timestamp", "Heart Rate"])?;
    let mut points = Vec::new();
    for (idx, row) in reader.deserialize::<RateRow>().enumerate() {
        let row = row.with_context(|| format!("parsing heart-rate row {}", idx + 1))?;
        points.push(RatePoint {
            timestamp: row.timestamp,
            bpm: row.bpm,
        });
    }
    Ok(RateSeries { points })
}

/// Write a rate series with `YYYY/MM/DD HH:MM:SS` timestamps, truncating
/// each anchor to the whole second.
pub fn write_rate_series_formatted(path: &Path, series: &RateSeries) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Timestamp", "Heart Rate"])?;
    for point in &series.points {
        writer.write_record([timefmt::format_ms(point.timestamp)?, bpm_field(point.bpm)])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a rate series whose timestamps are datetime strings — the
/// formatted estimate variant and the RR reference share this schema.
pub fn read_rate_series_formatted(path: &Path) -> Result<RateSeries> {
    let mut reader = open_checked(path, "datetime heart-rate series", &["Timestamp", "Heart Rate"])?;
    let mut points = Vec::new();
    for (idx, row) in reader.deserialize::<DatetimeRateRow>().enumerate() {
        let row = row.with_context(|| format!("parsing heart-rate row {}", idx + 1))?;
        points.push(RatePoint {
            timestamp: timefmt::parse_to_ms(&row.timestamp)
                .with_context(|| format!("heart-rate row {}", idx + 1))?,
            bpm: row.bpm,
        });
    }
    Ok(RateSeries { points })
}

/// Write detected J-peaks for review: timestamp, filtered amplitude, and
/// sample index per peak.
pub fn write_peaks(path: &Path, peaks: &PeakList) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Timestamp", "Amplitude", "SampleIndex"])?;
    for peak in &peaks.peaks {
        writer.write_record([
            peak.timestamp.to_string(),
            peak.amplitude.to_string(),
            peak.index.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the merged comparison table: one formatted timestamp column,
/// reference and estimate side by side.
pub fn write_merged_comparison(
    path: &Path,
    reference: &RateSeries,
    estimate: &RateSeries,
) -> Result<()> {
    if reference.len() != estimate.len() {
        return Err(BcgError::LengthMismatch {
            reference: reference.len(),
            estimate: estimate.len(),
        }
        .into());
    }
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Timestamp", "RR_HR", "BCG_HR"])?;
    for (rr, bcg) in reference.points.iter().zip(&estimate.points) {
        writer.write_record([
            timefmt::format_ms(rr.timestamp)?,
            bpm_field(rr.bpm),
            bpm_field(bcg.bpm),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(feature = "polars")]
pub mod polars_io {
    use anyhow::Result;
    use polars::prelude::*;

    /// Load one numeric column of a BCG CSV as f64, for callers already on
    /// a polars stack. Integer columns (raw `BCG` amplitudes) are cast.
    pub fn load_column(path: &str, col: &str) -> Result<Vec<f64>> {
        let df = CsvReadOptions::default()
            .try_into_reader_with_file_path(Some(path.into()))?
            .finish()?;
        let s = df.column(col)?.cast(&DataType::Float64)?;
        Ok(s.f64()?.into_no_null_iter().collect())
    }
}
