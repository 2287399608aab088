//! Timestamp reconstruction and fixed-rate resampling.
//!
//! Raw BCG files declare a nominal rate `fs` but carry unreliable per-sample
//! timestamps; only the first timestamp and `fs` are trusted. Both routines
//! truncate (never round) when casting back to integer milliseconds, so a
//! bounded quantization drift of up to 1 ms is expected downstream.

use crate::error::{BcgError, Result};
use crate::signal::SampleSeries;
use num_traits::ToPrimitive;

/// Rebuild a uniform timestamp axis from the declared nominal rate.
///
/// `timestamp[i] = t0 + i * (1000 / fs)`, truncated to integer milliseconds.
pub fn reconstruct_timestamps(values: &[f64], t0: f64, fs: f64) -> Result<SampleSeries> {
    if values.is_empty() {
        return Err(BcgError::input("cannot reconstruct timestamps for an empty series"));
    }
    if fs <= 0.0 {
        return Err(BcgError::input(format!("nominal rate must be positive, got {fs}")));
    }
    let dt_ms = 1000.0 / fs;
    let timestamps = (0..values.len())
        .map(|i| trunc_ms(t0 + i as f64 * dt_ms))
        .collect::<Result<Vec<i64>>>()?;
    Ok(SampleSeries {
        fs,
        timestamps,
        values: values.to_vec(),
    })
}

/// Re-grid a signal onto a new fixed sampling rate via linear interpolation.
///
/// The output grid starts at the first input timestamp and steps by
/// `1000 / fs_new`, stopping strictly before the last input timestamp:
/// exactly `floor((t_end - t_start) / dt)` samples. Grid values interpolate
/// between the two bracketing input samples; nothing is extrapolated.
/// Both amplitude and timestamp truncate back to the integer domain.
pub fn resample(series: &SampleSeries, fs_new: f64) -> Result<SampleSeries> {
    if series.len() < 2 {
        return Err(BcgError::input(format!(
            "resampling needs at least 2 samples, got {}",
            series.len()
        )));
    }
    if fs_new <= 0.0 {
        return Err(BcgError::input(format!("target rate must be positive, got {fs_new}")));
    }

    let t_start = series.timestamps[0] as f64;
    let t_end = *series.timestamps.last().unwrap() as f64;
    let dt = 1000.0 / fs_new;
    let n = ((t_end - t_start) / dt).floor() as usize;

    let mut timestamps = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);
    // Two-pointer walk: input timestamps are ascending, and so is the grid.
    let mut seg = 0usize;
    for k in 0..n {
        let t = t_start + k as f64 * dt;
        while seg + 2 < series.len() && (series.timestamps[seg + 1] as f64) < t {
            seg += 1;
        }
        let t0 = series.timestamps[seg] as f64;
        let t1 = series.timestamps[seg + 1] as f64;
        let v0 = series.values[seg];
        let v1 = series.values[seg + 1];
        let v = if t1 > t0 {
            v0 + (v1 - v0) * ((t - t0) / (t1 - t0))
        } else {
            v0
        };
        timestamps.push(trunc_ms(t)?);
        values.push(v.trunc());
    }

    Ok(SampleSeries {
        fs: fs_new,
        timestamps,
        values,
    })
}

fn trunc_ms(t: f64) -> Result<i64> {
    t.to_i64()
        .ok_or_else(|| BcgError::input(format!("timestamp {t} does not fit integer milliseconds")))
}
