//! Windowed heart-rate estimation from a filtered BCG signal.
//!
//! The signal is cut into non-overlapping windows of `window_seconds * fs`
//! samples; a trailing partial window is discarded, not padded. Each window
//! is peak-detected on its own (height threshold and prominence are derived
//! from the window's samples; the minimum peak distance comes from the
//! global sampling rate) and the mean inter-peak interval becomes one BPM
//! value anchored at the window's first-sample timestamp.

use crate::detectors::jpeak::{detect_jpeaks, JPeakConfig};
use crate::error::{BcgError, Result};
use crate::signal::{RatePoint, RateSeries, SampleSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateEstimatorConfig {
    pub window_seconds: f64,
    pub detector: JPeakConfig,
}

impl Default for RateEstimatorConfig {
    fn default() -> Self {
        Self {
            window_seconds: 10.0,
            detector: JPeakConfig::default(),
        }
    }
}

/// Estimate BPM per window. A window with fewer than two accepted peaks
/// yields an undefined rate, not zero.
pub fn estimate_windowed_rates(
    series: &SampleSeries,
    cfg: &RateEstimatorConfig,
) -> Result<RateSeries> {
    if series.is_empty() {
        return Err(BcgError::input("cannot estimate rate on an empty series"));
    }
    let window = (cfg.window_seconds * series.fs) as usize;
    if window < 2 {
        return Err(BcgError::input(format!(
            "window of {} s at {} Hz is too small",
            cfg.window_seconds, series.fs
        )));
    }

    let count = series.len() / window;
    let mut points = Vec::with_capacity(count);
    for w in 0..count {
        let start = w * window;
        let slice = &series.values[start..start + window];
        let peaks = detect_jpeaks(slice, series.fs, &cfg.detector)?;
        points.push(RatePoint {
            timestamp: series.timestamps[start],
            bpm: window_bpm(&peaks, series.fs),
        });
    }
    Ok(RateSeries { points })
}

/// `60000 / mean(inter-peak interval in ms)` over consecutive peak pairs.
fn window_bpm(peaks: &[usize], fs: f64) -> Option<f64> {
    if peaks.len() < 2 {
        return None;
    }
    let mut intervals_ms = Vec::with_capacity(peaks.len() - 1);
    for w in peaks.windows(2) {
        intervals_ms.push((w[1] - w[0]) as f64 * 1000.0 / fs);
    }
    let mean = intervals_ms.iter().sum::<f64>() / intervals_ms.len() as f64;
    Some(60_000.0 / mean)
}
