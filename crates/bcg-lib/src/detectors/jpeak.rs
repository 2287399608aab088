//! J-peak detection in a band-pass filtered BCG signal.
//!
//! A candidate is a rising-edge local maximum; accepted peaks must clear a
//! height threshold, stand out from their immediate neighbors, and keep a
//! minimum distance from each other. When two candidates conflict on
//! distance the taller one wins.

use crate::error::{BcgError, Result};
use crate::signal::{PeakList, SampleSeries};
use serde::{Deserialize, Serialize};

/// Height requirement for accepted peaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum HeightThreshold {
    /// Amplitude must reach this percentile of the analyzed signal.
    Percentile(f64),
    /// Amplitude must reach this absolute value.
    Absolute(f64),
}

/// Which deflection edge qualifies a candidate. J-peaks ride the leading
/// edge of each beat-induced deflection, so only rising edges count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMode {
    #[default]
    Rising,
}

/// Configurable parameters for J-peak detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JPeakConfig {
    pub min_height: HeightThreshold,
    /// Minimum spacing between accepted peaks (seconds). The default of
    /// 0.5 s caps detection at the fastest plausible heartbeat.
    pub min_distance_s: f64,
    /// Required margin over both immediate neighbors, as a fraction of the
    /// signal's global maximum.
    pub prominence_fraction: f64,
    pub edge: EdgeMode,
}

impl Default for JPeakConfig {
    fn default() -> Self {
        Self {
            min_height: HeightThreshold::Percentile(90.0),
            min_distance_s: 0.5,
            prominence_fraction: 0.05,
            edge: EdgeMode::Rising,
        }
    }
}

/// Detect J-peak indices in `signal` sampled at `fs` Hz.
///
/// Returns a strictly increasing index sequence; an empty result is valid
/// whenever no candidate satisfies all constraints. Only an empty input is
/// an error.
pub fn detect_jpeaks(signal: &[f64], fs: f64, cfg: &JPeakConfig) -> Result<Vec<usize>> {
    if signal.is_empty() {
        return Err(BcgError::input("cannot detect peaks in an empty signal"));
    }
    if signal.len() < 3 {
        return Ok(Vec::new());
    }

    // Rising edge: non-decreasing into the candidate, decreasing out of it.
    // Boundary samples have only one neighbor and never qualify.
    let mut candidates: Vec<usize> = (1..signal.len() - 1)
        .filter(|&i| signal[i - 1] <= signal[i] && signal[i + 1] < signal[i])
        .collect();

    let mph = match cfg.min_height {
        HeightThreshold::Percentile(p) => percentile(signal, p),
        HeightThreshold::Absolute(v) => v,
    };
    candidates.retain(|&i| signal[i] >= mph);

    if cfg.prominence_fraction > 0.0 {
        let global_max = signal.iter().cloned().fold(f64::MIN, f64::max);
        let thr = cfg.prominence_fraction * global_max;
        candidates
            .retain(|&i| (signal[i] - signal[i - 1]).min(signal[i] - signal[i + 1]) >= thr);
    }

    let mpd = (cfg.min_distance_s * fs) as usize;
    if mpd > 1 && candidates.len() > 1 {
        // Visit candidates tallest first; each keeper suppresses everything
        // within mpd samples of it.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            signal[candidates[b]]
                .partial_cmp(&signal[candidates[a]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut suppressed = vec![false; candidates.len()];
        for &k in &order {
            if suppressed[k] {
                continue;
            }
            let idx = candidates[k];
            for (j, &other) in candidates.iter().enumerate() {
                if j != k && !suppressed[j] && other.abs_diff(idx) <= mpd {
                    suppressed[j] = true;
                }
            }
        }
        candidates = candidates
            .into_iter()
            .zip(suppressed)
            .filter(|(_, s)| !s)
            .map(|(i, _)| i)
            .collect();
    }

    candidates.sort_unstable();
    Ok(candidates)
}

/// Detect J-peaks of a sample series, keeping their timestamps and
/// amplitudes alongside the indices.
pub fn detect_jpeak_list(series: &SampleSeries, cfg: &JPeakConfig) -> Result<PeakList> {
    let indices = detect_jpeaks(&series.values, series.fs, cfg)?;
    Ok(PeakList::from_indices(series, &indices))
}

/// Linear-interpolated percentile, `p` in [0, 100].
fn percentile(signal: &[f64], p: f64) -> f64 {
    let mut sorted = signal.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One gaussian bump per beat time, like a cleaned-up BCG deflection.
    fn bump_train(fs: f64, beat_times: &[f64], seconds: f64) -> Vec<f64> {
        let n = (fs * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                beat_times
                    .iter()
                    .map(|&bt| (-0.5 * ((t - bt) / 0.05).powi(2)).exp())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn finds_regular_beats() {
        let fs = 50.0;
        let beats: Vec<f64> = (0..10).map(|i| 0.5 + i as f64).collect();
        let signal = bump_train(fs, &beats, 10.5);
        let peaks = detect_jpeaks(&signal, fs, &JPeakConfig::default()).unwrap();
        assert_eq!(peaks.len(), beats.len());
        for (peak, beat) in peaks.iter().zip(&beats) {
            let t = *peak as f64 / fs;
            assert!((t - beat).abs() < 0.1, "peak at {t}, beat at {beat}");
        }
    }

    #[test]
    fn enforces_minimum_distance_keeping_taller() {
        let fs = 10.0;
        // Two peaks 3 samples apart, mpd = 5; the taller (index 8) wins.
        let mut signal = vec![0.0; 20];
        signal[5] = 1.0;
        signal[8] = 2.0;
        let cfg = JPeakConfig {
            min_height: HeightThreshold::Absolute(0.5),
            min_distance_s: 0.5,
            prominence_fraction: 0.0,
            edge: EdgeMode::Rising,
        };
        let peaks = detect_jpeaks(&signal, fs, &cfg).unwrap();
        assert_eq!(peaks, vec![8]);
    }

    #[test]
    fn minimum_distance_invariant_holds() {
        let fs = 50.0;
        let beats: Vec<f64> = (0..20).map(|i| 0.4 + 0.55 * i as f64).collect();
        let signal = bump_train(fs, &beats, 12.0);
        let cfg = JPeakConfig::default();
        let peaks = detect_jpeaks(&signal, fs, &cfg).unwrap();
        let mpd = (cfg.min_distance_s * fs) as usize;
        for w in peaks.windows(2) {
            assert!(w[1] - w[0] >= mpd, "{} and {} closer than {mpd}", w[0], w[1]);
        }
    }

    #[test]
    fn peak_list_carries_timestamps_and_amplitudes() {
        use crate::resample::reconstruct_timestamps;
        let fs = 50.0;
        let beats: Vec<f64> = (0..5).map(|i| 0.5 + i as f64).collect();
        let series = reconstruct_timestamps(&bump_train(fs, &beats, 5.5), 0.0, fs).unwrap();
        let list = detect_jpeak_list(&series, &JPeakConfig::default()).unwrap();
        assert_eq!(list.peaks.len(), 5);
        for peak in &list.peaks {
            assert_eq!(peak.timestamp, series.timestamps[peak.index]);
            assert_eq!(peak.amplitude, series.values[peak.index]);
        }
        assert_eq!(list.indices().len(), 5);
    }

    #[test]
    fn detection_is_deterministic() {
        let fs = 50.0;
        let beats: Vec<f64> = (0..8).map(|i| 0.7 + 0.9 * i as f64).collect();
        let signal = bump_train(fs, &beats, 8.0);
        let cfg = JPeakConfig::default();
        let first = detect_jpeaks(&signal, fs, &cfg).unwrap();
        let second = detect_jpeaks(&signal, fs, &cfg).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn noisy_beats_are_still_found() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let fs = 50.0;
        let beats: Vec<f64> = (0..10).map(|i| 0.5 + i as f64).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let signal: Vec<f64> = bump_train(fs, &beats, 10.5)
            .into_iter()
            .map(|v| v + rng.gen_range(-0.01..0.01))
            .collect();
        let peaks = detect_jpeaks(&signal, fs, &JPeakConfig::default()).unwrap();
        assert!(
            (9..=10).contains(&peaks.len()),
            "expected 9-10 peaks in noise, got {}",
            peaks.len()
        );
    }

    #[test]
    fn flat_signal_yields_no_peaks() {
        let signal = vec![1.0; 100];
        let peaks = detect_jpeaks(&signal, 50.0, &JPeakConfig::default()).unwrap();
        assert!(peaks.is_empty());
    }

    #[test]
    fn empty_signal_is_an_error() {
        assert!(detect_jpeaks(&[], 50.0, &JPeakConfig::default()).is_err());
    }

    #[test]
    fn boundary_samples_never_qualify() {
        // Tallest value sits at the last index; it has no falling edge.
        let signal = vec![0.0, 1.0, 0.0, 0.0, 5.0];
        let cfg = JPeakConfig {
            min_height: HeightThreshold::Absolute(0.0),
            min_distance_s: 0.0,
            prominence_fraction: 0.0,
            edge: EdgeMode::Rising,
        };
        let peaks = detect_jpeaks(&signal, 10.0, &cfg).unwrap();
        assert_eq!(peaks, vec![1]);
    }

    #[test]
    fn absolute_threshold_overrides_percentile() {
        let fs = 10.0;
        let mut signal = vec![0.0; 40];
        signal[10] = 1.0;
        signal[30] = 3.0;
        let cfg = JPeakConfig {
            min_height: HeightThreshold::Absolute(2.0),
            min_distance_s: 0.5,
            prominence_fraction: 0.0,
            edge: EdgeMode::Rising,
        };
        let peaks = detect_jpeaks(&signal, fs, &cfg).unwrap();
        assert_eq!(peaks, vec![30]);
    }

    #[test]
    fn percentile_is_linear_interpolated() {
        let signal: Vec<f64> = (0..101).map(|i| i as f64).collect();
        assert!((percentile(&signal, 90.0) - 90.0).abs() < 1e-12);
        assert!((percentile(&signal, 50.0) - 50.0).abs() < 1e-12);
    }
}
