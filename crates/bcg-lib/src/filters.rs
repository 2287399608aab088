//! Zero-phase Butterworth band-pass filtering.
//!
//! The band-pass is a cascade of second-order high-pass and low-pass
//! Butterworth sections (bilinear transform), applied forward and then
//! backward so the output is phase-aligned with the input. The signal is
//! extended by odd reflection at both ends before filtering so the
//! settling transient falls on the padding, which is stripped afterwards.

use crate::error::{BcgError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Named cutoff pair for a filtering use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterProfile {
    /// Isolate heartbeat-rate content: passes 0.5-15 Hz, rejecting
    /// respiration below and sensor noise above. Also answers to "bcg".
    Cardiac,
}

impl FilterProfile {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cardiac" | "bcg" => Ok(FilterProfile::Cardiac),
            other => Err(BcgError::input(format!("unknown filter profile '{other}'"))),
        }
    }

    pub fn cutoffs_hz(&self) -> (f64, f64) {
        match self {
            FilterProfile::Cardiac => (0.5, 15.0),
        }
    }
}

/// Band-pass parameters. `order` is the effective filter order per pass;
/// each pass runs `order / 2` second-order sections per band edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BandpassConfig {
    pub lowcut_hz: f64,
    pub highcut_hz: f64,
    pub order: usize,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self::from_profile(FilterProfile::Cardiac)
    }
}

impl BandpassConfig {
    pub fn from_profile(profile: FilterProfile) -> Self {
        let (lowcut_hz, highcut_hz) = profile.cutoffs_hz();
        Self {
            lowcut_hz,
            highcut_hz,
            order: 4,
        }
    }

    /// Samples the zero-phase pass needs beyond its reflection padding.
    pub fn min_signal_len(&self) -> usize {
        3 * (2 * self.order + 1)
    }
}

/// Apply the configured band-pass forward and backward over `signal`.
/// Output length equals input length.
pub fn band_pass_filter(signal: &[f64], fs: f64, cfg: &BandpassConfig) -> Result<Vec<f64>> {
    let nyquist = fs / 2.0;
    if fs <= 0.0 {
        return Err(BcgError::input(format!("sampling rate must be positive, got {fs}")));
    }
    if cfg.lowcut_hz <= 0.0 || cfg.highcut_hz >= nyquist || cfg.lowcut_hz >= cfg.highcut_hz {
        return Err(BcgError::input(format!(
            "band edges must satisfy 0 < {} < {} < {} (Nyquist)",
            cfg.lowcut_hz, cfg.highcut_hz, nyquist
        )));
    }
    if cfg.order == 0 {
        return Err(BcgError::input("filter order must be at least 1"));
    }
    let padlen = cfg.min_signal_len();
    if signal.len() <= padlen {
        return Err(BcgError::FilterLength {
            needed: padlen,
            actual: signal.len(),
        });
    }

    let sections = (cfg.order / 2).max(1);
    let mut extended = reflect_odd(signal, padlen);

    // Forward pass, then reverse and filter again for zero phase.
    cascade(&mut extended, fs, cfg, sections);
    extended.reverse();
    cascade(&mut extended, fs, cfg, sections);
    extended.reverse();

    Ok(extended[padlen..padlen + signal.len()].to_vec())
}

fn cascade(signal: &mut Vec<f64>, fs: f64, cfg: &BandpassConfig, sections: usize) {
    for _ in 0..sections {
        *signal = biquad_highpass(signal, fs, cfg.lowcut_hz);
    }
    for _ in 0..sections {
        *signal = biquad_lowpass(signal, fs, cfg.highcut_hz);
    }
}

/// Extend the signal by odd reflection: the mirrored ends pivot around the
/// boundary samples so the extension is continuous in value and slope.
fn reflect_odd(signal: &[f64], padlen: usize) -> Vec<f64> {
    let n = signal.len();
    debug_assert!(n > padlen);
    let mut out = Vec::with_capacity(n + 2 * padlen);
    for i in (1..=padlen).rev() {
        out.push(2.0 * signal[0] - signal[i]);
    }
    out.extend_from_slice(signal);
    for i in 1..=padlen {
        out.push(2.0 * signal[n - 1] - signal[n - 1 - i]);
    }
    out
}

/// Second-order Butterworth low-pass section (bilinear transform).
fn biquad_lowpass(signal: &[f64], fs: f64, fc: f64) -> Vec<f64> {
    let wc = (PI * fc / fs).tan();
    let wc2 = wc * wc;
    let sqrt2 = std::f64::consts::SQRT_2;
    let k = 1.0 + sqrt2 * wc + wc2;

    let b0 = wc2 / k;
    let b1 = 2.0 * wc2 / k;
    let b2 = wc2 / k;
    let a1 = 2.0 * (wc2 - 1.0) / k;
    let a2 = (1.0 - sqrt2 * wc + wc2) / k;

    iir_filter_2nd(signal, b0, b1, b2, a1, a2)
}

/// Second-order Butterworth high-pass section (bilinear transform).
fn biquad_highpass(signal: &[f64], fs: f64, fc: f64) -> Vec<f64> {
    let wc = (PI * fc / fs).tan();
    let wc2 = wc * wc;
    let sqrt2 = std::f64::consts::SQRT_2;
    let k = 1.0 + sqrt2 * wc + wc2;

    let b0 = 1.0 / k;
    let b1 = -2.0 / k;
    let b2 = 1.0 / k;
    let a1 = 2.0 * (wc2 - 1.0) / k;
    let a2 = (1.0 - sqrt2 * wc + wc2) / k;

    iir_filter_2nd(signal, b0, b1, b2, a1, a2)
}

/// Second-order IIR filter, Direct Form I.
fn iir_filter_2nd(signal: &[f64], b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Vec<f64> {
    let n = signal.len();
    let mut out = vec![0.0f64; n];
    for i in 0..n {
        let x0 = signal[i];
        let x1 = if i >= 1 { signal[i - 1] } else { 0.0 };
        let x2 = if i >= 2 { signal[i - 2] } else { 0.0 };
        let y1 = if i >= 1 { out[i - 1] } else { 0.0 };
        let y2 = if i >= 2 { out[i - 2] } else { 0.0 };
        out[i] = b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(fs: f64, hz: f64, seconds: f64, amp: f64) -> Vec<f64> {
        let n = (fs * seconds) as usize;
        (0..n)
            .map(|i| amp * (2.0 * PI * hz * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn output_length_equals_input_length() {
        let x = sine(50.0, 1.0, 10.0, 1.0);
        let y = band_pass_filter(&x, 50.0, &BandpassConfig::default()).unwrap();
        assert_eq!(y.len(), x.len());
    }

    #[test]
    fn passband_tone_survives_stopband_tone_dies() {
        let fs = 50.0;
        let cfg = BandpassConfig::default();
        let in_band = band_pass_filter(&sine(fs, 2.0, 20.0, 1.0), fs, &cfg).unwrap();
        let below_band = band_pass_filter(&sine(fs, 0.05, 20.0, 1.0), fs, &cfg).unwrap();
        let rms = |v: &[f64]| (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
        assert!(rms(&in_band) > 0.5);
        assert!(rms(&below_band) < 0.1 * rms(&in_band));
    }

    #[test]
    fn filtering_is_zero_phase() {
        let fs = 50.0;
        let x = sine(fs, 2.0, 20.0, 1.0);
        let y = band_pass_filter(&x, fs, &BandpassConfig::default()).unwrap();
        // Peaks of an in-band tone must not shift: compare the argmax of a
        // mid-signal stretch against the raw tone.
        let window = 200..300;
        let argmax = |v: &[f64]| {
            window
                .clone()
                .max_by(|&a, &b| v[a].partial_cmp(&v[b]).unwrap())
                .unwrap()
        };
        let lag = argmax(&y) as i64 - argmax(&x) as i64;
        assert!(lag.abs() <= 1, "phase lag of {lag} samples");
    }

    #[test]
    fn short_signal_reports_filter_length() {
        let cfg = BandpassConfig::default();
        let x = vec![0.0; cfg.min_signal_len()];
        match band_pass_filter(&x, 50.0, &cfg) {
            Err(BcgError::FilterLength { needed, actual }) => {
                assert_eq!(needed, cfg.min_signal_len());
                assert_eq!(actual, x.len());
            }
            other => panic!("expected FilterLength, got {other:?}"),
        }
    }

    #[test]
    fn invalid_band_edges_are_rejected() {
        let x = sine(50.0, 2.0, 10.0, 1.0);
        let bad_high = BandpassConfig {
            lowcut_hz: 0.5,
            highcut_hz: 30.0,
            order: 4,
        };
        assert!(band_pass_filter(&x, 50.0, &bad_high).is_err());
        let inverted = BandpassConfig {
            lowcut_hz: 10.0,
            highcut_hz: 1.0,
            order: 4,
        };
        assert!(band_pass_filter(&x, 50.0, &inverted).is_err());
    }

    #[test]
    fn profile_names_resolve() {
        assert_eq!(FilterProfile::from_name("bcg").unwrap(), FilterProfile::Cardiac);
        assert_eq!(FilterProfile::from_name("Cardiac").unwrap(), FilterProfile::Cardiac);
        assert!(FilterProfile::from_name("ecg").is_err());
    }
}
