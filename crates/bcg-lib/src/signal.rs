use serde::{Deserialize, Serialize};

/// Uniformly sampled signal with integer-millisecond timestamps.
///
/// After timestamp reconstruction or resampling, `timestamps` are strictly
/// increasing and equally spaced. A stage that produced a `SampleSeries`
/// owns it; consumers take it by reference and never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Sample times in epoch milliseconds
    pub timestamps: Vec<i64>,
    /// Sample amplitudes
    pub values: Vec<f64>,
}

impl SampleSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.values.len() as f64 / self.fs
    }
}

/// A detected J-peak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Peak {
    pub index: usize,
    pub timestamp: i64,
    pub amplitude: f64,
}

/// J-peaks of one signal, strictly increasing by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakList {
    pub peaks: Vec<Peak>,
}

impl PeakList {
    pub fn from_indices(series: &SampleSeries, indices: &[usize]) -> Self {
        let peaks = indices
            .iter()
            .map(|&i| Peak {
                index: i,
                timestamp: series.timestamps[i],
                amplitude: series.values[i],
            })
            .collect();
        Self { peaks }
    }

    pub fn indices(&self) -> Vec<usize> {
        self.peaks.iter().map(|p| p.index).collect()
    }
}

/// One windowed heart-rate estimate. `bpm` is `None` when the window did
/// not contain enough peaks to form an interval; downstream consumers must
/// treat that as a gap, never as a rate of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub timestamp: i64,
    pub bpm: Option<f64>,
}

/// Heart rate over time, anchored at the first-sample timestamp of each
/// source window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSeries {
    pub points: Vec<RatePoint>,
}

impl RateSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn timestamps(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.timestamp).collect()
    }
    /// Defined (timestamp, bpm) pairs, skipping undefined windows.
    pub fn defined(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.bpm.map(|bpm| (p.timestamp, bpm)))
    }
}

/// Two rate series aligned onto one identical, ascending timestamp vector.
/// May be empty when the sources do not overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedPair {
    pub a: RateSeries,
    pub b: RateSeries,
}

impl SyncedPair {
    pub fn len(&self) -> usize {
        self.a.len()
    }
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}
