//! Exact-timestamp synchronization of two rate series.
//!
//! The two sources run on independent clocks and cadences, so alignment is
//! strict: duplicate timestamps collapse to their median, both series trim
//! to the overlapping time range, and only bit-for-bit equal timestamps
//! survive. No nearest-neighbor or tolerance matching happens here; both
//! upstream pipelines are expected to have aligned their granularity
//! (whole seconds, via the timestamp formatting step) beforehand.

use crate::signal::{RatePoint, RateSeries, SyncedPair};
use std::collections::BTreeMap;

/// Align two rate series onto their exact common timestamps.
///
/// A pair with no overlap comes back zero-length; that is a legitimate
/// terminal result, and callers must guard against evaluating statistics
/// on it.
pub fn synchronize(a: &RateSeries, b: &RateSeries) -> SyncedPair {
    let a = dedup_median(a);
    let b = dedup_median(b);

    let (a, b) = match overlap_bounds(&a, &b) {
        Some((start, end)) => (trim(a, start, end), trim(b, start, end)),
        None => (BTreeMap::new(), BTreeMap::new()),
    };

    let mut out_a = Vec::new();
    let mut out_b = Vec::new();
    // BTreeMap iterates ascending, so the intersection stays sorted.
    for (&timestamp, &bpm) in &a {
        if let Some(&other) = b.get(&timestamp) {
            out_a.push(RatePoint { timestamp, bpm });
            out_b.push(RatePoint {
                timestamp,
                bpm: other,
            });
        }
    }

    SyncedPair {
        a: RateSeries { points: out_a },
        b: RateSeries { points: out_b },
    }
}

/// Collapse duplicate timestamps to the median of their defined values.
/// A group with no defined value stays undefined.
fn dedup_median(series: &RateSeries) -> BTreeMap<i64, Option<f64>> {
    let mut groups: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    let mut seen: BTreeMap<i64, Option<f64>> = BTreeMap::new();
    for point in &series.points {
        seen.entry(point.timestamp).or_insert(None);
        if let Some(bpm) = point.bpm {
            groups.entry(point.timestamp).or_default().push(bpm);
        }
    }
    for (timestamp, mut values) in groups {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = values.len();
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };
        seen.insert(timestamp, Some(median));
    }
    seen
}

fn overlap_bounds(
    a: &BTreeMap<i64, Option<f64>>,
    b: &BTreeMap<i64, Option<f64>>,
) -> Option<(i64, i64)> {
    let (a_min, a_max) = (a.keys().next()?, a.keys().next_back()?);
    let (b_min, b_max) = (b.keys().next()?, b.keys().next_back()?);
    let start = *a_min.max(b_min);
    let end = *a_max.min(b_max);
    (start <= end).then_some((start, end))
}

fn trim(map: BTreeMap<i64, Option<f64>>, start: i64, end: i64) -> BTreeMap<i64, Option<f64>> {
    map.into_iter()
        .filter(|(t, _)| (start..=end).contains(t))
        .collect()
}
