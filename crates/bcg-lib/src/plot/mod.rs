//! Backend-neutral figure model.
//!
//! The library describes figures as data; only the CLI touches an actual
//! drawing backend. Undefined heart-rate windows simply do not produce
//! points, so they render as gaps rather than dips to zero.

use crate::metrics::agreement::Agreement;
use crate::signal::RateSeries;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Horizontal guide line, e.g. a Bland-Altman bias or limit of agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideLine {
    pub name: String,
    pub y: f64,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
    Guide(GuideLine),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// Heart rate over time: raw estimates plus, when the series is long
/// enough, a centered rolling mean overlay (window 20).
pub fn figure_from_rate_series(rates: &RateSeries, max_points: usize) -> Figure {
    let points: Vec<[f64; 2]> = rates
        .defined()
        .map(|(t, bpm)| [t as f64 / 1000.0, bpm])
        .collect();
    let mut fig = Figure::new(Some("Heart Rate Over Time".into()));
    fig.x.label = Some("Time (s)".into());
    fig.y.label = Some("Heart Rate (BPM)".into());
    fig.add_series(Series::Line(LineSeries {
        name: "Raw HR".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.0,
            dash: None,
            color: Color(0xF08080),
        },
    }));
    if points.len() > 20 {
        let smoothed = centered_rolling_mean(&points, 20);
        fig.add_series(Series::Line(LineSeries {
            name: "Smoothed HR".into(),
            points: decimate_points(&smoothed, max_points),
            style: Style {
                width: 2.0,
                dash: None,
                color: Color(0x000080),
            },
        }));
    }
    fig
}

fn centered_rolling_mean(points: &[[f64; 2]], window: usize) -> Vec<[f64; 2]> {
    let half = window / 2;
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(points.len());
            let mean = points[start..end].iter().map(|q| q[1]).sum::<f64>()
                / (end - start) as f64;
            [p[0], mean]
        })
        .collect()
}

/// Bland-Altman plot: per-pair (mean, difference) scatter with bias and
/// limit-of-agreement guide lines from the report.
pub fn bland_altman_figure(reference: &[f64], estimate: &[f64], report: &Agreement) -> Figure {
    let points: Vec<[f64; 2]> = reference
        .iter()
        .zip(estimate)
        .map(|(&r, &e)| [(r + e) / 2.0, e - r])
        .collect();
    let mut fig = Figure::new(Some("Bland-Altman Plot".into()));
    fig.x.label = Some("Mean HR (bpm)".into());
    fig.y.label = Some("Difference (Est - Ref)".into());
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "pairs".into(),
        points,
        style: Style {
            width: 2.0,
            dash: None,
            color: Color(0x1F77B4),
        },
    }));
    let guide = |name: String, y: f64, dash: [f32; 2]| {
        Series::Guide(GuideLine {
            name,
            y,
            style: Style {
                width: 1.0,
                dash: Some(dash),
                color: Color(0x808080),
            },
        })
    };
    fig.add_series(guide(format!("Bias={:.2}", report.bias), report.bias, [6.0, 3.0]));
    fig.add_series(guide(
        format!("+1.96 SD={:.2}", report.loa_upper),
        report.loa_upper,
        [2.0, 2.0],
    ));
    fig.add_series(guide(
        format!("-1.96 SD={:.2}", report.loa_lower),
        report.loa_lower,
        [2.0, 2.0],
    ));
    fig
}

/// Reference vs. estimate scatter, titled with the correlation result.
pub fn correlation_figure(reference: &[f64], estimate: &[f64], report: &Agreement) -> Figure {
    let points: Vec<[f64; 2]> = reference
        .iter()
        .zip(estimate)
        .map(|(&r, &e)| [r, e])
        .collect();
    let mut fig = Figure::new(Some(format!(
        "Pearson r = {:.2}, p = {:.3}",
        report.pearson_r, report.pearson_p
    )));
    fig.x.label = Some("Reference HR (bpm)".into());
    fig.y.label = Some("Estimated HR (bpm)".into());
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "pairs".into(),
        points,
        style: Style {
            width: 2.0,
            dash: None,
            color: Color(0x1F77B4),
        },
    }));
    fig
}
