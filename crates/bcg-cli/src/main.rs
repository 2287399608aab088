use anyhow::Result;
use bcg_batch::{read_config, run_batch, PipelineConfig};
use bcg_lib::{
    detectors::jpeak::{detect_jpeak_list, EdgeMode, HeightThreshold, JPeakConfig},
    error::BcgError,
    filters::{band_pass_filter, BandpassConfig, FilterProfile},
    io::{csv as csv_io, timefmt},
    metrics::agreement,
    metrics::rate::{estimate_windowed_rates, RateEstimatorConfig},
    plot::{bland_altman_figure, correlation_figure, figure_from_rate_series, Figure, Series},
    resample::{reconstruct_timestamps, resample},
    signal::SampleSeries,
    sync::synchronize,
};
use clap::{Parser, Subcommand};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "bcg",
    version,
    about = "BCG heart-rate estimation and validation tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild timestamps from the declared nominal rate and resample a raw
    /// BCG recording onto a fixed grid
    Resample {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 50.0)]
        fs_new: f64,
    },
    /// Band-pass a resampled recording and estimate windowed heart rate
    EstimateHr {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        window_seconds: f64,
        #[arg(long, default_value = "cardiac")]
        filter_profile: String,
        #[arg(long, default_value_t = 4)]
        filter_order: usize,
        #[arg(long, default_value_t = 0.5)]
        min_peak_distance_s: f64,
        #[arg(long, default_value_t = 0.05)]
        prominence_fraction: f64,
        #[arg(long, default_value_t = 90.0)]
        min_peak_height_percentile: f64,
        /// Absolute height threshold; overrides the percentile
        #[arg(long)]
        min_peak_height: Option<f64>,
        /// Also render the heart-rate figure to this PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Band-pass a resampled recording and list its J-peaks
    DetectPeaks {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "cardiac")]
        filter_profile: String,
        #[arg(long, default_value_t = 4)]
        filter_order: usize,
        #[arg(long, default_value_t = 0.5)]
        min_peak_distance_s: f64,
        #[arg(long, default_value_t = 0.05)]
        prominence_fraction: f64,
        #[arg(long, default_value_t = 90.0)]
        min_peak_height_percentile: f64,
        #[arg(long)]
        min_peak_height: Option<f64>,
    },
    /// Rewrite millisecond timestamps as YYYY/MM/DD HH:MM:SS strings
    FormatTimestamps {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Align an estimated and a reference rate series on exact timestamps
    Synchronize {
        #[arg(long)]
        estimated: PathBuf,
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        out_estimated: PathBuf,
        #[arg(long)]
        out_reference: PathBuf,
        /// Also write the merged Timestamp,RR_HR,BCG_HR table
        #[arg(long)]
        merged: Option<PathBuf>,
    },
    /// Agreement statistics between two synchronized rate series
    Evaluate {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        estimate: PathBuf,
    },
    /// Render Bland-Altman and correlation charts for two synchronized series
    PlotAgreement {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        estimate: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Process every BCG/RR pair under a dataset root
    Batch {
        #[arg(long)]
        data_root: PathBuf,
        #[arg(long)]
        results_root: PathBuf,
        /// TOML pipeline config; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Resample {
            input,
            output,
            fs_new,
        } => cmd_resample(&input, &output, fs_new)?,
        Commands::EstimateHr {
            input,
            output,
            window_seconds,
            filter_profile,
            filter_order,
            min_peak_distance_s,
            prominence_fraction,
            min_peak_height_percentile,
            min_peak_height,
            plot,
        } => cmd_estimate_hr(
            &input,
            &output,
            window_seconds,
            &filter_profile,
            filter_order,
            min_peak_distance_s,
            prominence_fraction,
            min_peak_height_percentile,
            min_peak_height,
            plot.as_deref(),
        )?,
        Commands::DetectPeaks {
            input,
            output,
            filter_profile,
            filter_order,
            min_peak_distance_s,
            prominence_fraction,
            min_peak_height_percentile,
            min_peak_height,
        } => cmd_detect_peaks(
            &input,
            &output,
            &filter_profile,
            filter_order,
            detector_config(
                min_peak_distance_s,
                prominence_fraction,
                min_peak_height_percentile,
                min_peak_height,
            ),
        )?,
        Commands::FormatTimestamps { input, output } => cmd_format_timestamps(&input, &output)?,
        Commands::Synchronize {
            estimated,
            reference,
            out_estimated,
            out_reference,
            merged,
        } => cmd_synchronize(
            &estimated,
            &reference,
            &out_estimated,
            &out_reference,
            merged.as_deref(),
        )?,
        Commands::Evaluate {
            reference,
            estimate,
        } => cmd_evaluate(&reference, &estimate)?,
        Commands::PlotAgreement {
            reference,
            estimate,
            out,
        } => cmd_plot_agreement(&reference, &estimate, &out)?,
        Commands::Batch {
            data_root,
            results_root,
            config,
        } => cmd_batch(&data_root, &results_root, config.as_deref())?,
    }
    Ok(())
}

fn cmd_resample(input: &Path, output: &Path, fs_new: f64) -> Result<()> {
    let raw = csv_io::read_raw_bcg(input)?;
    let series = reconstruct_timestamps(&raw.values, raw.t0, raw.fs)?;
    let resampled = resample(&series, fs_new)?;
    csv_io::write_resampled_bcg(output, &resampled)?;
    println!(
        "{}",
        json!({
            "original_samples": series.len(),
            "resampled_samples": resampled.len(),
            "fs": raw.fs,
            "fs_new": fs_new,
        })
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_estimate_hr(
    input: &Path,
    output: &Path,
    window_seconds: f64,
    filter_profile: &str,
    filter_order: usize,
    min_peak_distance_s: f64,
    prominence_fraction: f64,
    min_peak_height_percentile: f64,
    min_peak_height: Option<f64>,
    plot: Option<&Path>,
) -> Result<()> {
    let resampled = csv_io::read_resampled_bcg(input)?;
    let mut bandpass = BandpassConfig::from_profile(FilterProfile::from_name(filter_profile)?);
    bandpass.order = filter_order;
    let values = band_pass_filter(&resampled.values, resampled.fs, &bandpass)?;
    let filtered = SampleSeries {
        fs: resampled.fs,
        timestamps: resampled.timestamps.clone(),
        values,
    };
    let estimator = RateEstimatorConfig {
        window_seconds,
        detector: detector_config(
            min_peak_distance_s,
            prominence_fraction,
            min_peak_height_percentile,
            min_peak_height,
        ),
    };
    let rates = estimate_windowed_rates(&filtered, &estimator)?;
    csv_io::write_rate_series(output, &rates)?;
    if let Some(plot_path) = plot {
        let fig = figure_from_rate_series(&rates, 1024);
        render_png(plot_path, (1000, 500), &[fig])?;
    }
    let defined = rates.defined().count();
    println!(
        "{}",
        json!({
            "windows": rates.len(),
            "defined": defined,
            "undefined": rates.len() - defined,
        })
    );
    Ok(())
}

fn detector_config(
    min_peak_distance_s: f64,
    prominence_fraction: f64,
    min_peak_height_percentile: f64,
    min_peak_height: Option<f64>,
) -> JPeakConfig {
    JPeakConfig {
        min_height: match min_peak_height {
            Some(v) => HeightThreshold::Absolute(v),
            None => HeightThreshold::Percentile(min_peak_height_percentile),
        },
        min_distance_s: min_peak_distance_s,
        prominence_fraction,
        edge: EdgeMode::Rising,
    }
}

fn cmd_detect_peaks(
    input: &Path,
    output: &Path,
    filter_profile: &str,
    filter_order: usize,
    detector: JPeakConfig,
) -> Result<()> {
    let resampled = csv_io::read_resampled_bcg(input)?;
    let mut bandpass = BandpassConfig::from_profile(FilterProfile::from_name(filter_profile)?);
    bandpass.order = filter_order;
    let values = band_pass_filter(&resampled.values, resampled.fs, &bandpass)?;
    let filtered = SampleSeries {
        fs: resampled.fs,
        timestamps: resampled.timestamps.clone(),
        values,
    };
    let peaks = detect_jpeak_list(&filtered, &detector)?;
    csv_io::write_peaks(output, &peaks)?;
    println!("{}", json!({ "peaks": peaks.peaks.len() }));
    Ok(())
}

fn cmd_format_timestamps(input: &Path, output: &Path) -> Result<()> {
    let rates = csv_io::read_rate_series(input)?;
    csv_io::write_rate_series_formatted(output, &rates)?;
    println!("{}", json!({ "rows": rates.len() }));
    Ok(())
}

fn cmd_synchronize(
    estimated: &Path,
    reference: &Path,
    out_estimated: &Path,
    out_reference: &Path,
    merged: Option<&Path>,
) -> Result<()> {
    let est = csv_io::read_rate_series_formatted(estimated)?;
    let rr = csv_io::read_rate_series_formatted(reference)?;
    let pair = synchronize(&est, &rr);
    csv_io::write_rate_series_formatted(out_estimated, &pair.a)?;
    csv_io::write_rate_series_formatted(out_reference, &pair.b)?;
    if let Some(merged_path) = merged {
        csv_io::write_merged_comparison(merged_path, &pair.b, &pair.a)?;
    }
    let bounds = match (pair.a.points.first(), pair.a.points.last()) {
        (Some(first), Some(last)) => (
            Some(timefmt::format_ms(first.timestamp)?),
            Some(timefmt::format_ms(last.timestamp)?),
        ),
        _ => (None, None),
    };
    println!(
        "{}",
        json!({
            "matched": pair.len(),
            "start": bounds.0,
            "end": bounds.1,
        })
    );
    Ok(())
}

/// Load two synchronized series and keep only rows where both sides are
/// defined. Lengths are checked before any pairing so a mismatch can never
/// be silently zipped away.
fn load_evaluation_pair(reference: &Path, estimate: &Path) -> Result<(Vec<f64>, Vec<f64>, usize)> {
    let rr = csv_io::read_rate_series_formatted(reference)?;
    let est = csv_io::read_rate_series_formatted(estimate)?;
    if rr.len() != est.len() {
        return Err(BcgError::LengthMismatch {
            reference: rr.len(),
            estimate: est.len(),
        }
        .into());
    }
    let mut ref_values = Vec::new();
    let mut est_values = Vec::new();
    let mut dropped = 0usize;
    for (r, e) in rr.points.iter().zip(&est.points) {
        match (r.bpm, e.bpm) {
            (Some(rv), Some(ev)) => {
                ref_values.push(rv);
                est_values.push(ev);
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        log::warn!("excluded {dropped} undefined pair(s) from evaluation");
    }
    Ok((ref_values, est_values, dropped))
}

fn cmd_evaluate(reference: &Path, estimate: &Path) -> Result<()> {
    let (ref_values, est_values, _) = load_evaluation_pair(reference, estimate)?;
    let report = agreement::evaluate(&ref_values, &est_values)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_plot_agreement(reference: &Path, estimate: &Path, out: &Path) -> Result<()> {
    let (ref_values, est_values, _) = load_evaluation_pair(reference, estimate)?;
    let report = agreement::evaluate(&ref_values, &est_values)?;
    let bland = bland_altman_figure(&ref_values, &est_values, &report);
    let correlation = correlation_figure(&ref_values, &est_values, &report);
    render_png(out, (1200, 500), &[bland, correlation])?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_batch(data_root: &Path, results_root: &Path, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };
    let summary = run_batch(data_root, results_root, &config)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

/// Render one or more figures side by side into a PNG.
fn render_png(path: &Path, size: (u32, u32), figures: &[Figure]) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((1, figures.len()));
    for (area, fig) in areas.iter().zip(figures) {
        draw_figure(area, fig)?;
    }
    root.present()?;
    Ok(())
}

fn draw_figure(area: &DrawingArea<BitMapBackend, Shift>, fig: &Figure) -> Result<()> {
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                xs.extend(line.points.iter().map(|p| p[0]));
                ys.extend(line.points.iter().map(|p| p[1]));
            }
            Series::Scatter(scatter) => {
                xs.extend(scatter.points.iter().map(|p| p[0]));
                ys.extend(scatter.points.iter().map(|p| p[1]));
            }
            Series::Guide(guide) => ys.push(guide.y),
        }
    }
    let (x_min, x_max) = padded_range(&xs);
    let (y_min, y_max) = padded_range(&ys);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 20),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let color = rgb(line.style.color.0);
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    color.stroke_width(line.style.width.max(1.0) as u32),
                ))?;
            }
            Series::Scatter(scatter) => {
                let color = rgb(scatter.style.color.0);
                chart.draw_series(
                    scatter
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), 2, color.filled())),
                )?;
            }
            Series::Guide(guide) => {
                let color = rgb(guide.style.color.0);
                chart.draw_series(LineSeries::new(
                    [(x_min, guide.y), (x_max, guide.y)],
                    color.stroke_width(1),
                ))?;
            }
        }
    }
    Ok(())
}

fn rgb(color: u32) -> RGBColor {
    RGBColor(
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
    )
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1e-6);
    (min - pad, max + pad)
}
