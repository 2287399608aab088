//! Agreement statistics between a reference and an estimated rate series.
//!
//! Inputs must already be synchronized: equal length, element i of both
//! series describing the same instant. The evaluator never truncates or
//! pads to force agreement; a length mismatch is the caller's bug and is
//! reported as such.

use crate::error::{BcgError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Error and agreement statistics of estimate vs. reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Agreement {
    pub n: usize,
    /// Mean absolute error (bpm).
    pub mae: f64,
    /// Root-mean-square error (bpm); never below `mae`.
    pub rmse: f64,
    /// Mean absolute percentage error (%).
    pub mape: f64,
    /// Bland-Altman bias: mean(estimate - reference).
    pub bias: f64,
    pub loa_lower: f64,
    pub loa_upper: f64,
    pub pearson_r: f64,
    /// Two-sided p-value for `pearson_r`.
    pub pearson_p: f64,
}

/// Compute agreement statistics for two equal-length series.
///
/// A reference value of exactly zero makes MAPE undefined and fails the
/// evaluation rather than folding an infinity into the mean.
pub fn evaluate(reference: &[f64], estimate: &[f64]) -> Result<Agreement> {
    if reference.len() != estimate.len() {
        return Err(BcgError::LengthMismatch {
            reference: reference.len(),
            estimate: estimate.len(),
        });
    }
    if reference.is_empty() {
        return Err(BcgError::EmptyOverlap);
    }
    let n = reference.len();
    if n < 3 {
        return Err(BcgError::input(format!(
            "agreement statistics need at least 3 paired samples, got {n}"
        )));
    }
    let n_f = n as f64;

    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut diff_sum = 0.0;
    for (i, (&r, &e)) in reference.iter().zip(estimate).enumerate() {
        let diff = e - r;
        abs_sum += diff.abs();
        sq_sum += diff * diff;
        diff_sum += diff;
        if r == 0.0 {
            return Err(BcgError::UndefinedRatio { index: i });
        }
        pct_sum += (diff / r).abs();
    }
    let mae = abs_sum / n_f;
    let rmse = (sq_sum / n_f).sqrt();
    let mape = pct_sum / n_f * 100.0;

    let bias = diff_sum / n_f;
    let sd_diff = (reference
        .iter()
        .zip(estimate)
        .map(|(&r, &e)| {
            let d = (e - r) - bias;
            d * d
        })
        .sum::<f64>()
        / (n_f - 1.0))
        .sqrt();
    let loa_lower = bias - 1.96 * sd_diff;
    let loa_upper = bias + 1.96 * sd_diff;

    let (pearson_r, pearson_p) = pearson(reference, estimate)?;

    Ok(Agreement {
        n,
        mae,
        rmse,
        mape,
        bias,
        loa_lower,
        loa_upper,
        pearson_r,
        pearson_p,
    })
}

/// Pearson correlation coefficient with its two-sided p-value from the
/// Student-t transform.
fn pearson(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return Err(BcgError::input(
            "correlation is undefined for a zero-variance series",
        ));
    }
    let r = (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0);

    let dof = n - 2.0;
    let one_minus_r2 = 1.0 - r * r;
    let p = if one_minus_r2 <= 1e-12 {
        0.0
    } else {
        let t = r.abs() * (dof / one_minus_r2).sqrt();
        let dist = StudentsT::new(0.0, 1.0, dof)
            .map_err(|e| BcgError::input(format!("t-distribution setup failed: {e}")))?;
        2.0 * (1.0 - dist.cdf(t))
    };
    Ok((r, p))
}
