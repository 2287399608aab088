use assert_cmd::Command;
use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[derive(Deserialize)]
struct Report {
    n: usize,
    mae: f64,
    rmse: f64,
    mape: f64,
    bias: f64,
    loa_lower: f64,
    loa_upper: f64,
    pearson_r: f64,
    pearson_p: f64,
}

fn write_synced(path: &Path, values: &[&str]) {
    let mut text = String::from("Timestamp,Heart Rate\n");
    for (k, value) in values.iter().enumerate() {
        text.push_str(&format!("2023/11/10 00:00:{:02},{value}\n", k * 10));
    }
    fs::write(path, text).unwrap();
}

fn run_evaluate(reference: &Path, estimate: &Path) -> assert_cmd::assert::Assert {
    Command::cargo_bin("bcg")
        .unwrap()
        .args([
            "evaluate",
            "--reference",
            reference.to_str().unwrap(),
            "--estimate",
            estimate.to_str().unwrap(),
        ])
        .assert()
}

#[test]
fn evaluate_reports_hand_checked_statistics() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let reference = dir.path().join("rr_sync.csv");
    let estimate = dir.path().join("hr_sync.csv");
    write_synced(&reference, &["58", "57", "59", "58", "57", "58"]);
    write_synced(&estimate, &["57.5", "57.5", "60", "57", "58", "58.5"]);

    let out = run_evaluate(&reference, &estimate)
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Report = serde_json::from_slice(&out)?;
    assert_eq!(report.n, 6);
    assert!((report.mae - 0.75).abs() < 1e-9);
    assert!((report.rmse - 0.625f64.sqrt()).abs() < 1e-9);
    assert!((report.bias - 0.25).abs() < 1e-9);
    assert!(report.rmse >= report.mae);
    assert!(report.loa_lower < report.bias && report.bias < report.loa_upper);
    assert!(report.mape > 0.0);
    assert!(report.pearson_r.abs() <= 1.0);
    assert!((0.0..=1.0).contains(&report.pearson_p));
    Ok(())
}

#[test]
fn undefined_estimates_are_dropped_pairwise() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let reference = dir.path().join("rr_sync.csv");
    let estimate = dir.path().join("hr_sync.csv");
    write_synced(&reference, &["58", "57", "59", "58", "57", "58"]);
    // One undefined window travels as an empty field.
    write_synced(&estimate, &["57.5", "", "60", "57", "58", "58.5"]);

    let out = run_evaluate(&reference, &estimate)
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Report = serde_json::from_slice(&out)?;
    assert_eq!(report.n, 5);
    Ok(())
}

#[test]
fn length_mismatch_fails_without_statistics() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let reference = dir.path().join("rr_sync.csv");
    let estimate = dir.path().join("hr_sync.csv");
    write_synced(&reference, &["58", "57", "59", "58"]);
    write_synced(&estimate, &["57.5", "57.5", "60"]);

    let assert = run_evaluate(&reference, &estimate).failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("length mismatch"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn zero_reference_value_is_an_undefined_ratio() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let reference = dir.path().join("rr_sync.csv");
    let estimate = dir.path().join("hr_sync.csv");
    write_synced(&reference, &["58", "0", "59", "58"]);
    write_synced(&estimate, &["57.5", "57.5", "60", "58"]);

    let assert = run_evaluate(&reference, &estimate).failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("undefined ratio"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn plot_agreement_writes_a_png() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let reference = dir.path().join("rr_sync.csv");
    let estimate = dir.path().join("hr_sync.csv");
    let out = dir.path().join("analysis.png");
    write_synced(&reference, &["58", "57", "59", "58", "57", "58"]);
    write_synced(&estimate, &["57.5", "57.5", "60", "57", "58", "58.5"]);

    Command::cargo_bin("bcg")?
        .args([
            "plot-agreement",
            "--reference",
            reference.to_str().unwrap(),
            "--estimate",
            estimate.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert!(fs::metadata(&out)?.len() > 0);
    Ok(())
}
