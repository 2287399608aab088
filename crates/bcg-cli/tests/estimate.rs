use assert_cmd::Command;
use serde::Deserialize;
use std::error::Error;
use std::fs;
use tempfile::tempdir;

#[derive(Deserialize)]
struct EstimateOutput {
    windows: usize,
    defined: usize,
    undefined: usize,
}

/// Resampled 50 Hz fixture with one deflection per second: 60 BPM.
fn write_resampled_fixture(path: &std::path::Path, seconds: f64) {
    let fs = 50.0;
    let n = (fs * seconds) as usize;
    let mut text = String::from("BCG,Timestamp,fs\n");
    for i in 0..n {
        let t = i as f64 / fs;
        let mut bump = 0.0f64;
        let mut bt = 0.5;
        while bt < seconds {
            bump += (-0.5 * ((t - bt) / 0.05).powi(2)).exp();
            bt += 1.0;
        }
        let value = (500.0 + 400.0 * bump).trunc() as i64;
        text.push_str(&format!("{value},{},50\n", i as i64 * 20));
    }
    fs::write(path, text).unwrap();
}

#[test]
fn estimate_hr_measures_sixty_bpm_per_window() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("resampled.csv");
    let output = dir.path().join("hr.csv");
    write_resampled_fixture(&input, 30.0);

    let mut cmd = Command::cargo_bin("bcg")?;
    let out = cmd
        .args([
            "estimate-hr",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: EstimateOutput = serde_json::from_slice(&out)?;
    assert_eq!(summary.windows, 3);
    assert_eq!(summary.defined, 3);
    assert_eq!(summary.undefined, 0);

    let contents = fs::read_to_string(&output)?;
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("Timestamp,Heart Rate"));
    for (w, line) in lines.enumerate() {
        let mut fields = line.split(',');
        let timestamp: i64 = fields.next().unwrap().parse()?;
        let bpm: f64 = fields.next().unwrap().parse()?;
        assert_eq!(timestamp, w as i64 * 10_000);
        assert!((bpm - 60.0).abs() < 2.0, "window {w}: {bpm}");
    }
    Ok(())
}

#[test]
fn detect_peaks_lists_one_peak_per_beat() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("resampled.csv");
    let output = dir.path().join("jpeaks.csv");
    write_resampled_fixture(&input, 20.0);

    let mut cmd = Command::cargo_bin("bcg")?;
    let out = cmd
        .args([
            "detect-peaks",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&out)?;
    let count = summary["peaks"].as_u64().unwrap();
    assert!((19..=20).contains(&count), "got {count} peaks");

    let contents = fs::read_to_string(&output)?;
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("Timestamp,Amplitude,SampleIndex"));
    let mut last_index: i64 = -1;
    for line in lines {
        let index: i64 = line.split(',').nth(2).unwrap().parse()?;
        assert!(index > last_index, "indices must be strictly increasing");
        last_index = index;
    }
    Ok(())
}

#[test]
fn estimate_hr_renders_a_plot_when_asked() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("resampled.csv");
    let output = dir.path().join("hr.csv");
    let plot = dir.path().join("hr.png");
    write_resampled_fixture(&input, 20.0);

    Command::cargo_bin("bcg")?
        .args([
            "estimate-hr",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--plot",
            plot.to_str().unwrap(),
        ])
        .assert()
        .success();
    let metadata = fs::metadata(&plot)?;
    assert!(metadata.len() > 0);
    Ok(())
}

#[test]
fn too_short_signal_reports_filter_length() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("resampled.csv");
    let mut text = String::from("BCG,Timestamp,fs\n");
    for i in 0..10 {
        text.push_str(&format!("500,{},50\n", i * 20));
    }
    fs::write(&input, text)?;

    let assert = Command::cargo_bin("bcg")?
        .args([
            "estimate-hr",
            "--input",
            input.to_str().unwrap(),
            "--output",
            dir.path().join("hr.csv").to_str().unwrap(),
        ])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("too short"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn unknown_filter_profile_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("resampled.csv");
    write_resampled_fixture(&input, 20.0);

    Command::cargo_bin("bcg")?
        .args([
            "estimate-hr",
            "--input",
            input.to_str().unwrap(),
            "--output",
            dir.path().join("hr.csv").to_str().unwrap(),
            "--filter-profile",
            "seismo",
        ])
        .assert()
        .failure();
    Ok(())
}
