//! Integration tests for the propcmp binary.
//!
//! These tests write CSV exports to a temporary directory, run the binary on
//! them and check the JSON report and exported files.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

use propcmp_link::free_space_rx_power_dbm;
use serde::Deserialize;

// ============================================================================
// JSON Deserialization Types for the Report
// ============================================================================

#[derive(Debug, Deserialize)]
struct Report {
    inputs: Vec<String>,
    failures: Vec<Failure>,
    warnings: Vec<serde_json::Value>,
    samples: usize,
    summary: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Failure {
    path: String,
    error: String,
}

#[derive(Debug, Deserialize)]
struct Record {
    scenario: String,
    model: String,
    samples: usize,
    rmse_vs_reference_db: Option<f64>,
    bias_vs_reference_db: Option<f64>,
    matched_pairs: usize,
}

// ============================================================================
// Test Helper Functions
// ============================================================================

const HEADER: &str = "scenario,propagation_model,frequency_mhz,tx_power_dbm,distance_m,rx_power_dbm\n";

fn run(args: &[&str]) -> Output {
    // CARGO_BIN_EXE_propcmp is set by cargo when running tests for this crate
    let binary = env!("CARGO_BIN_EXE_propcmp");
    Command::new(binary)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute propcmp")
}

fn run_ok(args: &[&str]) -> String {
    let output = run(args);
    if !output.status.success() {
        panic!(
            "propcmp failed:\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn analyze_json(args: &[&str]) -> Report {
    let mut full = vec!["analyze", "--format", "json"];
    full.extend_from_slice(args);
    let stdout = run_ok(&full);
    serde_json::from_str(&stdout).expect("Failed to parse report JSON")
}

/// Rows for `model`, offset from free space by `offset_db`.
fn rows(scenario: &str, model: &str, distances: &[f64], offset_db: f64) -> String {
    distances
        .iter()
        .map(|&d| {
            let rx = free_space_rx_power_dbm(30.0, d, 3500.0) + offset_db;
            format!("{},{},3500,30,{},{}\n", scenario, model, d, rx)
        })
        .collect()
}

fn write_csv(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), format!("{}{}", HEADER, body)).expect("Failed to write CSV");
}

fn record<'a>(report: &'a Report, model: &str) -> &'a Record {
    report
        .summary
        .iter()
        .find(|r| r.model == model)
        .unwrap_or_else(|| panic!("no record for {}", model))
}

const DISTANCES: [f64; 5] = [10.0, 20.0, 30.0, 40.0, 50.0];

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_constant_offset_against_reference() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "free_space.csv", &rows("S1", "FreeSpace", &DISTANCES, 0.0));
    write_csv(dir.path(), "log_distance.csv", &rows("S1", "LogD", &DISTANCES, -5.0));

    let report = analyze_json(&[dir.path().to_str().unwrap(), "--min-samples", "1"]);
    assert_eq!(report.inputs.len(), 2);
    assert_eq!(report.samples, 10);
    assert_eq!(report.summary.len(), 2);

    let reference = record(&report, "FreeSpace");
    assert_eq!(reference.rmse_vs_reference_db, Some(0.0));
    assert_eq!(reference.bias_vs_reference_db, Some(0.0));

    let logd = record(&report, "LogD");
    assert_eq!(logd.scenario, "S1");
    assert_eq!(logd.samples, 5);
    assert_eq!(logd.matched_pairs, 5);
    assert!((logd.rmse_vs_reference_db.unwrap() - 5.0).abs() < 1e-9);
    assert!((logd.bias_vs_reference_db.unwrap() + 5.0).abs() < 1e-9);
    assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
}

#[test]
fn test_no_overlap_reports_undefined_metrics() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{}{}",
        rows("S1", "FreeSpace", &[10.0, 20.0, 30.0], 0.0),
        rows("S1", "Hata", &[15.0, 25.0, 35.0], -3.0)
    );
    write_csv(dir.path(), "mixed.csv", &body);

    let report = analyze_json(&[dir.path().to_str().unwrap(), "--min-samples", "1"]);
    let hata = record(&report, "Hata");
    assert_eq!(hata.rmse_vs_reference_db, None);
    assert_eq!(hata.bias_vs_reference_db, None);
    assert_eq!(hata.matched_pairs, 0);
    assert!(report
        .warnings
        .iter()
        .any(|w| w["kind"] == "no_overlap_for_model" && w["model"] == "Hata"));
}

#[test]
fn test_min_samples_excludes_small_groups() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "small.csv", &rows("S1", "FreeSpace", &DISTANCES, 0.0));

    let report = analyze_json(&[dir.path().to_str().unwrap(), "--min-samples", "6"]);
    assert!(report.summary.is_empty());
    assert!(report
        .warnings
        .iter()
        .any(|w| w["kind"] == "below_minimum_samples"));
}

#[test]
fn test_config_file_then_cli_override() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    write_csv(&data, "a.csv", &rows("S1", "FreeSpace", &DISTANCES, 0.0));
    write_csv(&data, "b.csv", &rows("S1", "LogD", &DISTANCES, -5.0));

    let config = dir.path().join("config.yaml");
    fs::write(&config, "analysis:\n  reference_model: LogD\n  min_samples: 1\n").unwrap();

    let report = analyze_json(&["--config", config.to_str().unwrap(), data.to_str().unwrap()]);
    assert!((record(&report, "FreeSpace").bias_vs_reference_db.unwrap() - 5.0).abs() < 1e-9);
    assert_eq!(record(&report, "LogD").bias_vs_reference_db, Some(0.0));

    let report = analyze_json(&[
        "--config",
        config.to_str().unwrap(),
        data.to_str().unwrap(),
        "--reference",
        "FreeSpace",
    ]);
    assert!((record(&report, "LogD").bias_vs_reference_db.unwrap() + 5.0).abs() < 1e-9);
}

#[test]
fn test_invalid_file_is_isolated() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "good.csv", &rows("S1", "FreeSpace", &DISTANCES, 0.0));
    fs::write(dir.path().join("broken.csv"), "scenario,distance_m\nS1,10\n").unwrap();

    let out_dir = dir.path().join("out");
    let report = analyze_json(&[
        dir.path().to_str().unwrap(),
        "--min-samples",
        "1",
        "--out-dir",
        out_dir.to_str().unwrap(),
        "--link-budget",
    ]);

    assert_eq!(report.inputs.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("broken.csv"));
    assert!(report.failures[0].error.contains("rx_power_dbm"));

    for name in ["summary.csv", "distance_bins.csv", "buildings_delta.csv", "link_budget.csv", "report.json"] {
        assert!(out_dir.join(name).exists(), "{} not written", name);
    }
    let summary = fs::read_to_string(out_dir.join("summary.csv")).unwrap();
    assert!(summary.starts_with("scenario,model,buildings,"));
    assert_eq!(summary.lines().count(), 2);

    let link_budget = fs::read_to_string(out_dir.join("link_budget.csv")).unwrap();
    assert!(link_budget.lines().next().unwrap().contains("throughput_bound_mbps"));
    assert_eq!(link_budget.lines().count(), 6);
}

#[test]
fn test_unbinnable_distance_keeps_other_files() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "a.csv", &rows("S1", "FreeSpace", &DISTANCES, 0.0));
    write_csv(dir.path(), "b.csv", "S2,LogD,3500,30,1e300,-150\n");

    let out_dir = dir.path().join("out");
    let report = analyze_json(&[
        dir.path().to_str().unwrap(),
        "--min-samples",
        "1",
        "--out-dir",
        out_dir.to_str().unwrap(),
    ]);
    assert_eq!(report.inputs.len(), 2);
    assert_eq!(report.samples, 6);
    assert_eq!(record(&report, "FreeSpace").samples, 5);
    assert!(out_dir.join("distance_bins.csv").exists());
}

#[test]
fn test_empty_input_set_fails() {
    let dir = TempDir::new().unwrap();
    let output = run(&["analyze", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no input files"), "stderr: {}", stderr);
}

#[test]
fn test_all_files_invalid_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.csv"), "scenario\nS1\n").unwrap();
    let output = run(&["analyze", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could be loaded"), "stderr: {}", stderr);
}

#[test]
fn test_text_output_lists_models() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "free_space.csv", &rows("S1", "FreeSpace", &DISTANCES, 0.0));
    write_csv(dir.path(), "log_distance.csv", &rows("S1", "LogD", &DISTANCES, -5.0));

    let stdout = run_ok(&["analyze", dir.path().to_str().unwrap(), "--min-samples", "1", "--jobs", "2"]);
    assert!(stdout.contains("FreeSpace"));
    assert!(stdout.contains("LogD"));
    assert!(stdout.contains("-5.00"));
}

#[test]
fn test_fspl_forms_agree() {
    let stdout = run_ok(&["fspl", "--distance", "1000", "--frequency", "2400", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let constant_form = value["fspl_db"].as_f64().unwrap();
    let wavelength_form = value["fspl_wavelength_db"].as_f64().unwrap();
    assert!((constant_form - wavelength_form).abs() < 1e-9);
    assert!((constant_form - 100.05).abs() < 0.01);
    assert!((value["rx_power_dbm"].as_f64().unwrap() - (30.0 - constant_form)).abs() < 1e-9);
}

#[test]
fn test_coverage_command() {
    let stdout = run_ok(&["coverage", "--threshold=-95", "--format", "json", "-90", "-100"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["samples"], 2);
    assert_eq!(value["coverage"][0]["threshold_dbm"], -95.0);
    assert_eq!(value["coverage"][0]["percent"], 50.0);
}

#[test]
fn test_link_budget_command() {
    let stdout = run_ok(&["link-budget", "--rx-power=-60", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    // -60 dBm is far above the 20 MHz noise floor, so the cap applies.
    assert_eq!(value["result"]["spectral_efficiency"], 7.6);
    assert!((value["result"]["throughput_bound_mbps"].as_f64().unwrap() - 152.0).abs() < 1e-9);
}

#[test]
fn test_link_budget_rejects_negative_bandwidth() {
    let output = run(&["link-budget", "--rx-power=-60", "--bandwidth=-5e6"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bandwidth_hz"), "stderr: {}", stderr);
}

#[test]
fn test_columns_command() {
    let stdout = run_ok(&["columns"]);
    assert!(stdout.contains("rx_power_dbm"));
    assert!(stdout.contains("rsrp"));
    assert!(stdout.contains("propagation_model"));
}
