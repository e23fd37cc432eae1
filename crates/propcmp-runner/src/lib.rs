//! # propcmp-runner
//!
//! Batch pipeline for comparing propagation model exports.
//!
//! This crate provides:
//! - Input discovery over files and directories ([`discover_inputs`])
//! - CSV ingestion into raw tables ([`read_csv_table`])
//! - Per-file normalization with failure isolation ([`load_inputs`])
//! - The complete analysis run ([`run_analysis`]) and its [`AnalysisReport`]
//! - Export of the report to CSV and JSON ([`export`])
//!
//! A file that cannot be read or normalized is recorded as a
//! [`FileFailure`] and the batch continues. Only a run with no input files, or
//! with no file that could be loaded, is a hard error.

pub mod export;

use propcmp_common::{Dataset, FileFailure, Warning};
use propcmp_link::LinkBudgetConfig;
use propcmp_metrics::{
    aggregate, buildings_delta, distance_bins, los_summary, BuildingsDelta, DistanceBin, LosSummary,
    MetricRecord, ReferenceAlignment,
};
use propcmp_model::{AnalysisConfig, ConfigError, NormalizeConfig, Normalizer, RawTable};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// No input file was found.
    #[error("no input files found in: {}", .searched.join(", "))]
    EmptyInputSet {
        /// Paths that were searched.
        searched: Vec<String>,
    },

    /// Every input file failed to load.
    #[error("none of the {} input files could be loaded", .failed.len())]
    NoUsableInput {
        /// Per-file failures.
        failed: Vec<FileFailure>,
    },
}

// ============================================================================
// Input Discovery
// ============================================================================

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Expand paths into the list of input files.
///
/// Files are taken as given. Directories contribute their `*.csv` entries
/// (non-recursive). Paths that do not exist are skipped with a warning. The
/// result is sorted and deduplicated.
pub fn discover_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, RunnerError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let entry_path = entry?.path();
                if entry_path.is_file() && is_csv(&entry_path) {
                    files.push(entry_path);
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            warn!("Input path not found: {}", path.display());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

// ============================================================================
// Loading
// ============================================================================

/// Read a CSV file into a raw table.
///
/// Rows may be shorter or longer than the header.
pub fn read_csv_table(path: &Path) -> Result<RawTable, RunnerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(RawTable::new(path.display().to_string(), stem, headers, rows))
}

/// Result of loading a set of files.
#[derive(Debug, Clone, Default)]
pub struct LoadedInputs {
    /// Samples of every file that loaded, in path order.
    pub dataset: Dataset,
    /// Files that loaded.
    pub loaded: Vec<String>,
    /// Normalization warnings, in path order.
    pub warnings: Vec<Warning>,
    /// Files that failed.
    pub failures: Vec<FileFailure>,
}

fn load_file(path: &Path, normalize: &NormalizeConfig) -> Result<propcmp_model::NormalizedFile, String> {
    let table = read_csv_table(path).map_err(|e| e.to_string())?;
    Normalizer::new(normalize)
        .normalize(&table)
        .map_err(|e| e.to_string())
}

/// Load and normalize every file.
///
/// With `parallel`, files are processed on the rayon pool. Results are
/// merged in input order either way, so the dataset is identical.
pub fn load_inputs(files: &[PathBuf], normalize: &NormalizeConfig, parallel: bool) -> LoadedInputs {
    let results: Vec<_> = if parallel {
        files.par_iter().map(|p| load_file(p, normalize)).collect()
    } else {
        files.iter().map(|p| load_file(p, normalize)).collect()
    };

    let mut loaded = LoadedInputs::default();
    for (path, result) in files.iter().zip(results) {
        let path = path.display().to_string();
        match result {
            Ok(file) => {
                debug!("Loaded {} samples from {}", file.dataset.len(), path);
                loaded.dataset.extend(file.dataset);
                loaded.warnings.extend(file.warnings);
                loaded.loaded.push(path);
            }
            Err(error) => {
                warn!("Skipping {}: {}", path, error);
                loaded.failures.push(FileFailure { path, error });
            }
        }
    }
    loaded
}

// ============================================================================
// Analysis
// ============================================================================

/// Drop records with fewer than `min_samples` rows.
pub fn apply_min_samples(records: Vec<MetricRecord>, min_samples: usize) -> (Vec<MetricRecord>, Vec<Warning>) {
    let mut warnings = Vec::new();
    let kept = records
        .into_iter()
        .filter(|r| {
            if r.samples >= min_samples {
                return true;
            }
            warnings.push(Warning::BelowMinimumSamples {
                group: format!("{}/{} (buildings {})", r.scenario, r.model, r.buildings),
                count: r.samples,
                minimum: min_samples,
            });
            false
        })
        .collect();
    (kept, warnings)
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Files that loaded.
    pub inputs: Vec<String>,
    /// Files that failed, with the reason.
    pub failures: Vec<FileFailure>,
    /// Every warning raised during the run.
    pub warnings: Vec<Warning>,
    /// Reference model name.
    pub reference_model: String,
    /// Samples analyzed, after filtering.
    pub samples: usize,
    /// Summary table, groups below the minimum size removed.
    pub summary: Vec<MetricRecord>,
    /// Number of groups removed by the minimum size.
    pub excluded_groups: usize,
    /// Per-bin aggregates.
    pub distance_bins: Vec<DistanceBin>,
    /// Buildings off minus on, per bin.
    pub buildings_delta: Vec<BuildingsDelta>,
    /// LOS summary per comparison scope.
    pub los: Vec<LosSummary>,
    /// Alignment details per scope.
    pub alignment: ReferenceAlignment,
    /// Configuration the run used.
    pub config: AnalysisConfig,
    /// Analyzed samples, for per-sample exports.
    #[serde(skip)]
    pub dataset: Dataset,
}

/// Run the full analysis over the given files and directories.
pub fn run_analysis(paths: &[PathBuf], config: &AnalysisConfig, parallel: bool) -> Result<AnalysisReport, RunnerError> {
    let files = discover_inputs(paths)?;
    if files.is_empty() {
        return Err(RunnerError::EmptyInputSet {
            searched: paths.iter().map(|p| p.display().to_string()).collect(),
        });
    }
    info!("Loading {} input files", files.len());

    let loaded = load_inputs(&files, &config.normalize, parallel);
    if loaded.loaded.is_empty() {
        return Err(RunnerError::NoUsableInput {
            failed: loaded.failures,
        });
    }

    let dataset = config.filter.apply(&loaded.dataset);
    if dataset.len() != loaded.dataset.len() {
        info!("Filter kept {} of {} samples", dataset.len(), loaded.dataset.len());
    }

    let table = aggregate(&dataset, config);
    let total_groups = table.records.len();
    let (summary, gate_warnings) = apply_min_samples(table.records, config.analysis.min_samples);

    let mut warnings = loaded.warnings;
    warnings.extend(table.warnings);
    warnings.extend(gate_warnings);
    for w in &warnings {
        warn!("{}", w);
    }

    let bin_width = config.analysis.distance_bin_m;
    let report = AnalysisReport {
        inputs: loaded.loaded,
        failures: loaded.failures,
        warnings,
        reference_model: config.analysis.reference_model.clone(),
        samples: dataset.len(),
        excluded_groups: total_groups - summary.len(),
        summary,
        distance_bins: distance_bins(&dataset, bin_width),
        buildings_delta: buildings_delta(&dataset, bin_width),
        los: los_summary(
            &dataset,
            &config.analysis.reference_model,
            config.analysis.los_boundary_m,
            config.analysis.split_by_frequency,
        ),
        alignment: table.alignment,
        config: config.clone(),
        dataset,
    };

    info!(
        "Analyzed {} samples: {} groups reported, {} excluded, {} warnings",
        report.samples,
        report.summary.len(),
        report.excluded_groups,
        report.warnings.len()
    );
    Ok(report)
}

// ============================================================================
// Per-Sample Link Budget
// ============================================================================

/// Link budget of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkBudgetRow {
    /// Scenario identifier.
    pub scenario: String,
    /// Propagation model.
    pub model: String,
    /// Buildings state.
    pub buildings: propcmp_common::Buildings,
    /// Distance (m).
    pub distance_m: f64,
    /// Received power (dBm).
    pub rx_power_dbm: f64,
    /// Interference power (dBm), when exported.
    pub interference_dbm: Option<f64>,
    /// SINR (dB).
    pub sinr_db: f64,
    /// Capacity-bounded throughput (Mbit/s). An upper bound, not an achievable rate.
    pub throughput_bound_mbps: f64,
}

/// Evaluate the link budget of every sample.
pub fn link_budget_rows(dataset: &Dataset, link: &LinkBudgetConfig) -> Vec<LinkBudgetRow> {
    dataset
        .iter()
        .map(|s| {
            let budget = link.evaluate(s.rx_power_dbm, s.interference_dbm);
            LinkBudgetRow {
                scenario: s.scenario.clone(),
                model: s.model.clone(),
                buildings: s.buildings,
                distance_m: s.distance_m,
                rx_power_dbm: s.rx_power_dbm,
                interference_dbm: s.interference_dbm,
                sinr_db: budget.sinr_db,
                throughput_bound_mbps: budget.throughput_bound_mbps,
            }
        })
        .collect()
}
