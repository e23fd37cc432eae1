//! Report export.
//!
//! CSV tables for spreadsheets and plotting scripts, a JSON report for
//! machines, and box-drawn text tables for terminals.
//!
//! Undefined metrics (RMSE or bias without overlap) are written as empty CSV
//! cells and as `null` in JSON.

use crate::{link_budget_rows, AnalysisReport, RunnerError};
use propcmp_common::{FileFailure, Warning};
use propcmp_metrics::MetricRecord;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Summary table file name.
pub const SUMMARY_FILE: &str = "summary.csv";
/// Distance bins file name.
pub const DISTANCE_BINS_FILE: &str = "distance_bins.csv";
/// Buildings impact file name.
pub const BUILDINGS_DELTA_FILE: &str = "buildings_delta.csv";
/// Per-sample link budget file name.
pub const LINK_BUDGET_FILE: &str = "link_budget.csv";
/// JSON report file name.
pub const REPORT_FILE: &str = "report.json";

// ============================================================================
// Formatting
// ============================================================================

/// Format a float, without a fractional part when it is integral.
pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

/// Header of the coverage column for a threshold, e.g. `coverage_pct_-95dbm`.
pub fn coverage_header(threshold_dbm: f64) -> String {
    format!("coverage_pct_{}dbm", format_float(threshold_dbm))
}

// ============================================================================
// CSV
// ============================================================================

/// Write the summary table.
///
/// Coverage columns follow `thresholds_dbm`, one per threshold.
pub fn write_summary_csv<W: Write>(
    records: &[MetricRecord],
    thresholds_dbm: &[f64],
    out: W,
) -> Result<(), RunnerError> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header: Vec<String> = [
        "scenario",
        "model",
        "buildings",
        "frequency_bucket_mhz",
        "frequency_mhz",
        "samples",
        "mean_rx_power_dbm",
        "mean_path_loss_db",
        "mean_excess_path_loss_db",
        "std_excess_path_loss_db",
        "rmse_vs_fspl_db",
        "rmse_vs_reference_db",
        "bias_vs_reference_db",
        "matched_pairs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(thresholds_dbm.iter().map(|&t| coverage_header(t)));
    header.push("mean_sinr_db".to_string());
    header.push("mean_throughput_bound_mbps".to_string());
    writer.write_record(&header)?;

    for r in records {
        let mut row = vec![
            r.scenario.clone(),
            r.model.clone(),
            r.buildings.to_string(),
            r.frequency_bucket_mhz.map(|b| b.to_string()).unwrap_or_default(),
            format_float(r.frequency_mhz),
            r.samples.to_string(),
            format_float(r.mean_rx_power_dbm),
            format_float(r.mean_path_loss_db),
            format_float(r.mean_excess_path_loss_db),
            format_float(r.std_excess_path_loss_db),
            format_float(r.rmse_vs_fspl_db),
            format_optional(r.rmse_vs_reference_db),
            format_optional(r.bias_vs_reference_db),
            r.matched_pairs.to_string(),
        ];
        for &threshold in thresholds_dbm {
            let percent = r
                .coverage
                .iter()
                .find(|c| c.threshold_dbm == threshold)
                .map(|c| c.percent);
            row.push(format_optional(percent));
        }
        row.push(format_float(r.mean_sinr_db));
        row.push(format_float(r.mean_throughput_bound_mbps));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write any serializable rows, one struct per line, header from the field names.
pub fn write_rows_csv<W: Write, T: Serialize>(rows: &[T], out: W) -> Result<(), RunnerError> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// JSON
// ============================================================================

/// Write the report as pretty-printed JSON.
pub fn write_report_json<W: Write>(report: &AnalysisReport, out: W) -> Result<(), RunnerError> {
    serde_json::to_writer_pretty(out, report)?;
    Ok(())
}

// ============================================================================
// Output Directory
// ============================================================================

fn create(dir: &Path, name: &str) -> Result<(PathBuf, std::io::BufWriter<std::fs::File>), RunnerError> {
    let path = dir.join(name);
    let file = std::fs::File::create(&path)?;
    Ok((path, std::io::BufWriter::new(file)))
}

/// Write every export of a report into `out_dir`, creating it if needed.
///
/// Returns the written paths.
pub fn write_outputs(report: &AnalysisReport, out_dir: &Path, with_link_budget: bool) -> Result<Vec<PathBuf>, RunnerError> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    let (path, file) = create(out_dir, SUMMARY_FILE)?;
    write_summary_csv(&report.summary, &report.config.analysis.coverage_thresholds_dbm, file)?;
    written.push(path);

    let (path, file) = create(out_dir, DISTANCE_BINS_FILE)?;
    write_rows_csv(&report.distance_bins, file)?;
    written.push(path);

    let (path, file) = create(out_dir, BUILDINGS_DELTA_FILE)?;
    write_rows_csv(&report.buildings_delta, file)?;
    written.push(path);

    if with_link_budget {
        let rows = link_budget_rows(&report.dataset, &report.config.link_budget);
        let (path, file) = create(out_dir, LINK_BUDGET_FILE)?;
        write_rows_csv(&rows, file)?;
        written.push(path);
    }

    let (path, mut file) = create(out_dir, REPORT_FILE)?;
    write_report_json(report, &mut file)?;
    file.flush()?;
    written.push(path);

    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(written)
}

// ============================================================================
// Text Tables
// ============================================================================

fn cell(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", precision, v),
        _ => String::from("-"),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Print the summary table to stdout.
pub fn print_summary_table(report: &AnalysisReport) {
    println!();
    println!(
        "Reference: {}   Samples: {}   Files: {} loaded, {} failed",
        report.reference_model,
        report.samples,
        report.inputs.len(),
        report.failures.len()
    );
    println!(
        "┌{}┬{}┬{}┬{}┬{}┬{}┬{}┬{}┐",
        "─".repeat(18),
        "─".repeat(16),
        "─".repeat(9),
        "─".repeat(8),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(9),
        "─".repeat(9)
    );
    println!(
        "│ {:^16} │ {:^14} │ {:^7} │ {:^6} │ {:^8} │ {:^8} │ {:^7} │ {:^7} │",
        "Scenario", "Model", "Bldg", "N", "Rx dBm", "EPL dB", "RMSE", "Bias"
    );
    println!(
        "├{}┼{}┼{}┼{}┼{}┼{}┼{}┼{}┤",
        "─".repeat(18),
        "─".repeat(16),
        "─".repeat(9),
        "─".repeat(8),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(9),
        "─".repeat(9)
    );

    for r in &report.summary {
        println!(
            "│ {:16} │ {:14} │ {:7} │ {:>6} │ {:>8} │ {:>8} │ {:>7} │ {:>7} │",
            truncate(&r.scenario, 16),
            truncate(&r.model, 14),
            r.buildings.as_str(),
            r.samples,
            cell(Some(r.mean_rx_power_dbm), 2),
            cell(Some(r.mean_excess_path_loss_db), 2),
            cell(r.rmse_vs_reference_db, 2),
            cell(r.bias_vs_reference_db, 2)
        );
    }

    println!(
        "└{}┴{}┴{}┴{}┴{}┴{}┴{}┴{}┘",
        "─".repeat(18),
        "─".repeat(16),
        "─".repeat(9),
        "─".repeat(8),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(9),
        "─".repeat(9)
    );
    if report.excluded_groups > 0 {
        println!(
            "{} groups below {} samples not shown",
            report.excluded_groups, report.config.analysis.min_samples
        );
    }
    println!();
}

/// Print warnings and file failures to stderr. Prints nothing when there are none.
pub fn print_warnings_table(warnings: &[Warning], failures: &[FileFailure]) {
    if warnings.is_empty() && failures.is_empty() {
        return;
    }

    eprintln!();
    eprintln!("┌{}┬{}┐", "─".repeat(10), "─".repeat(78));
    eprintln!("│ {:^8} │ {:^76} │", "Kind", "Detail");
    eprintln!("├{}┼{}┤", "─".repeat(10), "─".repeat(78));
    for failure in failures {
        eprintln!("│ {:8} │ {:76} │", "failed", truncate(&failure.to_string(), 76));
    }
    for warning in warnings {
        eprintln!("│ {:8} │ {:76} │", "warning", truncate(&warning.to_string(), 76));
    }
    eprintln!("└{}┴{}┘", "─".repeat(10), "─".repeat(78));
    eprintln!();
}
