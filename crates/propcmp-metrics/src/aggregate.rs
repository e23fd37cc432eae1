//! Scenario aggregation.
//!
//! Groups a dataset by [`GroupKey`] and produces one [`MetricRecord`] per
//! group, sorted by scenario, then model, then buildings state.

use crate::alignment::{align_dataset, ErrorMetrics, ReferenceAlignment};
use crate::binning::excess_path_loss_db;
use propcmp_common::{stats, Buildings, Dataset, GroupKey, Sample, Warning};
use propcmp_link::{coverage_table, free_space_rx_power_dbm, CoverageRatio, LinkBudgetConfig};
use propcmp_model::AnalysisConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// One row of the summary table. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    /// Scenario identifier.
    pub scenario: String,
    /// Propagation model.
    pub model: String,
    /// Buildings state.
    pub buildings: Buildings,
    /// Frequency bucket (whole MHz) when groups are split by frequency.
    pub frequency_bucket_mhz: Option<i64>,
    /// Mean transmit frequency of the group (MHz).
    pub frequency_mhz: f64,
    /// Rows in the group.
    pub samples: usize,
    /// Mean received power (dBm).
    pub mean_rx_power_dbm: f64,
    /// Mean path loss, `tx - rx` (dB).
    pub mean_path_loss_db: f64,
    /// Mean excess path loss over free space at each row's distance and frequency (dB).
    pub mean_excess_path_loss_db: f64,
    /// Population standard deviation of the excess path loss (dB).
    pub std_excess_path_loss_db: f64,
    /// RMSE of received power against analytical free space (dB).
    pub rmse_vs_fspl_db: f64,
    /// RMSE against the reference model. `None` when undefined.
    pub rmse_vs_reference_db: Option<f64>,
    /// Bias against the reference model. `None` when undefined.
    pub bias_vs_reference_db: Option<f64>,
    /// Pairs matched against the reference.
    pub matched_pairs: usize,
    /// Coverage per configured threshold, in configuration order.
    pub coverage: Vec<CoverageRatio>,
    /// Mean SINR (dB).
    pub mean_sinr_db: f64,
    /// Mean capacity-bounded throughput (Mbit/s). An upper bound, not an achievable rate.
    pub mean_throughput_bound_mbps: f64,
}

impl MetricRecord {
    /// The group this record describes.
    pub fn key(&self) -> GroupKey {
        GroupKey {
            scenario: self.scenario.clone(),
            model: self.model.clone(),
            buildings: self.buildings,
            frequency_bucket: self.frequency_bucket_mhz,
        }
    }
}

/// Output of [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryTable {
    /// One record per group, sorted.
    pub records: Vec<MetricRecord>,
    /// Alignment the RMSE and bias columns were taken from.
    pub alignment: ReferenceAlignment,
    /// Conditions raised while aggregating.
    pub warnings: Vec<Warning>,
}

fn mean_or_nan(values: &[f64]) -> f64 {
    stats::mean(values).unwrap_or(f64::NAN)
}

/// Group a dataset and compute one record per group.
///
/// Emits every group regardless of size.
pub fn aggregate(dataset: &Dataset, config: &AnalysisConfig) -> SummaryTable {
    let split = config.analysis.split_by_frequency;
    let alignment = align_dataset(dataset, &config.analysis.reference_model, split);

    let mut groups: BTreeMap<GroupKey, Vec<&Sample>> = BTreeMap::new();
    for sample in dataset {
        groups.entry(GroupKey::of(sample, split)).or_default().push(sample);
    }

    let records: Vec<MetricRecord> = groups
        .iter()
        .map(|(key, rows)| {
            summarize_group(key, rows, alignment.metrics_for(key), config)
        })
        .collect();

    info!(
        "Aggregated {} samples into {} groups (reference '{}')",
        dataset.len(),
        records.len(),
        config.analysis.reference_model
    );

    SummaryTable {
        records,
        warnings: alignment.warnings.clone(),
        alignment,
    }
}

fn summarize_group(
    key: &GroupKey,
    rows: &[&Sample],
    reference: Option<&ErrorMetrics>,
    config: &AnalysisConfig,
) -> MetricRecord {
    let rx: Vec<f64> = rows.iter().map(|s| s.rx_power_dbm).collect();
    let frequency: Vec<f64> = rows.iter().map(|s| s.frequency_mhz).collect();
    let path_loss: Vec<f64> = rows.iter().map(|s| s.path_loss_db()).collect();
    let epl: Vec<f64> = rows.iter().map(|s| excess_path_loss_db(s)).collect();
    let fspl_error: Vec<f64> = rows
        .iter()
        .map(|s| s.rx_power_dbm - free_space_rx_power_dbm(s.tx_power_dbm, s.distance_m, s.frequency_mhz))
        .collect();

    let (sinr, throughput) = link_budget_means(rows, &config.link_budget);

    MetricRecord {
        scenario: key.scenario.clone(),
        model: key.model.clone(),
        buildings: key.buildings,
        frequency_bucket_mhz: key.frequency_bucket,
        frequency_mhz: mean_or_nan(&frequency),
        samples: rows.len(),
        mean_rx_power_dbm: mean_or_nan(&rx),
        mean_path_loss_db: mean_or_nan(&path_loss),
        mean_excess_path_loss_db: mean_or_nan(&epl),
        std_excess_path_loss_db: stats::std_dev(&epl).unwrap_or(f64::NAN),
        rmse_vs_fspl_db: stats::rms(&fspl_error).unwrap_or(f64::NAN),
        rmse_vs_reference_db: reference.map(|m| m.rmse_db),
        bias_vs_reference_db: reference.map(|m| m.bias_db),
        matched_pairs: reference.map(|m| m.matched).unwrap_or(0),
        coverage: coverage_table(&rx, &config.analysis.coverage_thresholds_dbm),
        mean_sinr_db: sinr,
        mean_throughput_bound_mbps: throughput,
    }
}

fn link_budget_means(rows: &[&Sample], link: &LinkBudgetConfig) -> (f64, f64) {
    let budgets: Vec<_> = rows
        .iter()
        .map(|s| link.evaluate(s.rx_power_dbm, s.interference_dbm))
        .collect();
    let sinr: Vec<f64> = budgets.iter().map(|b| b.sinr_db).collect();
    let throughput: Vec<f64> = budgets.iter().map(|b| b.throughput_bound_mbps).collect();
    (mean_or_nan(&sinr), mean_or_nan(&throughput))
}
