//! # propcmp-metrics
//!
//! Comparison metrics over normalized datasets.
//!
//! This crate provides:
//! - Reference alignment with RMSE and bias ([`align_dataset`])
//! - The scenario aggregator producing the summary table ([`aggregate`])
//! - Distance binning and buildings impact ([`distance_bins`], [`buildings_delta`])
//! - Line-of-sight summaries ([`los_summary`])
//!
//! Everything here is a pure batch transform: no IO, no shared state.
//! Recoverable conditions come back as [`Warning`](propcmp_common::Warning)
//! values next to the results.

pub mod aggregate;
pub mod alignment;
pub mod binning;
pub mod los;

pub use aggregate::{aggregate, MetricRecord, SummaryTable};
pub use alignment::{align_dataset, align_samples, error_metrics, ErrorMetrics, ReferenceAlignment, ScopeAlignment};
pub use binning::{bin_index, buildings_delta, distance_bins, excess_path_loss_db, BuildingsDelta, DistanceBin};
pub use los::{los_ratio, los_summary, LosSource, LosSummary};
