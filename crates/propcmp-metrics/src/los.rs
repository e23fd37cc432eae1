//! Line-of-sight summary.
//!
//! When every row of a scope carries an `is_los` flag, the flag decides.
//! Otherwise rows closer than the configured boundary count as LOS.

use crate::alignment::{align_scope, partition_by_scope, ErrorMetrics};
use propcmp_common::{Dataset, Sample, ScopeKey};
use serde::Serialize;
use std::collections::BTreeMap;

/// How LOS was decided for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LosSource {
    /// Exported `is_los` flags.
    Flag,
    /// Distance at or below the LOS boundary.
    Distance,
}

/// LOS share and LOS-only alignment of one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LosSummary {
    /// Comparison scope.
    pub scope: String,
    /// Rows in the scope.
    pub samples: usize,
    /// Rows counted as LOS.
    pub los_samples: usize,
    /// `los_samples / samples`.
    pub los_ratio: f64,
    /// How LOS was decided.
    pub source: LosSource,
    /// Alignment against the reference using LOS rows only.
    pub los_alignment: BTreeMap<String, ErrorMetrics>,
}

fn los_source(samples: &[&Sample]) -> LosSource {
    if !samples.is_empty() && samples.iter().all(|s| s.is_los.is_some()) {
        LosSource::Flag
    } else {
        LosSource::Distance
    }
}

fn is_los(sample: &Sample, source: LosSource, boundary_m: f64) -> bool {
    match source {
        LosSource::Flag => sample.is_los.unwrap_or(false),
        LosSource::Distance => sample.distance_m <= boundary_m,
    }
}

/// Fraction of samples in LOS. `None` for no samples.
pub fn los_ratio(samples: &[&Sample], boundary_m: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let source = los_source(samples);
    let los = samples.iter().filter(|s| is_los(s, source, boundary_m)).count();
    Some(los as f64 / samples.len() as f64)
}

/// LOS summary for each comparison scope, in scope order.
pub fn los_summary(
    dataset: &Dataset,
    reference: &str,
    boundary_m: f64,
    split_by_frequency: bool,
) -> Vec<LosSummary> {
    partition_by_scope(dataset, split_by_frequency)
        .into_iter()
        .map(|(scope, models)| summarize_scope(&scope, &models, reference, boundary_m))
        .collect()
}

fn summarize_scope(
    scope: &ScopeKey,
    models: &BTreeMap<&str, Vec<&Sample>>,
    reference: &str,
    boundary_m: f64,
) -> LosSummary {
    let all: Vec<&Sample> = models.values().flatten().copied().collect();
    let source = los_source(&all);

    let los_models: BTreeMap<&str, Vec<&Sample>> = models
        .iter()
        .map(|(&model, rows)| {
            let los_rows: Vec<&Sample> = rows
                .iter()
                .copied()
                .filter(|s| is_los(s, source, boundary_m))
                .collect();
            (model, los_rows)
        })
        .filter(|(_, rows)| !rows.is_empty())
        .collect();
    let los_samples: usize = los_models.values().map(Vec::len).sum();

    // Overlap conditions are already reported by the full alignment.
    let mut ignored = Vec::new();
    let los_alignment = align_scope(scope, &los_models, reference, &mut ignored).metrics;

    LosSummary {
        scope: scope.to_string(),
        samples: all.len(),
        los_samples,
        los_ratio: los_samples as f64 / all.len().max(1) as f64,
        source,
        los_alignment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(model: &str, distance_m: f64, rx: f64) -> Sample {
        Sample::new("S1", model, 3500.0, 30.0, distance_m, rx)
    }

    #[test]
    fn test_ratio_by_distance() {
        let rows = [sample("A", 50.0, -60.0), sample("A", 100.0, -70.0), sample("A", 150.0, -80.0), sample("A", 300.0, -90.0)];
        let refs: Vec<&Sample> = rows.iter().collect();
        assert_eq!(los_ratio(&refs, 100.0), Some(0.5));
        assert_eq!(los_ratio(&[], 100.0), None);
    }

    #[test]
    fn test_ratio_by_flag() {
        let rows = [
            sample("A", 500.0, -60.0).with_los(true),
            sample("A", 10.0, -70.0).with_los(false),
            sample("A", 20.0, -80.0).with_los(false),
        ];
        let refs: Vec<&Sample> = rows.iter().collect();
        let ratio = los_ratio(&refs, 100.0).unwrap();
        assert!((ratio - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_flags_fall_back_to_distance() {
        let rows = [sample("A", 500.0, -60.0).with_los(true), sample("A", 10.0, -70.0)];
        let refs: Vec<&Sample> = rows.iter().collect();
        assert_eq!(los_ratio(&refs, 100.0), Some(0.5));
    }

    #[test]
    fn test_summary_aligns_los_rows_only() {
        let mut dataset = Dataset::new();
        for d in [50.0, 80.0, 200.0] {
            dataset.push(sample("FreeSpace", d, -50.0));
        }
        dataset.push(sample("LogD", 50.0, -52.0));
        dataset.push(sample("LogD", 80.0, -52.0));
        dataset.push(sample("LogD", 200.0, -80.0));

        let summary = los_summary(&dataset, "FreeSpace", 100.0, false);
        assert_eq!(summary.len(), 1);
        let s = &summary[0];
        assert_eq!(s.samples, 6);
        assert_eq!(s.los_samples, 4);
        assert_eq!(s.source, LosSource::Distance);
        let logd = s.los_alignment["LogD"];
        assert_eq!(logd.matched, 2);
        assert_eq!(logd.bias_db, -2.0);
        assert_eq!(logd.rmse_db, 2.0);
    }
}
