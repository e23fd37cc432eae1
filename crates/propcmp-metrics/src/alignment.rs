//! Reference alignment and error metrics.
//!
//! A candidate model is scored against the reference model of the same
//! comparison scope (scenario, buildings state and, optionally, frequency
//! bucket). Rows are inner-joined on their exact distance value; each matched
//! pair contributes `candidate_rx - reference_rx` to RMSE and bias.
//!
//! Duplicate distances on either side join as a cartesian product. Errors are
//! summed in sorted order, so results do not depend on row order.

use propcmp_common::{stats, Dataset, GroupKey, Sample, ScopeKey, Warning};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// RMSE and bias of a candidate against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorMetrics {
    /// `sqrt(mean(error²))` in dB.
    pub rmse_db: f64,
    /// `mean(error)` in dB. Negative means the candidate predicts weaker signal.
    pub bias_db: f64,
    /// Number of matched pairs.
    pub matched: usize,
}

impl ErrorMetrics {
    /// Metrics of a model against itself.
    pub fn identical(matched: usize) -> Self {
        Self {
            rmse_db: 0.0,
            bias_db: 0.0,
            matched,
        }
    }
}

/// Compute RMSE and bias from elementwise errors. `None` for no errors.
pub fn error_metrics(errors: &[f64]) -> Option<ErrorMetrics> {
    Some(ErrorMetrics {
        rmse_db: stats::rms(errors)?,
        bias_db: stats::mean(errors)?,
        matched: errors.len(),
    })
}

/// Join key of a distance: its bit pattern, with -0.0 folded onto 0.0.
fn distance_key(distance_m: f64) -> Option<u64> {
    if distance_m.is_nan() {
        return None;
    }
    Some(if distance_m == 0.0 { 0.0f64.to_bits() } else { distance_m.to_bits() })
}

/// Inner-join candidate rows to reference rows by exact distance and return the errors.
pub fn matched_errors(candidate: &[&Sample], reference: &[&Sample]) -> Vec<f64> {
    let mut by_distance: HashMap<u64, Vec<f64>> = HashMap::new();
    for r in reference {
        if let Some(key) = distance_key(r.distance_m) {
            by_distance.entry(key).or_default().push(r.rx_power_dbm);
        }
    }

    let mut errors = Vec::new();
    for c in candidate {
        let Some(refs) = distance_key(c.distance_m).and_then(|k| by_distance.get(&k)) else {
            continue;
        };
        errors.extend(refs.iter().map(|r| c.rx_power_dbm - r));
    }
    errors
}

/// Align one candidate group against a reference group.
///
/// Returns `None` when no distance value is shared.
pub fn align_samples(candidate: &[&Sample], reference: &[&Sample]) -> Option<ErrorMetrics> {
    error_metrics(&matched_errors(candidate, reference))
}

// ============================================================================
// Dataset Alignment
// ============================================================================

/// Alignment results for one comparison scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeAlignment {
    /// The reference model has no rows in this scope; no metrics are defined.
    pub reference_empty: bool,
    /// Metrics per model, including the reference itself. Models without
    /// overlap are absent.
    pub metrics: BTreeMap<String, ErrorMetrics>,
    /// Models that share no distance with the reference.
    pub no_overlap: Vec<String>,
}

/// Alignment of every model in a dataset against a reference model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceAlignment {
    /// Reference model name.
    pub reference: String,
    /// Per-scope results.
    #[serde(serialize_with = "serialize_scopes")]
    pub scopes: BTreeMap<ScopeKey, ScopeAlignment>,
    /// No-overlap and empty-reference conditions, in scope order.
    pub warnings: Vec<Warning>,
}

fn serialize_scopes<S>(scopes: &BTreeMap<ScopeKey, ScopeAlignment>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_map(scopes.iter().map(|(k, v)| (k.to_string(), v)))
}

impl ReferenceAlignment {
    /// Metrics of a model group, if defined.
    pub fn metrics_for(&self, key: &GroupKey) -> Option<&ErrorMetrics> {
        self.scopes.get(&key.scope())?.metrics.get(&key.model)
    }

    /// Whether the reference is missing from the scope of a group.
    pub fn reference_empty_for(&self, key: &GroupKey) -> bool {
        self.scopes
            .get(&key.scope())
            .map(|s| s.reference_empty)
            .unwrap_or(true)
    }
}

/// Samples of one scope, split by model.
pub(crate) type ScopeSamples<'a> = BTreeMap<&'a str, Vec<&'a Sample>>;

/// Split a dataset into comparison scopes and models.
pub(crate) fn partition_by_scope(dataset: &Dataset, split_by_frequency: bool) -> BTreeMap<ScopeKey, ScopeSamples<'_>> {
    let mut scopes: BTreeMap<ScopeKey, ScopeSamples<'_>> = BTreeMap::new();
    for sample in dataset {
        scopes
            .entry(ScopeKey::of(sample, split_by_frequency))
            .or_default()
            .entry(sample.model.as_str())
            .or_default()
            .push(sample);
    }
    scopes
}

/// Align every model of one scope against the reference.
pub(crate) fn align_scope(
    scope: &ScopeKey,
    models: &ScopeSamples<'_>,
    reference: &str,
    warnings: &mut Vec<Warning>,
) -> ScopeAlignment {
    let Some(reference_rows) = models.get(reference).filter(|rows| !rows.is_empty()) else {
        warnings.push(Warning::EmptyReference {
            scope: scope.to_string(),
            reference: reference.to_string(),
        });
        return ScopeAlignment {
            reference_empty: true,
            ..Default::default()
        };
    };

    let mut result = ScopeAlignment::default();
    for (&model, rows) in models {
        if model == reference {
            result
                .metrics
                .insert(model.to_string(), ErrorMetrics::identical(reference_rows.len()));
            continue;
        }
        match align_samples(rows, reference_rows) {
            Some(metrics) => {
                debug!(
                    "{} vs {} in {}: RMSE {:.3} dB, bias {:.3} dB over {} pairs",
                    model, reference, scope, metrics.rmse_db, metrics.bias_db, metrics.matched
                );
                result.metrics.insert(model.to_string(), metrics);
            }
            None => {
                warnings.push(Warning::NoOverlapForModel {
                    scope: scope.to_string(),
                    model: model.to_string(),
                    reference: reference.to_string(),
                });
                result.no_overlap.push(model.to_string());
            }
        }
    }
    result
}

/// Align every model in the dataset against `reference`, scope by scope.
///
/// Never fails: missing overlap and a missing reference are reported as
/// warnings and leave the affected metrics undefined.
pub fn align_dataset(dataset: &Dataset, reference: &str, split_by_frequency: bool) -> ReferenceAlignment {
    let mut alignment = ReferenceAlignment {
        reference: reference.to_string(),
        ..Default::default()
    };
    for (scope, models) in partition_by_scope(dataset, split_by_frequency) {
        let result = align_scope(&scope, &models, reference, &mut alignment.warnings);
        alignment.scopes.insert(scope, result);
    }
    alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use propcmp_common::Buildings;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn sample(model: &str, distance_m: f64, rx: f64) -> Sample {
        Sample::new("S1", model, 3500.0, 30.0, distance_m, rx)
    }

    fn free_space_and_logd() -> Dataset {
        let mut dataset = Dataset::new();
        for d in [10.0, 20.0, 30.0, 40.0, 50.0] {
            let fs = propcmp_link::free_space_rx_power_dbm(30.0, d, 3500.0);
            dataset.push(sample("FreeSpace", d, fs));
            dataset.push(sample("LogD", d, fs - 5.0));
        }
        dataset
    }

    #[test]
    fn test_error_metrics_empty() {
        assert_eq!(error_metrics(&[]), None);
    }

    #[test]
    fn test_constant_offset() {
        let alignment = align_dataset(&free_space_and_logd(), "FreeSpace", false);
        let key = GroupKey::of(&sample("LogD", 10.0, 0.0), false);
        let metrics = alignment.metrics_for(&key).unwrap();
        assert!((metrics.rmse_db - 5.0).abs() < 1e-12, "rmse {}", metrics.rmse_db);
        assert!((metrics.bias_db + 5.0).abs() < 1e-12, "bias {}", metrics.bias_db);
        assert_eq!(metrics.matched, 5);
        assert!(alignment.warnings.is_empty());
    }

    #[test]
    fn test_reference_against_itself() {
        let alignment = align_dataset(&free_space_and_logd(), "FreeSpace", false);
        let key = GroupKey::of(&sample("FreeSpace", 10.0, 0.0), false);
        assert_eq!(alignment.metrics_for(&key), Some(&ErrorMetrics::identical(5)));
    }

    #[test]
    fn test_self_alignment_via_join() {
        let rows: Vec<Sample> = (1..=20).map(|i| sample("A", i as f64 * 7.5, -40.0 - i as f64)).collect();
        let refs: Vec<&Sample> = rows.iter().collect();
        let metrics = align_samples(&refs, &refs).unwrap();
        assert_eq!(metrics.rmse_db, 0.0);
        assert_eq!(metrics.bias_db, 0.0);
    }

    #[test]
    fn test_no_overlap_is_reported_and_omitted() {
        let mut dataset = free_space_and_logd();
        for (i, d) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            dataset.push(sample("Ref", d, -50.0 - i as f64));
        }
        for d in [15.0, 25.0, 35.0] {
            dataset.push(sample("Hata", d, -70.0));
        }
        dataset.push(sample("LogDShadow", 20.0, -48.0));

        let alignment = align_dataset(&dataset, "Ref", false);
        let scope = alignment.scopes.values().next().unwrap();
        assert_eq!(scope.no_overlap, vec!["Hata".to_string()]);
        assert!(!scope.metrics.contains_key("Hata"));
        assert!(scope.metrics.contains_key("LogDShadow"));
        assert!(scope.metrics.contains_key("LogD"));
        assert_eq!(alignment.warnings.len(), 1);
        assert!(matches!(
            &alignment.warnings[0],
            Warning::NoOverlapForModel { model, .. } if model == "Hata"
        ));
    }

    #[test]
    fn test_empty_reference_is_explicit() {
        let alignment = align_dataset(&free_space_and_logd(), "RayTracing", false);
        let key = GroupKey::of(&sample("LogD", 10.0, 0.0), false);
        assert!(alignment.reference_empty_for(&key));
        assert_eq!(alignment.metrics_for(&key), None);
        assert!(matches!(
            alignment.warnings.as_slice(),
            [Warning::EmptyReference { reference, .. }] if reference == "RayTracing"
        ));
    }

    #[test]
    fn test_scopes_separate_buildings() {
        let mut dataset = Dataset::new();
        dataset.push(sample("FreeSpace", 10.0, -40.0).with_buildings(Buildings::Off));
        dataset.push(sample("LogD", 10.0, -45.0).with_buildings(Buildings::Off));
        dataset.push(sample("LogD", 10.0, -60.0).with_buildings(Buildings::On));

        let alignment = align_dataset(&dataset, "FreeSpace", false);
        assert_eq!(alignment.scopes.len(), 2);
        let off = GroupKey::of(&dataset.samples()[1], false);
        let on = GroupKey::of(&dataset.samples()[2], false);
        assert_eq!(alignment.metrics_for(&off).map(|m| m.bias_db), Some(-5.0));
        assert_eq!(alignment.metrics_for(&on), None);
        assert!(alignment.reference_empty_for(&on));
    }

    #[test]
    fn test_duplicate_distances_cartesian() {
        let candidate = [sample("A", 10.0, -50.0), sample("A", 10.0, -52.0)];
        let reference = [sample("R", 10.0, -51.0), sample("R", 10.0, -49.0)];
        let c: Vec<&Sample> = candidate.iter().collect();
        let r: Vec<&Sample> = reference.iter().collect();
        let mut errors = matched_errors(&c, &r);
        errors.sort_by(f64::total_cmp);
        assert_eq!(errors, vec![-3.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_negative_zero_distance_matches() {
        let c = [sample("A", -0.0, -40.0)];
        let r = [sample("R", 0.0, -41.0)];
        let metrics = align_samples(&c.iter().collect::<Vec<_>>(), &r.iter().collect::<Vec<_>>()).unwrap();
        assert_eq!(metrics.bias_db, 1.0);
    }

    #[test]
    fn test_order_independent() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut samples = Vec::new();
        for i in 0..200 {
            let d = (i % 40) as f64 * 2.5;
            samples.push(sample("FreeSpace", d, rng.gen_range(-120.0..-40.0)));
            samples.push(sample("LogD", d, rng.gen_range(-120.0..-40.0)));
        }
        let forward = align_dataset(&Dataset::from_samples(samples.clone()), "FreeSpace", false);
        samples.shuffle(&mut rng);
        let shuffled = align_dataset(&Dataset::from_samples(samples), "FreeSpace", false);
        assert_eq!(forward, shuffled);
    }
}
