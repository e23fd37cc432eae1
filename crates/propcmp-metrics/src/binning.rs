//! Distance binning and buildings impact.

use propcmp_common::{stats, Buildings, Dataset, Sample};
use propcmp_link::fspl_db;
use serde::Serialize;
use std::collections::BTreeMap;

/// Index of the fixed-width bin containing `distance_m`.
///
/// Saturates at `i64::MAX` for distances beyond the representable range.
pub fn bin_index(distance_m: f64, bin_width_m: f64) -> i64 {
    (distance_m / bin_width_m).floor() as i64
}

/// Lower and upper edge of a bin (m), computed in floating point.
pub fn bin_edges(bin: i64, bin_width_m: f64) -> (f64, f64) {
    let start_m = bin as f64 * bin_width_m;
    (start_m, start_m + bin_width_m)
}

/// Aggregates of one distance bin of a model group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceBin {
    /// Scenario identifier.
    pub scenario: String,
    /// Propagation model.
    pub model: String,
    /// Buildings state.
    pub buildings: Buildings,
    /// Bin index, `floor(distance / width)`.
    pub bin: i64,
    /// Lower bin edge (m, inclusive).
    pub start_m: f64,
    /// Upper bin edge (m, exclusive).
    pub end_m: f64,
    /// Rows in the bin.
    pub samples: usize,
    /// Mean received power (dBm).
    pub mean_rx_power_dbm: f64,
    /// Median received power (dBm).
    pub median_rx_power_dbm: f64,
    /// Mean excess path loss over free space (dB).
    pub mean_excess_path_loss_db: f64,
}

/// Median received power with buildings off minus on, per bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingsDelta {
    /// Scenario identifier.
    pub scenario: String,
    /// Propagation model.
    pub model: String,
    /// Bin index.
    pub bin: i64,
    /// Lower bin edge (m).
    pub start_m: f64,
    /// Upper bin edge (m).
    pub end_m: f64,
    /// Median received power with buildings disabled (dBm).
    pub median_rx_off_dbm: f64,
    /// Median received power with buildings enabled (dBm).
    pub median_rx_on_dbm: f64,
    /// `median_off - median_on` (dB). Positive means buildings attenuate.
    pub delta_db: f64,
}

/// Excess path loss of a sample over analytical free space.
pub fn excess_path_loss_db(sample: &Sample) -> f64 {
    sample.path_loss_db() - fspl_db(sample.distance_m, sample.frequency_mhz)
}

/// Bin every (scenario, model, buildings) group by distance.
///
/// Output is sorted by scenario, model, buildings, then bin.
pub fn distance_bins(dataset: &Dataset, bin_width_m: f64) -> Vec<DistanceBin> {
    let mut groups: BTreeMap<(&str, &str, Buildings, i64), Vec<&Sample>> = BTreeMap::new();
    for s in dataset {
        groups
            .entry((s.scenario.as_str(), s.model.as_str(), s.buildings, bin_index(s.distance_m, bin_width_m)))
            .or_default()
            .push(s);
    }

    groups
        .into_iter()
        .map(|((scenario, model, buildings, bin), rows)| {
            let rx: Vec<f64> = rows.iter().map(|s| s.rx_power_dbm).collect();
            let epl: Vec<f64> = rows.iter().map(|s| excess_path_loss_db(s)).collect();
            let (start_m, end_m) = bin_edges(bin, bin_width_m);
            DistanceBin {
                scenario: scenario.to_string(),
                model: model.to_string(),
                buildings,
                bin,
                start_m,
                end_m,
                samples: rows.len(),
                mean_rx_power_dbm: stats::mean(&rx).unwrap_or(f64::NAN),
                median_rx_power_dbm: stats::median(&rx).unwrap_or(f64::NAN),
                mean_excess_path_loss_db: stats::mean(&epl).unwrap_or(f64::NAN),
            }
        })
        .collect()
}

/// Buildings impact per (scenario, model, bin), for bins holding both states.
pub fn buildings_delta(dataset: &Dataset, bin_width_m: f64) -> Vec<BuildingsDelta> {
    #[derive(Default)]
    struct Split {
        off: Vec<f64>,
        on: Vec<f64>,
    }

    let mut bins: BTreeMap<(&str, &str, i64), Split> = BTreeMap::new();
    for s in dataset {
        let split = bins
            .entry((s.scenario.as_str(), s.model.as_str(), bin_index(s.distance_m, bin_width_m)))
            .or_default();
        match s.buildings {
            Buildings::Off => split.off.push(s.rx_power_dbm),
            Buildings::On => split.on.push(s.rx_power_dbm),
            Buildings::Unknown => {}
        }
    }

    bins.into_iter()
        .filter_map(|((scenario, model, bin), split)| {
            let off = stats::median(&split.off)?;
            let on = stats::median(&split.on)?;
            let (start_m, end_m) = bin_edges(bin, bin_width_m);
            Some(BuildingsDelta {
                scenario: scenario.to_string(),
                model: model.to_string(),
                bin,
                start_m,
                end_m,
                median_rx_off_dbm: off,
                median_rx_on_dbm: on,
                delta_db: off - on,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(model: &str, distance_m: f64, rx: f64, buildings: Buildings) -> Sample {
        Sample::new("S1", model, 3500.0, 30.0, distance_m, rx).with_buildings(buildings)
    }

    #[test]
    fn test_bin_index() {
        assert_eq!(bin_index(0.0, 20.0), 0);
        assert_eq!(bin_index(19.999, 20.0), 0);
        assert_eq!(bin_index(20.0, 20.0), 1);
        assert_eq!(bin_index(45.0, 20.0), 2);
        assert_eq!(bin_index(1e300, 20.0), i64::MAX);
    }

    #[test]
    fn test_huge_distance_does_not_overflow_edges() {
        let dataset = Dataset::from_samples(vec![
            sample("LogD", 1e300, -150.0, Buildings::Off),
            sample("LogD", 1e300, -160.0, Buildings::On),
        ]);
        let bins = distance_bins(&dataset, 20.0);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].bin, i64::MAX);
        assert!(bins[0].end_m > bins[0].start_m);

        let deltas = buildings_delta(&dataset, 20.0);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta_db, 10.0);
        assert!(deltas[0].end_m.is_finite());
    }

    #[test]
    fn test_distance_bins() {
        let dataset = Dataset::from_samples(vec![
            sample("LogD", 5.0, -50.0, Buildings::Off),
            sample("LogD", 15.0, -54.0, Buildings::Off),
            sample("LogD", 12.0, -58.0, Buildings::Off),
            sample("LogD", 25.0, -60.0, Buildings::Off),
        ]);
        let bins = distance_bins(&dataset, 20.0);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].bin, 0);
        assert_eq!(bins[0].samples, 3);
        assert_eq!(bins[0].mean_rx_power_dbm, -54.0);
        assert_eq!(bins[0].median_rx_power_dbm, -54.0);
        assert_eq!(bins[1].start_m, 20.0);
        assert_eq!(bins[1].end_m, 40.0);
    }

    #[test]
    fn test_excess_path_loss_zero_for_free_space() {
        let rx = propcmp_link::free_space_rx_power_dbm(30.0, 120.0, 2100.0);
        let s = Sample::new("S1", "FreeSpace", 2100.0, 30.0, 120.0, rx);
        assert!(excess_path_loss_db(&s).abs() < 1e-9);
    }

    #[test]
    fn test_buildings_delta_requires_both_states() {
        let dataset = Dataset::from_samples(vec![
            sample("RayTracing", 5.0, -50.0, Buildings::Off),
            sample("RayTracing", 6.0, -52.0, Buildings::Off),
            sample("RayTracing", 7.0, -70.0, Buildings::On),
            sample("RayTracing", 25.0, -60.0, Buildings::Off),
            sample("RayTracing", 26.0, -66.0, Buildings::Unknown),
        ]);
        let deltas = buildings_delta(&dataset, 20.0);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].bin, 0);
        assert_eq!(deltas[0].median_rx_off_dbm, -51.0);
        assert_eq!(deltas[0].median_rx_on_dbm, -70.0);
        assert_eq!(deltas[0].delta_db, 19.0);
    }
}
