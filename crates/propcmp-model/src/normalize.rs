//! Dataset normalization.
//!
//! Maps a [`RawTable`] with simulator-specific headers onto canonical
//! [`Sample`]s. Columns are resolved once per table into a [`ColumnPlan`];
//! rows are then parsed against that plan with no further header lookups.

use crate::columns::{self, ColumnDef};
use crate::config::NormalizeConfig;
use crate::table::RawTable;
use crate::NormalizeError;
use propcmp_common::{stats, Buildings, Dataset, Position, Sample, Warning};
use tracing::debug;

/// Model label used when a file has no model column.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Frequency at or above which an ambiguous `frequency` column is read as Hz.
pub const HZ_DETECTION_THRESHOLD: f64 = 1e5;

/// Samples and warnings produced from one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedFile {
    /// Normalized samples, in table order.
    pub dataset: Dataset,
    /// Fallbacks applied and unrecognized values seen.
    pub warnings: Vec<Warning>,
}

// ============================================================================
// Column Plan
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum FrequencySource {
    /// Column value multiplied by `scale` gives MHz.
    Column { index: usize, scale: f64 },
    Fixed(f64),
}

#[derive(Debug, Clone, Copy)]
enum TxPowerSource {
    Column(usize),
    /// `rx + path_loss`.
    FromPathLoss(usize),
    Fixed(f64),
}

#[derive(Debug, Clone, Copy)]
enum DistanceSource {
    Column(usize),
    Positions,
}

#[derive(Debug, Clone, Copy)]
struct PositionColumns {
    x: usize,
    y: usize,
    z: usize,
}

/// Column indices resolved for one table.
#[derive(Debug, Clone)]
struct ColumnPlan {
    rx_power: usize,
    distance: DistanceSource,
    frequency: FrequencySource,
    tx_power: TxPowerSource,
    model: Option<usize>,
    scenario: Option<usize>,
    technology: Option<usize>,
    buildings: Option<usize>,
    sensitivity: Option<usize>,
    is_los: Option<usize>,
    interference: Option<usize>,
    rx_id: Option<usize>,
    tx_position: Option<PositionColumns>,
    rx_position: Option<PositionColumns>,
}

fn tried(defs: &[&ColumnDef]) -> Vec<String> {
    defs.iter()
        .flat_map(|d| d.candidates())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Normalizer
// ============================================================================

/// Converts raw tables into canonical samples.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    config: &'a NormalizeConfig,
}

impl<'a> Normalizer<'a> {
    /// Create a normalizer with the given fallbacks.
    pub fn new(config: &'a NormalizeConfig) -> Self {
        Self { config }
    }

    /// Normalize one table.
    ///
    /// Fails when a mandatory field cannot be resolved or when a resolved
    /// numeric column holds an unparsable cell. Never drops rows silently.
    pub fn normalize(&self, table: &RawTable) -> Result<NormalizedFile, NormalizeError> {
        if table.is_empty() {
            return Err(NormalizeError::EmptyTable);
        }

        let mut warnings = Vec::new();
        let plan = self.plan(table, &mut warnings)?;

        let mut dataset = Dataset::new();
        let mut unrecognized_buildings: Option<(String, usize)> = None;

        for row in 0..table.len() {
            let sample = parse_row(table, &plan, row, &mut unrecognized_buildings)?;
            dataset.push(sample);
        }

        if let Some((value, rows)) = unrecognized_buildings {
            warnings.push(Warning::UnrecognizedBuildingsValue {
                file: table.source.clone(),
                value,
                rows,
            });
        }

        debug!(
            "Normalized {} rows from {} ({} warnings)",
            dataset.len(),
            table.source,
            warnings.len()
        );

        Ok(NormalizedFile { dataset, warnings })
    }

    fn plan(&self, table: &RawTable, warnings: &mut Vec<Warning>) -> Result<ColumnPlan, NormalizeError> {
        let find = |def: &ColumnDef| table.find_column(def).map(|c| c.index);

        let rx_power = find(&columns::RX_POWER_DBM).ok_or_else(|| NormalizeError::MissingMandatoryField {
            field: columns::RX_POWER_DBM.name,
            tried: tried(&[&columns::RX_POWER_DBM]),
        })?;

        let position_columns = |x: &ColumnDef, y: &ColumnDef, z: &ColumnDef| -> Option<PositionColumns> {
            Some(PositionColumns {
                x: find(x)?,
                y: find(y)?,
                z: find(z)?,
            })
        };
        let tx_position = position_columns(&columns::TX_X, &columns::TX_Y, &columns::TX_Z);
        let rx_position = position_columns(&columns::RX_X, &columns::RX_Y, &columns::RX_Z);

        let distance = match find(&columns::DISTANCE_M) {
            Some(index) => DistanceSource::Column(index),
            None if tx_position.is_some() && rx_position.is_some() => DistanceSource::Positions,
            None => {
                return Err(NormalizeError::MissingMandatoryField {
                    field: columns::DISTANCE_M.name,
                    tried: tried(&[
                        &columns::DISTANCE_M,
                        &columns::TX_X,
                        &columns::TX_Y,
                        &columns::TX_Z,
                        &columns::RX_X,
                        &columns::RX_Y,
                        &columns::RX_Z,
                    ]),
                })
            }
        };

        let frequency = if let Some(index) = find(&columns::FREQUENCY_MHZ) {
            FrequencySource::Column { index, scale: 1.0 }
        } else if let Some(index) = find(&columns::FREQUENCY_HZ) {
            FrequencySource::Column { index, scale: 1e-6 }
        } else if let Some(index) = find(&columns::FREQUENCY) {
            let scale = detect_frequency_scale(table, index)?;
            FrequencySource::Column { index, scale }
        } else if let Some(value) = self.config.default_frequency_mhz {
            warnings.push(default_applied(table, columns::FREQUENCY_MHZ.name, value.to_string()));
            FrequencySource::Fixed(value)
        } else {
            return Err(NormalizeError::MissingMandatoryField {
                field: columns::FREQUENCY_MHZ.name,
                tried: tried(&[&columns::FREQUENCY_MHZ, &columns::FREQUENCY_HZ, &columns::FREQUENCY]),
            });
        };

        let tx_power = if let Some(index) = find(&columns::TX_POWER_DBM) {
            TxPowerSource::Column(index)
        } else if let Some(index) = find(&columns::PATH_LOSS_DB) {
            TxPowerSource::FromPathLoss(index)
        } else if let Some(value) = self.config.default_tx_power_dbm {
            warnings.push(default_applied(table, columns::TX_POWER_DBM.name, value.to_string()));
            TxPowerSource::Fixed(value)
        } else {
            return Err(NormalizeError::MissingMandatoryField {
                field: columns::TX_POWER_DBM.name,
                tried: tried(&[&columns::TX_POWER_DBM, &columns::PATH_LOSS_DB]),
            });
        };

        let model = find(&columns::PROPAGATION_MODEL);
        if model.is_none() {
            warnings.push(default_applied(table, columns::PROPAGATION_MODEL.name, UNKNOWN_MODEL.to_string()));
        }
        let scenario = find(&columns::SCENARIO);
        if scenario.is_none() {
            warnings.push(default_applied(table, columns::SCENARIO.name, table.stem.clone()));
        }

        Ok(ColumnPlan {
            rx_power,
            distance,
            frequency,
            tx_power,
            model,
            scenario,
            technology: find(&columns::TECHNOLOGY),
            buildings: find(&columns::BUILDINGS_ON),
            sensitivity: find(&columns::RX_SENSITIVITY_DBM),
            is_los: find(&columns::IS_LOS),
            interference: find(&columns::INTERFERENCE_DBM),
            rx_id: find(&columns::RX_ID),
            tx_position,
            rx_position,
        })
    }
}

fn default_applied(table: &RawTable, field: &str, value: String) -> Warning {
    Warning::DefaultApplied {
        file: table.source.clone(),
        field: field.to_string(),
        value,
    }
}

/// Decide whether an ambiguous frequency column holds Hz or MHz from its median.
fn detect_frequency_scale(table: &RawTable, index: usize) -> Result<f64, NormalizeError> {
    let values = (0..table.len())
        .map(|row| required_number(table, index, row))
        .collect::<Result<Vec<f64>, _>>()?;
    let median = stats::median(&values).unwrap_or(0.0);
    Ok(if median > HZ_DETECTION_THRESHOLD { 1e-6 } else { 1.0 })
}

// ============================================================================
// Cell Parsing
// ============================================================================

fn invalid(table: &RawTable, index: usize, row: usize, value: &str) -> NormalizeError {
    NormalizeError::InvalidValue {
        column: table.headers.get(index).map(|h| h.trim().to_string()).unwrap_or_default(),
        row: row + 1,
        value: value.to_string(),
    }
}

/// A finite number, or an error naming the cell.
fn required_number(table: &RawTable, index: usize, row: usize) -> Result<f64, NormalizeError> {
    let cell = table.cell(row, index);
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(table, index, row, cell)),
    }
}

/// An optional number: empty is `None`, infinities are kept, NaN and text are errors.
fn optional_number(table: &RawTable, index: Option<usize>, row: usize) -> Result<Option<f64>, NormalizeError> {
    let Some(index) = index else {
        return Ok(None);
    };
    let cell = table.cell(row, index);
    if cell.is_empty() {
        return Ok(None);
    }
    match cell.parse::<f64>() {
        Ok(v) if !v.is_nan() => Ok(Some(v)),
        _ => Err(invalid(table, index, row, cell)),
    }
}

fn optional_text(table: &RawTable, index: Option<usize>, row: usize) -> Option<String> {
    index
        .map(|i| table.cell(row, i))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn position(table: &RawTable, cols: PositionColumns, row: usize) -> Result<Position, NormalizeError> {
    Ok(Position::new(
        required_number(table, cols.x, row)?,
        required_number(table, cols.y, row)?,
        required_number(table, cols.z, row)?,
    ))
}

fn parse_row(
    table: &RawTable,
    plan: &ColumnPlan,
    row: usize,
    unrecognized_buildings: &mut Option<(String, usize)>,
) -> Result<Sample, NormalizeError> {
    let rx_power_dbm = required_number(table, plan.rx_power, row)?;

    // Positions are only mandatory when the distance is derived from them.
    let derive = matches!(plan.distance, DistanceSource::Positions);
    let parse_position = |cols: Option<PositionColumns>| -> Result<Option<Position>, NormalizeError> {
        match cols {
            Some(c) if derive => position(table, c, row).map(Some),
            Some(c) => Ok(position(table, c, row).ok()),
            None => Ok(None),
        }
    };
    let tx_position = parse_position(plan.tx_position)?;
    let rx_position = parse_position(plan.rx_position)?;

    let distance_m = match plan.distance {
        DistanceSource::Column(index) => required_number(table, index, row)?,
        DistanceSource::Positions => match (tx_position, rx_position) {
            (Some(tx), Some(rx)) => tx.distance_to(&rx),
            _ => 0.0,
        },
    };

    let frequency_mhz = match plan.frequency {
        FrequencySource::Column { index, scale } => required_number(table, index, row)? * scale,
        FrequencySource::Fixed(value) => value,
    };

    let tx_power_dbm = match plan.tx_power {
        TxPowerSource::Column(index) => required_number(table, index, row)?,
        TxPowerSource::FromPathLoss(index) => rx_power_dbm + required_number(table, index, row)?,
        TxPowerSource::Fixed(value) => value,
    };

    let model = match plan.model {
        Some(index) => {
            let cell = table.cell(row, index);
            if cell.is_empty() {
                return Err(invalid(table, index, row, cell));
            }
            cell.to_string()
        }
        None => UNKNOWN_MODEL.to_string(),
    };

    let scenario = optional_text(table, plan.scenario, row).unwrap_or_else(|| table.stem.clone());

    let buildings = match plan.buildings {
        Some(index) => {
            let cell = table.cell(row, index);
            Buildings::parse(cell).unwrap_or_else(|| {
                let entry = unrecognized_buildings.get_or_insert_with(|| (cell.to_string(), 0));
                entry.1 += 1;
                Buildings::Unknown
            })
        }
        None => Buildings::Unknown,
    };

    let is_los = plan
        .is_los
        .and_then(|index| propcmp_common::parse_bool_like(table.cell(row, index)));

    Ok(Sample {
        scenario,
        model,
        technology: optional_text(table, plan.technology, row),
        frequency_mhz,
        tx_power_dbm,
        distance_m,
        rx_power_dbm,
        rx_sensitivity_dbm: optional_number(table, plan.sensitivity, row)?,
        buildings,
        is_los,
        interference_dbm: optional_number(table, plan.interference, row)?,
        rx_id: optional_text(table, plan.rx_id, row),
        tx_position,
        rx_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(table: &RawTable) -> Result<NormalizedFile, NormalizeError> {
        Normalizer::new(&NormalizeConfig::default()).normalize(table)
    }

    #[test]
    fn test_canonical_columns() {
        let table = RawTable::from_strs(
            "run1",
            &["scenario", "propagation_model", "frequency_mhz", "tx_power_dbm", "distance_m", "rx_power_dbm", "buildings_on"],
            &[&["S1", "LogD", "3500", "30", "10", "-50.5", "true"]],
        );
        let out = normalize(&table).unwrap();
        assert!(out.warnings.is_empty());
        let s = &out.dataset.samples()[0];
        assert_eq!(s.scenario, "S1");
        assert_eq!(s.model, "LogD");
        assert_eq!(s.frequency_mhz, 3500.0);
        assert_eq!(s.tx_power_dbm, 30.0);
        assert_eq!(s.distance_m, 10.0);
        assert_eq!(s.rx_power_dbm, -50.5);
        assert_eq!(s.buildings, Buildings::On);
    }

    #[test]
    fn test_aliases_and_hz_conversion() {
        let table = RawTable::from_strs(
            "run2",
            &["ScenarioName", "modelName", "Frequency_Hz", "txPower", "Distance", "RSRP", "BuildingsEnabled", "Technology"],
            &[&["Downtown", "Hata", "700000000", "43", "250", "-81", "0", " LTE "]],
        );
        let out = normalize(&table).unwrap();
        let s = &out.dataset.samples()[0];
        assert_eq!(s.scenario, "Downtown");
        assert_eq!(s.model, "Hata");
        assert!((s.frequency_mhz - 700.0).abs() < 1e-9);
        assert_eq!(s.tx_power_dbm, 43.0);
        assert_eq!(s.distance_m, 250.0);
        assert_eq!(s.rx_power_dbm, -81.0);
        assert_eq!(s.buildings, Buildings::Off);
        assert_eq!(s.technology.as_deref(), Some("LTE"));
    }

    #[test]
    fn test_ambiguous_frequency_by_magnitude() {
        let hz = RawTable::from_strs(
            "f",
            &["model", "frequency", "distance", "rx_power_dbm", "tx_power_dbm"],
            &[&["A", "3500000000", "1", "-40", "30"], &["A", "3500000000", "2", "-46", "30"]],
        );
        let out = normalize(&hz).unwrap();
        assert!((out.dataset.samples()[0].frequency_mhz - 3500.0).abs() < 1e-9);

        let mhz = RawTable::from_strs(
            "f",
            &["model", "frequency", "distance", "rx_power_dbm", "tx_power_dbm"],
            &[&["A", "3500", "1", "-40", "30"]],
        );
        let out = normalize(&mhz).unwrap();
        assert_eq!(out.dataset.samples()[0].frequency_mhz, 3500.0);
    }

    #[test]
    fn test_mhz_column_preferred_over_hz() {
        let table = RawTable::from_strs(
            "f",
            &["model", "frequency_hz", "freq_mhz", "distance", "rsrp_dbm", "tx_power_dbm"],
            &[&["A", "1", "2100", "5", "-40", "30"]],
        );
        assert_eq!(normalize(&table).unwrap().dataset.samples()[0].frequency_mhz, 2100.0);
    }

    #[test]
    fn test_missing_rx_power_is_named_error() {
        let table = RawTable::from_strs("f", &["model", "distance_m"], &[&["A", "10"]]);
        match normalize(&table) {
            Err(NormalizeError::MissingMandatoryField { field, tried }) => {
                assert_eq!(field, "rx_power_dbm");
                assert!(tried.contains(&"rsrp".to_string()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_distance_from_positions() {
        let table = RawTable::from_strs(
            "f",
            &["model", "rx_power_dbm", "tx_power_dbm", "tx_world_x", "tx_world_y", "tx_world_z", "rxX", "rxY", "rxZ"],
            &[&["A", "-60", "30", "0", "0", "10", "3", "4", "10"]],
        );
        let out = normalize(&table).unwrap();
        let s = &out.dataset.samples()[0];
        assert_eq!(s.distance_m, 5.0);
        assert_eq!(s.rx_position, Some(Position::new(3.0, 4.0, 10.0)));
    }

    #[test]
    fn test_missing_distance_without_positions() {
        let table = RawTable::from_strs(
            "f",
            &["model", "rx_power_dbm", "tx_x", "tx_y", "tx_z"],
            &[&["A", "-60", "0", "0", "0"]],
        );
        assert!(matches!(
            normalize(&table),
            Err(NormalizeError::MissingMandatoryField { field: "distance_m", .. })
        ));
    }

    #[test]
    fn test_frequency_and_tx_defaults_warn() {
        let table = RawTable::from_strs("export_a", &["distance_m", "rx_power_dbm"], &[&["10", "-50"]]);
        let out = normalize(&table).unwrap();
        let s = &out.dataset.samples()[0];
        assert_eq!(s.frequency_mhz, 2100.0);
        assert_eq!(s.tx_power_dbm, 30.0);
        assert_eq!(s.model, UNKNOWN_MODEL);
        assert_eq!(s.scenario, "export_a");

        let fields: Vec<&str> = out
            .warnings
            .iter()
            .filter_map(|w| match w {
                Warning::DefaultApplied { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["frequency_mhz", "tx_power_dbm", "propagation_model", "scenario"]);
    }

    #[test]
    fn test_strict_config_requires_frequency() {
        let table = RawTable::from_strs("f", &["model", "distance_m", "rx_power_dbm", "tx_power_dbm"], &[&["A", "10", "-50", "30"]]);
        let strict = NormalizeConfig::strict();
        let result = Normalizer::new(&strict).normalize(&table);
        assert!(matches!(
            result,
            Err(NormalizeError::MissingMandatoryField { field: "frequency_mhz", .. })
        ));
    }

    #[test]
    fn test_tx_power_from_path_loss() {
        let table = RawTable::from_strs(
            "f",
            &["model", "distance_m", "frequency_mhz", "rx_power_dbm", "pathloss_db"],
            &[&["A", "10", "3500", "-62.5", "92.5"]],
        );
        let out = normalize(&table).unwrap();
        assert!(!out
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::DefaultApplied { field, .. } if field == "tx_power_dbm")));
        let s = &out.dataset.samples()[0];
        assert_eq!(s.tx_power_dbm, 30.0);
        assert_eq!(s.path_loss_db(), 92.5);
    }

    #[test]
    fn test_invalid_cell_aborts_with_location() {
        let table = RawTable::from_strs(
            "f",
            &["model", "distance_m", "rx_power_dbm"],
            &[&["A", "10", "-50"], &["A", "20", "n/a"]],
        );
        assert_eq!(
            normalize(&table),
            Err(NormalizeError::InvalidValue {
                column: "rx_power_dbm".to_string(),
                row: 2,
                value: "n/a".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_table() {
        let table = RawTable::from_strs("f", &["rx_power_dbm"], &[]);
        assert_eq!(normalize(&table), Err(NormalizeError::EmptyTable));
    }

    #[test]
    fn test_unrecognized_buildings_reported_once() {
        let table = RawTable::from_strs(
            "f",
            &["model", "distance_m", "rx_power_dbm", "buildings"],
            &[
                &["A", "10", "-50", "partial"],
                &["A", "20", "-55", "ON"],
                &["A", "30", "-58", "maybe"],
                &["A", "40", "-60", ""],
            ],
        );
        let out = normalize(&table).unwrap();
        let states: Vec<Buildings> = out.dataset.iter().map(|s| s.buildings).collect();
        assert_eq!(states, vec![Buildings::Unknown, Buildings::On, Buildings::Unknown, Buildings::Unknown]);
        let unrecognized: Vec<_> = out
            .warnings
            .iter()
            .filter(|w| matches!(w, Warning::UnrecognizedBuildingsValue { .. }))
            .collect();
        assert_eq!(unrecognized.len(), 1);
        assert!(matches!(
            unrecognized[0],
            Warning::UnrecognizedBuildingsValue { value, rows: 2, .. } if value == "partial"
        ));
    }

    #[test]
    fn test_optional_columns() {
        let table = RawTable::from_strs(
            "f",
            &["model", "distance_m", "rx_power_dbm", "interference_dbm", "isLOS", "rx_index", "rxSensitivity"],
            &[&["A", "10", "-50", "-90", "1", "7", "-100"], &["A", "20", "-55", "", "false", "", ""]],
        );
        let out = normalize(&table).unwrap();
        let first = &out.dataset.samples()[0];
        assert_eq!(first.interference_dbm, Some(-90.0));
        assert_eq!(first.is_los, Some(true));
        assert_eq!(first.rx_id.as_deref(), Some("7"));
        assert_eq!(first.rx_sensitivity_dbm, Some(-100.0));
        let second = &out.dataset.samples()[1];
        assert_eq!(second.interference_dbm, None);
        assert_eq!(second.is_los, Some(false));
        assert_eq!(second.rx_id, None);
    }

    #[test]
    fn test_empty_model_cell_is_invalid() {
        let table = RawTable::from_strs("f", &["model", "distance_m", "rx_power_dbm"], &[&["", "10", "-50"]]);
        assert!(matches!(normalize(&table), Err(NormalizeError::InvalidValue { row: 1, .. })));
    }
}
