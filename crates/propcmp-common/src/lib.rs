//! # propcmp-common
//!
//! Common types for the propcmp propagation comparison engine.
//!
//! This crate provides:
//! - Receiver observations ([`Sample`]) and their container ([`Dataset`])
//! - Grouping keys ([`GroupKey`], [`ScopeKey`])
//! - Buildings state normalization ([`Buildings`])
//! - Recoverable run conditions ([`Warning`]) and per-file failures ([`FileFailure`])
//! - Summary statistics ([`stats`])

pub mod stats;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Geometry
// ============================================================================

/// Cartesian position in meters (simulator world coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate in meters.
    pub x: f64,
    /// Y coordinate in meters.
    pub y: f64,
    /// Z coordinate in meters.
    pub z: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Euclidean distance to another position in meters.
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

// ============================================================================
// Buildings State
// ============================================================================

/// Whether buildings were enabled in the simulated scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Buildings {
    /// Buildings disabled.
    Off,
    /// Buildings enabled.
    On,
    /// The export carried no usable buildings flag.
    #[default]
    Unknown,
}

impl Buildings {
    /// Parse a boolean-like cell.
    ///
    /// Accepts `true/1/on/yes` and `false/0/off/no` (case-insensitive), and any
    /// other number as non-zero = on. Returns `None` for text that is not
    /// boolean-like; an empty cell is [`Buildings::Unknown`].
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Some(Buildings::Unknown);
        }
        match parse_bool_like(value) {
            Some(true) => Some(Buildings::On),
            Some(false) => Some(Buildings::Off),
            None => None,
        }
    }

    /// Label used in tables and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Buildings::Off => "off",
            Buildings::On => "on",
            Buildings::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Buildings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse heterogeneous boolean encodings (`true`, `1`, `on`, `yes`, `1.0`, ...).
pub fn parse_bool_like(raw: &str) -> Option<bool> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        other => other.parse::<f64>().ok().filter(|v| !v.is_nan()).map(|v| v != 0.0),
    }
}

// ============================================================================
// Samples
// ============================================================================

/// One simulated receiver observation in canonical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Scenario identifier.
    pub scenario: String,
    /// Propagation model name (e.g. "FreeSpace", "LogD", "RayTracing").
    pub model: String,
    /// Radio technology (e.g. "LTE", "FiveGSub6").
    pub technology: Option<String>,
    /// Transmit frequency in MHz.
    pub frequency_mhz: f64,
    /// Transmit power in dBm.
    pub tx_power_dbm: f64,
    /// Transmitter to receiver distance in meters.
    pub distance_m: f64,
    /// Received signal strength in dBm.
    pub rx_power_dbm: f64,
    /// Receiver sensitivity threshold in dBm.
    pub rx_sensitivity_dbm: Option<f64>,
    /// Buildings state of the scene.
    pub buildings: Buildings,
    /// Line-of-sight flag, when the simulator exported one.
    pub is_los: Option<bool>,
    /// Interference power at the receiver in dBm.
    pub interference_dbm: Option<f64>,
    /// Receiver identifier.
    pub rx_id: Option<String>,
    /// Transmitter position.
    pub tx_position: Option<Position>,
    /// Receiver position.
    pub rx_position: Option<Position>,
}

impl Sample {
    /// Create a sample with the mandatory fields; optional fields are empty.
    pub fn new(
        scenario: impl Into<String>,
        model: impl Into<String>,
        frequency_mhz: f64,
        tx_power_dbm: f64,
        distance_m: f64,
        rx_power_dbm: f64,
    ) -> Self {
        Sample {
            scenario: scenario.into(),
            model: model.into(),
            technology: None,
            frequency_mhz,
            tx_power_dbm,
            distance_m,
            rx_power_dbm,
            rx_sensitivity_dbm: None,
            buildings: Buildings::Unknown,
            is_los: None,
            interference_dbm: None,
            rx_id: None,
            tx_position: None,
            rx_position: None,
        }
    }

    /// Set the buildings state.
    pub fn with_buildings(mut self, buildings: Buildings) -> Self {
        self.buildings = buildings;
        self
    }

    /// Set the technology label.
    pub fn with_technology(mut self, technology: impl Into<String>) -> Self {
        self.technology = Some(technology.into());
        self
    }

    /// Set the interference power.
    pub fn with_interference(mut self, interference_dbm: f64) -> Self {
        self.interference_dbm = Some(interference_dbm);
        self
    }

    /// Set the line-of-sight flag.
    pub fn with_los(mut self, is_los: bool) -> Self {
        self.is_los = Some(is_los);
        self
    }

    /// Path loss implied by this row: `tx_power - rx_power`.
    pub fn path_loss_db(&self) -> f64 {
        self.tx_power_dbm - self.rx_power_dbm
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// Ordered collection of samples loaded from one or more exports.
///
/// Order only matters for reproducible plotting; every analysis over a
/// dataset is independent of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dataset from samples.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Dataset { samples }
    }

    /// Append a single sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Concatenate another dataset onto this one.
    pub fn extend(&mut self, other: Dataset) {
        self.samples.extend(other.samples);
    }

    /// All samples in insertion order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterate over samples.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct model names, sorted.
    pub fn models(&self) -> BTreeSet<&str> {
        self.samples.iter().map(|s| s.model.as_str()).collect()
    }

    /// Distinct scenario names, sorted.
    pub fn scenarios(&self) -> BTreeSet<&str> {
        self.samples.iter().map(|s| s.scenario.as_str()).collect()
    }

    /// Keep only the samples matching a predicate.
    pub fn filtered<F>(&self, mut predicate: F) -> Dataset
    where
        F: FnMut(&Sample) -> bool,
    {
        Dataset {
            samples: self.samples.iter().filter(|s| predicate(s)).cloned().collect(),
        }
    }
}

impl FromIterator<Sample> for Dataset {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Dataset {
            samples: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

// ============================================================================
// Grouping Keys
// ============================================================================

/// Frequency bucket: frequency rounded to whole MHz.
pub fn frequency_bucket(frequency_mhz: f64) -> i64 {
    frequency_mhz.round() as i64
}

/// Key of a model group: the unit over which metrics are computed.
///
/// Field order defines the output order (scenario, then model).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    /// Scenario identifier.
    pub scenario: String,
    /// Propagation model name.
    pub model: String,
    /// Buildings state.
    pub buildings: Buildings,
    /// Frequency bucket in whole MHz, when groups are split by frequency.
    pub frequency_bucket: Option<i64>,
}

impl GroupKey {
    /// Build the group key of a sample.
    pub fn of(sample: &Sample, split_by_frequency: bool) -> Self {
        GroupKey {
            scenario: sample.scenario.clone(),
            model: sample.model.clone(),
            buildings: sample.buildings,
            frequency_bucket: split_by_frequency.then(|| frequency_bucket(sample.frequency_mhz)),
        }
    }

    /// The comparison scope this group belongs to.
    pub fn scope(&self) -> ScopeKey {
        ScopeKey {
            scenario: self.scenario.clone(),
            buildings: self.buildings,
            frequency_bucket: self.frequency_bucket,
        }
    }
}

/// Key of a comparison scope: all model groups compared against one reference group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ScopeKey {
    /// Scenario identifier.
    pub scenario: String,
    /// Buildings state.
    pub buildings: Buildings,
    /// Frequency bucket in whole MHz, when groups are split by frequency.
    pub frequency_bucket: Option<i64>,
}

impl ScopeKey {
    /// Build the scope key of a sample.
    pub fn of(sample: &Sample, split_by_frequency: bool) -> Self {
        GroupKey::of(sample, split_by_frequency).scope()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (buildings {})", self.scenario, self.buildings)?;
        if let Some(bucket) = self.frequency_bucket {
            write!(f, " @ {} MHz", bucket)?;
        }
        Ok(())
    }
}

// ============================================================================
// Warnings and Failures
// ============================================================================

/// A recoverable condition reported alongside results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A candidate model shares no distance value with the reference.
    NoOverlapForModel {
        /// Comparison scope.
        scope: String,
        /// Candidate model.
        model: String,
        /// Reference model.
        reference: String,
    },
    /// The reference model has no rows in a comparison scope.
    EmptyReference {
        /// Comparison scope.
        scope: String,
        /// Reference model.
        reference: String,
    },
    /// A documented fallback value was used for a field absent from a file.
    DefaultApplied {
        /// Source file.
        file: String,
        /// Canonical field name.
        field: String,
        /// Value that was applied.
        value: String,
    },
    /// A group has too few samples to be reported.
    BelowMinimumSamples {
        /// Group description.
        group: String,
        /// Samples in the group.
        count: usize,
        /// Configured minimum.
        minimum: usize,
    },
    /// Buildings cells that were not boolean-like.
    UnrecognizedBuildingsValue {
        /// Source file.
        file: String,
        /// First offending value.
        value: String,
        /// Number of affected rows.
        rows: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoOverlapForModel {
                scope,
                model,
                reference,
            } => write!(
                f,
                "no overlapping distances for '{}' vs '{}' in {}",
                model, reference, scope
            ),
            Warning::EmptyReference { scope, reference } => write!(
                f,
                "no rows for reference model '{}' in {}; RMSE/bias undefined",
                reference, scope
            ),
            Warning::DefaultApplied { file, field, value } => {
                write!(f, "{}: no '{}' column, using default {}", file, field, value)
            }
            Warning::BelowMinimumSamples {
                group,
                count,
                minimum,
            } => write!(
                f,
                "{} has {} samples (minimum {}), not reported",
                group, count, minimum
            ),
            Warning::UnrecognizedBuildingsValue { file, value, rows } => write!(
                f,
                "{}: {} buildings cells not boolean-like (e.g. '{}'), treated as unknown",
                file, rows, value
            ),
        }
    }
}

/// A file that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    /// Path of the file.
    pub path: String,
    /// Error description.
    pub error: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}
