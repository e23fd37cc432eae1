//! Analysis configuration.
//!
//! Configuration is resolved in the following order (later overrides earlier):
//! 1. Built-in code defaults
//! 2. YAML files, in the order given (only keys present override)
//! 3. Command-line flags, applied by the caller on the resolved struct
//!
//! ## Example YAML
//!
//! ```yaml
//! analysis:
//!   reference_model: FreeSpace
//!   coverage_thresholds_dbm: [-95, -100, -110]
//!   distance_bin_m: 20
//! link_budget:
//!   bandwidth_hz: 20000000
//!   noise_figure_db: 5
//! normalize:
//!   default_frequency_mhz: null   # frequency becomes mandatory
//! filter:
//!   technology: LTE
//!   buildings: both
//! ```

use crate::ConfigError;
use propcmp_common::{Buildings, Dataset, Sample};
use propcmp_link::LinkBudgetConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Analysis Settings
// ============================================================================

/// Settings for alignment, aggregation and binning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSettings {
    /// Model the others are scored against.
    pub reference_model: String,
    /// Coverage thresholds (dBm), reported in this order.
    pub coverage_thresholds_dbm: Vec<f64>,
    /// Width of distance bins (m).
    pub distance_bin_m: f64,
    /// Groups with fewer samples are left out of the reported table.
    pub min_samples: usize,
    /// Distance treated as the LOS boundary when no LOS flag is exported (m).
    pub los_boundary_m: f64,
    /// Add the frequency (whole MHz) to the group key.
    pub split_by_frequency: bool,
}

impl AnalysisSettings {
    /// Default reference model.
    pub const DEFAULT_REFERENCE_MODEL: &'static str = "FreeSpace";
    /// Default coverage thresholds.
    pub const DEFAULT_COVERAGE_THRESHOLDS_DBM: [f64; 3] = [-95.0, -100.0, -110.0];
    /// Default distance bin width.
    pub const DEFAULT_DISTANCE_BIN_M: f64 = 20.0;
    /// Default minimum group size.
    pub const DEFAULT_MIN_SAMPLES: usize = 10;
    /// Default LOS boundary.
    pub const DEFAULT_LOS_BOUNDARY_M: f64 = 100.0;
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            reference_model: Self::DEFAULT_REFERENCE_MODEL.to_string(),
            coverage_thresholds_dbm: Self::DEFAULT_COVERAGE_THRESHOLDS_DBM.to_vec(),
            distance_bin_m: Self::DEFAULT_DISTANCE_BIN_M,
            min_samples: Self::DEFAULT_MIN_SAMPLES,
            los_boundary_m: Self::DEFAULT_LOS_BOUNDARY_M,
            split_by_frequency: false,
        }
    }
}

// ============================================================================
// Normalization Settings
// ============================================================================

/// Fallback values used when an export has no column for a field.
///
/// `None` makes the field mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizeConfig {
    /// Frequency applied to files without any frequency column (MHz).
    pub default_frequency_mhz: Option<f64>,
    /// Transmit power applied to files without tx power or path loss columns (dBm).
    pub default_tx_power_dbm: Option<f64>,
}

impl NormalizeConfig {
    /// Default frequency fallback.
    pub const DEFAULT_FREQUENCY_MHZ: f64 = 2100.0;
    /// Default transmit power fallback.
    pub const DEFAULT_TX_POWER_DBM: f64 = 30.0;

    /// No fallbacks: every field must come from the file.
    pub fn strict() -> Self {
        Self {
            default_frequency_mhz: None,
            default_tx_power_dbm: None,
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            default_frequency_mhz: Some(Self::DEFAULT_FREQUENCY_MHZ),
            default_tx_power_dbm: Some(Self::DEFAULT_TX_POWER_DBM),
        }
    }
}

// ============================================================================
// Sample Filter
// ============================================================================

/// Which buildings states to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingsFilter {
    /// Only scenes with buildings enabled.
    On,
    /// Only scenes with buildings disabled.
    Off,
    /// Everything, including unknown.
    #[default]
    Both,
}

impl FromStr for BuildingsFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(BuildingsFilter::On),
            "off" => Ok(BuildingsFilter::Off),
            "both" | "all" => Ok(BuildingsFilter::Both),
            other => Err(format!("unknown buildings filter '{}' (expected on, off or both)", other)),
        }
    }
}

impl fmt::Display for BuildingsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildingsFilter::On => "on",
            BuildingsFilter::Off => "off",
            BuildingsFilter::Both => "both",
        })
    }
}

/// Pre-aggregation row filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleFilter {
    /// Keep only this technology (case-insensitive).
    pub technology: Option<String>,
    /// Keep only this frequency, within half a MHz.
    pub frequency_mhz: Option<f64>,
    /// Buildings states to keep.
    pub buildings: BuildingsFilter,
}

impl SampleFilter {
    /// Whether the filter keeps everything.
    pub fn is_pass_through(&self) -> bool {
        self.technology.is_none()
            && self.frequency_mhz.is_none()
            && self.buildings == BuildingsFilter::Both
    }

    /// Check a single sample.
    pub fn matches(&self, sample: &Sample) -> bool {
        if let Some(ref tech) = self.technology {
            match sample.technology {
                Some(ref t) if t.eq_ignore_ascii_case(tech) => {}
                _ => return false,
            }
        }
        if let Some(freq) = self.frequency_mhz {
            if (sample.frequency_mhz - freq).abs() > 0.5 {
                return false;
            }
        }
        match self.buildings {
            BuildingsFilter::Both => true,
            BuildingsFilter::On => sample.buildings == Buildings::On,
            BuildingsFilter::Off => sample.buildings == Buildings::Off,
        }
    }

    /// Apply the filter to a dataset.
    pub fn apply(&self, dataset: &Dataset) -> Dataset {
        if self.is_pass_through() {
            return dataset.clone();
        }
        dataset.filtered(|s| self.matches(s))
    }
}

// ============================================================================
// Analysis Configuration
// ============================================================================

/// Complete, immutable configuration of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisConfig {
    /// Alignment, aggregation and binning settings.
    pub analysis: AnalysisSettings,
    /// Link budget parameters for SINR and throughput.
    pub link_budget: LinkBudgetConfig,
    /// Normalization fallbacks.
    pub normalize: NormalizeConfig,
    /// Row filter.
    pub filter: SampleFilter,
}

/// Deserialize a present-but-null key as `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigYaml {
    #[serde(default)]
    analysis: Option<AnalysisYaml>,
    #[serde(default)]
    link_budget: Option<LinkBudgetYaml>,
    #[serde(default)]
    normalize: Option<NormalizeYaml>,
    #[serde(default)]
    filter: Option<FilterYaml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisYaml {
    reference_model: Option<String>,
    coverage_thresholds_dbm: Option<Vec<f64>>,
    distance_bin_m: Option<f64>,
    min_samples: Option<usize>,
    los_boundary_m: Option<f64>,
    split_by_frequency: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkBudgetYaml {
    bandwidth_hz: Option<f64>,
    noise_figure_db: Option<f64>,
    max_spectral_efficiency: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NormalizeYaml {
    #[serde(default, deserialize_with = "double_option")]
    default_frequency_mhz: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    default_tx_power_dbm: Option<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterYaml {
    #[serde(default, deserialize_with = "double_option")]
    technology: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    frequency_mhz: Option<Option<f64>>,
    buildings: Option<BuildingsFilter>,
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Check the link budget parameters, wherever they came from.
pub fn validate_link_budget(link: &LinkBudgetConfig) -> Result<(), ConfigError> {
    if !(link.bandwidth_hz.is_finite() && link.bandwidth_hz > 0.0) {
        return Err(invalid("link_budget.bandwidth_hz", "must be a positive number"));
    }
    if !link.noise_figure_db.is_finite() {
        return Err(invalid("link_budget.noise_figure_db", "must be finite"));
    }
    if !(link.max_spectral_efficiency.is_finite() && link.max_spectral_efficiency > 0.0) {
        return Err(invalid("link_budget.max_spectral_efficiency", "must be a positive number"));
    }
    Ok(())
}

impl AnalysisConfig {
    /// Load and merge configuration files over the built-in defaults.
    ///
    /// With no paths this returns the defaults.
    pub fn load(paths: &[&Path]) -> Result<Self, ConfigError> {
        let mut texts = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            texts.push(text);
        }
        let strs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        Self::from_yaml_strs(&strs)
    }

    /// Merge YAML documents over the built-in defaults, later documents winning.
    pub fn from_yaml_strs(yaml_strs: &[&str]) -> Result<Self, ConfigError> {
        let mut config = AnalysisConfig::default();
        for yaml_str in yaml_strs {
            // An empty document deserializes to unit, not to a map.
            if yaml_str.trim().is_empty() {
                continue;
            }
            let yaml: ConfigYaml = serde_yaml::from_str(yaml_str)?;
            config.merge(yaml);
        }
        config.validate()?;
        Ok(config)
    }

    fn merge(&mut self, yaml: ConfigYaml) {
        if let Some(a) = yaml.analysis {
            if let Some(v) = a.reference_model {
                self.analysis.reference_model = v;
            }
            if let Some(v) = a.coverage_thresholds_dbm {
                self.analysis.coverage_thresholds_dbm = v;
            }
            if let Some(v) = a.distance_bin_m {
                self.analysis.distance_bin_m = v;
            }
            if let Some(v) = a.min_samples {
                self.analysis.min_samples = v;
            }
            if let Some(v) = a.los_boundary_m {
                self.analysis.los_boundary_m = v;
            }
            if let Some(v) = a.split_by_frequency {
                self.analysis.split_by_frequency = v;
            }
        }
        if let Some(l) = yaml.link_budget {
            if let Some(v) = l.bandwidth_hz {
                self.link_budget.bandwidth_hz = v;
            }
            if let Some(v) = l.noise_figure_db {
                self.link_budget.noise_figure_db = v;
            }
            if let Some(v) = l.max_spectral_efficiency {
                self.link_budget.max_spectral_efficiency = v;
            }
        }
        if let Some(n) = yaml.normalize {
            if let Some(v) = n.default_frequency_mhz {
                self.normalize.default_frequency_mhz = v;
            }
            if let Some(v) = n.default_tx_power_dbm {
                self.normalize.default_tx_power_dbm = v;
            }
        }
        if let Some(f) = yaml.filter {
            if let Some(v) = f.technology {
                self.filter.technology = v;
            }
            if let Some(v) = f.frequency_mhz {
                self.filter.frequency_mhz = v;
            }
            if let Some(v) = f.buildings {
                self.filter.buildings = v;
            }
        }
    }

    /// Check value ranges. Call again after applying command-line overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.reference_model.trim().is_empty() {
            return Err(invalid("analysis.reference_model", "must not be empty"));
        }
        if self.analysis.coverage_thresholds_dbm.iter().any(|t| t.is_nan()) {
            return Err(invalid("analysis.coverage_thresholds_dbm", "must not contain NaN"));
        }
        if !(self.analysis.distance_bin_m.is_finite() && self.analysis.distance_bin_m > 0.0) {
            return Err(invalid("analysis.distance_bin_m", "must be a positive number"));
        }
        if !(self.analysis.los_boundary_m.is_finite() && self.analysis.los_boundary_m >= 0.0) {
            return Err(invalid("analysis.los_boundary_m", "must be zero or positive"));
        }
        validate_link_budget(&self.link_budget)?;
        if let Some(f) = self.normalize.default_frequency_mhz {
            if !(f.is_finite() && f > 0.0) {
                return Err(invalid("normalize.default_frequency_mhz", "must be a positive number"));
            }
        }
        if let Some(p) = self.normalize.default_tx_power_dbm {
            if !p.is_finite() {
                return Err(invalid("normalize.default_tx_power_dbm", "must be finite"));
            }
        }
        Ok(())
    }
}
