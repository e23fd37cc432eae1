//! Column definitions for simulator exports.
//!
//! Each canonical field of a [`Sample`](propcmp_common::Sample) is a
//! compile-time [`ColumnDef`] listing the header names it may appear under.
//! Headers are matched case-insensitively after trimming; the canonical name
//! is always tried first, then the aliases in order.
//!
//! ## Maintenance Guidelines
//!
//! The description string is shown by `propcmp columns`. Keep it self-contained
//! (unit conventions, fallbacks) so users do not need to read this file.

/// A canonical column and the header names it is recognized under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Canonical column name.
    pub name: &'static str,
    /// User-facing description.
    pub description: &'static str,
    /// Unit of the canonical value, if any.
    pub unit: Option<&'static str>,
    /// Alternative header names, in resolution order.
    pub aliases: &'static [&'static str],
    /// Fallback used when no header matches, for display only.
    pub fallback: Option<&'static str>,
}

impl ColumnDef {
    /// Create a column definition with no unit, aliases or fallback.
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            unit: None,
            aliases: &[],
            fallback: None,
        }
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the aliases.
    pub const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Describe the fallback applied when the column is absent.
    pub const fn with_fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Check whether a header names this column (canonical name or alias).
    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim();
        self.candidates().any(|c| c.eq_ignore_ascii_case(header))
    }

    /// Canonical name followed by the aliases.
    pub fn candidates(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Transmitter to receiver distance.
pub const DISTANCE_M: ColumnDef = ColumnDef::new(
    "distance_m",
    "Transmitter to receiver distance. Derived from tx/rx positions when absent",
)
.with_unit("m")
.with_aliases(&["distance", "rx_tx_distance_m", "dist_m"])
.with_fallback("|rx - tx| from position columns");

/// Transmitter X coordinate.
pub const TX_X: ColumnDef = ColumnDef::new("tx_x", "Transmitter X coordinate")
    .with_unit("m")
    .with_aliases(&["tx_world_x", "txX"]);

/// Transmitter Y coordinate.
pub const TX_Y: ColumnDef = ColumnDef::new("tx_y", "Transmitter Y coordinate")
    .with_unit("m")
    .with_aliases(&["tx_world_y", "txY"]);

/// Transmitter Z coordinate.
pub const TX_Z: ColumnDef = ColumnDef::new("tx_z", "Transmitter Z coordinate")
    .with_unit("m")
    .with_aliases(&["tx_world_z", "txZ"]);

/// Receiver X coordinate.
pub const RX_X: ColumnDef = ColumnDef::new("rx_x", "Receiver X coordinate")
    .with_unit("m")
    .with_aliases(&["rx_world_x", "rxX"]);

/// Receiver Y coordinate.
pub const RX_Y: ColumnDef = ColumnDef::new("rx_y", "Receiver Y coordinate")
    .with_unit("m")
    .with_aliases(&["rx_world_y", "rxY"]);

/// Receiver Z coordinate.
pub const RX_Z: ColumnDef = ColumnDef::new("rx_z", "Receiver Z coordinate")
    .with_unit("m")
    .with_aliases(&["rx_world_z", "rxZ"]);

// ============================================================================
// Radio
// ============================================================================

/// Frequency already in MHz. Tried before the Hz and ambiguous columns.
pub const FREQUENCY_MHZ: ColumnDef = ColumnDef::new(
    "frequency_mhz",
    "Transmit frequency. Falls back to normalize.default_frequency_mhz when no frequency column exists",
)
.with_unit("MHz")
.with_aliases(&["freq_mhz", "tx_frequency_mhz", "txfrequency"])
.with_fallback("normalize.default_frequency_mhz");

/// Frequency in Hz, divided by 1e6 on load.
pub const FREQUENCY_HZ: ColumnDef = ColumnDef::new(
    "frequency_hz",
    "Transmit frequency in Hz, converted to MHz",
)
.with_unit("Hz")
.with_aliases(&["freq_hz", "tx_frequency_hz"]);

/// Frequency of unknown unit, detected by magnitude.
pub const FREQUENCY: ColumnDef = ColumnDef::new(
    "frequency",
    "Transmit frequency of unstated unit: Hz if the column median exceeds 1e5, else MHz",
);

/// Received signal strength. Mandatory.
pub const RX_POWER_DBM: ColumnDef = ColumnDef::new(
    "rx_power_dbm",
    "Received signal strength (mandatory)",
)
.with_unit("dBm")
.with_aliases(&[
    "rsrp_dbm",
    "received_power_dbm",
    "rx_signal_strength_dbm",
    "rxsignalstrength",
    "currentsignalstrength",
    "rx_power",
    "rsrp",
]);

/// Transmit power or EIRP.
pub const TX_POWER_DBM: ColumnDef = ColumnDef::new(
    "tx_power_dbm",
    "Transmit power. Derived as rx + path loss when a path loss column exists, else normalize.default_tx_power_dbm",
)
.with_unit("dBm")
.with_aliases(&["txpower", "tx_eirp_dbm", "eirp_dbm", "transmitterpower"])
.with_fallback("rx + path_loss_db, then normalize.default_tx_power_dbm");

/// Path loss reported by the simulator.
pub const PATH_LOSS_DB: ColumnDef = ColumnDef::new(
    "path_loss_db",
    "Simulator path loss, used only to derive tx power",
)
.with_unit("dB")
.with_aliases(&["pathloss_db", "pl_db"]);

/// Receiver sensitivity threshold.
pub const RX_SENSITIVITY_DBM: ColumnDef = ColumnDef::new(
    "rx_sensitivity_dbm",
    "Receiver sensitivity threshold",
)
.with_unit("dBm")
.with_aliases(&["rxsensitivity", "sensitivity_dbm"]);

/// Interference power at the receiver.
pub const INTERFERENCE_DBM: ColumnDef = ColumnDef::new(
    "interference_dbm",
    "Interference power at the receiver. Absent or empty means none (-inf dBm)",
)
.with_unit("dBm")
.with_aliases(&["interference"]);

// ============================================================================
// Labels
// ============================================================================

/// Propagation model name.
pub const PROPAGATION_MODEL: ColumnDef = ColumnDef::new(
    "propagation_model",
    "Propagation model name (FreeSpace, LogD, LogDShadow, Hata, COST231, RayTracing)",
)
.with_aliases(&["model", "modelname", "propagationmodel"])
.with_fallback("\"unknown\"");

/// Scenario identifier.
pub const SCENARIO: ColumnDef = ColumnDef::new(
    "scenario",
    "Scenario identifier. Falls back to the file name without extension",
)
.with_aliases(&["scenarioname", "scenario_id"])
.with_fallback("file stem");

/// Radio technology.
pub const TECHNOLOGY: ColumnDef =
    ColumnDef::new("technology", "Radio technology (LTE, FiveGSub6, ...)").with_aliases(&["tech"]);

/// Buildings-enabled flag.
pub const BUILDINGS_ON: ColumnDef = ColumnDef::new(
    "buildings_on",
    "Buildings enabled: true/1/on/yes or false/0/off/no; anything else is unknown",
)
.with_aliases(&["buildings", "buildingsenabled", "bld_on", "buildingson"])
.with_fallback("unknown");

/// Line-of-sight flag.
pub const IS_LOS: ColumnDef =
    ColumnDef::new("is_los", "Line-of-sight flag (boolean-like)").with_aliases(&["islos", "los"]);

/// Receiver identifier.
pub const RX_ID: ColumnDef = ColumnDef::new("rx_id", "Receiver identifier or index")
    .with_aliases(&["rx_anchor_idx", "rx_index", "receiver_index"]);

// ============================================================================
// Registry
// ============================================================================

/// All registered columns, in display order.
pub const ALL_COLUMNS: &[&ColumnDef] = &[
    &SCENARIO,
    &PROPAGATION_MODEL,
    &TECHNOLOGY,
    &BUILDINGS_ON,
    &FREQUENCY_MHZ,
    &FREQUENCY_HZ,
    &FREQUENCY,
    &TX_POWER_DBM,
    &PATH_LOSS_DB,
    &RX_POWER_DBM,
    &RX_SENSITIVITY_DBM,
    &INTERFERENCE_DBM,
    &DISTANCE_M,
    &TX_X,
    &TX_Y,
    &TX_Z,
    &RX_X,
    &RX_Y,
    &RX_Z,
    &IS_LOS,
    &RX_ID,
];

/// Find the column a header names, if any.
pub fn column_for_header(header: &str) -> Option<&'static ColumnDef> {
    ALL_COLUMNS.iter().find(|c| c.matches(header)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_matches_case_insensitive() {
        assert!(DISTANCE_M.matches("Distance"));
        assert!(DISTANCE_M.matches(" RX_TX_DISTANCE_M "));
        assert!(RX_POWER_DBM.matches("RSRP"));
        assert!(RX_POWER_DBM.matches("currentSignalStrength"));
        assert!(TX_X.matches("txX"));
        assert!(!DISTANCE_M.matches("distance_km"));
    }

    #[test]
    fn test_candidates_start_with_canonical() {
        let candidates: Vec<_> = FREQUENCY_HZ.candidates().collect();
        assert_eq!(candidates, vec!["frequency_hz", "freq_hz", "tx_frequency_hz"]);
    }

    #[test]
    fn test_no_header_claimed_twice() {
        let mut seen = HashSet::new();
        for column in ALL_COLUMNS {
            for candidate in column.candidates() {
                assert!(
                    seen.insert(candidate.to_ascii_lowercase()),
                    "'{}' registered twice",
                    candidate
                );
            }
        }
    }

    #[test]
    fn test_column_for_header() {
        assert_eq!(column_for_header("modelName").map(|c| c.name), Some("propagation_model"));
        assert_eq!(column_for_header("Frequency").map(|c| c.name), Some("frequency"));
        assert!(column_for_header("timestamp").is_none());
    }
}
