//! # propcmp-link
//!
//! Closed-form radio link calculations for propcmp.
//!
//! This crate provides:
//! - Free-space path loss in its empirical-constant and wavelength forms ([`fspl_db`], [`fspl_wavelength_db`])
//! - Theoretical received power ([`theoretical_rx_power_dbm`])
//! - Coverage ratios against sensitivity thresholds ([`coverage_percent`], [`coverage_table`])
//! - Thermal noise, SINR and the capacity-bounded throughput ([`LinkBudgetConfig`])
//!
//! Every function is pure. Out-of-domain inputs are clamped, never rejected.

use serde::{Deserialize, Serialize};

// ============================================================================
// Physical Constants
// ============================================================================

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Smallest distance passed to the path loss formulas (1 mm).
pub const MIN_DISTANCE_M: f64 = 1e-3;

/// Smallest frequency passed to the path loss formulas.
pub const MIN_FREQUENCY_MHZ: f64 = 1e-6;

/// Thermal noise power spectral density at 290 K (dBm/Hz).
pub const THERMAL_NOISE_DENSITY_DBM_HZ: f64 = -174.0;

/// Floor applied to linear powers and ratios before taking logarithms (mW).
const LINEAR_POWER_FLOOR: f64 = 1e-30;

// ============================================================================
// Free-Space Path Loss
// ============================================================================

/// The FSPL constant for distance in km and frequency in MHz.
///
/// `20·log10(4π·10⁹ / c)`, commonly rounded to 32.44 dB. The unrounded value
/// keeps [`fspl_db`] and [`fspl_wavelength_db`] identical up to float rounding.
pub fn fspl_constant_db() -> f64 {
    20.0 * (4.0 * std::f64::consts::PI * 1e9 / SPEED_OF_LIGHT_M_S).log10()
}

fn clamp_distance_m(distance_m: f64) -> f64 {
    if distance_m.is_nan() {
        MIN_DISTANCE_M
    } else {
        distance_m.max(MIN_DISTANCE_M)
    }
}

fn clamp_frequency_mhz(frequency_mhz: f64) -> f64 {
    if frequency_mhz.is_nan() {
        MIN_FREQUENCY_MHZ
    } else {
        frequency_mhz.max(MIN_FREQUENCY_MHZ)
    }
}

/// Free-space path loss in dB: `fspl_constant_db() + 20·log10(f_MHz) + 20·log10(d_km)`.
///
/// Distance is clamped to at least [`MIN_DISTANCE_M`] and frequency to at
/// least [`MIN_FREQUENCY_MHZ`].
pub fn fspl_db(distance_m: f64, frequency_mhz: f64) -> f64 {
    let d_km = clamp_distance_m(distance_m) / 1000.0;
    let f_mhz = clamp_frequency_mhz(frequency_mhz);
    fspl_constant_db() + 20.0 * f_mhz.log10() + 20.0 * d_km.log10()
}

/// Free-space path loss in dB from the physical form `20·log10(4πd/λ)`.
///
/// Same clamping as [`fspl_db`].
pub fn fspl_wavelength_db(distance_m: f64, frequency_mhz: f64) -> f64 {
    let d = clamp_distance_m(distance_m);
    let wavelength_m = SPEED_OF_LIGHT_M_S / (clamp_frequency_mhz(frequency_mhz) * 1e6);
    20.0 * (4.0 * std::f64::consts::PI * d / wavelength_m).log10()
}

/// Received power from transmit power and path loss: `Pr = Pt - PL`.
pub fn theoretical_rx_power_dbm(tx_power_dbm: f64, path_loss_db: f64) -> f64 {
    tx_power_dbm - path_loss_db
}

/// Received power under free-space propagation.
pub fn free_space_rx_power_dbm(tx_power_dbm: f64, distance_m: f64, frequency_mhz: f64) -> f64 {
    theoretical_rx_power_dbm(tx_power_dbm, fspl_db(distance_m, frequency_mhz))
}

// ============================================================================
// Coverage
// ============================================================================

/// Coverage at one sensitivity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageRatio {
    /// Sensitivity threshold (dBm).
    pub threshold_dbm: f64,
    /// Percentage of samples with received power at or above the threshold.
    pub percent: f64,
}

/// Percentage of `rx_power_dbm` values that are `>= threshold_dbm`.
///
/// Returns `None` for an empty slice. NaN samples never count as covered.
pub fn coverage_percent(rx_power_dbm: &[f64], threshold_dbm: f64) -> Option<f64> {
    if rx_power_dbm.is_empty() {
        return None;
    }
    let covered = rx_power_dbm.iter().filter(|&&p| p >= threshold_dbm).count();
    Some(100.0 * covered as f64 / rx_power_dbm.len() as f64)
}

/// Coverage for each threshold, evaluated independently over the same samples.
///
/// The output keeps the order of `thresholds_dbm`. Empty input yields an empty table.
pub fn coverage_table(rx_power_dbm: &[f64], thresholds_dbm: &[f64]) -> Vec<CoverageRatio> {
    thresholds_dbm
        .iter()
        .filter_map(|&threshold_dbm| {
            coverage_percent(rx_power_dbm, threshold_dbm).map(|percent| CoverageRatio {
                threshold_dbm,
                percent,
            })
        })
        .collect()
}

// ============================================================================
// Power Conversions
// ============================================================================

/// Convert dBm to milliwatts. `-inf` maps to zero.
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert milliwatts to dBm, flooring at 1e-30 mW.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.max(LINEAR_POWER_FLOOR).log10()
}

// ============================================================================
// Noise, SINR and Throughput
// ============================================================================

/// Thermal noise floor in dBm: `-174 + 10·log10(BW) + NF`.
///
/// Bandwidths below 1 Hz are treated as 1 Hz.
pub fn thermal_noise_dbm(bandwidth_hz: f64, noise_figure_db: f64) -> f64 {
    THERMAL_NOISE_DENSITY_DBM_HZ + 10.0 * bandwidth_hz.max(1.0).log10() + noise_figure_db
}

/// Linear SINR `S / (I + N)`.
///
/// Missing interference means zero interference power (`-inf` dBm).
pub fn sinr_linear(signal_dbm: f64, interference_dbm: Option<f64>, noise_dbm: f64) -> f64 {
    let signal_mw = dbm_to_mw(signal_dbm).max(LINEAR_POWER_FLOOR);
    let interference_mw = interference_dbm.map(dbm_to_mw).unwrap_or(0.0);
    let noise_mw = dbm_to_mw(noise_dbm);
    signal_mw / (interference_mw + noise_mw).max(LINEAR_POWER_FLOOR)
}

/// SINR in dB. See [`sinr_linear`].
pub fn sinr_db(signal_dbm: f64, interference_dbm: Option<f64>, noise_dbm: f64) -> f64 {
    mw_to_dbm(sinr_linear(signal_dbm, interference_dbm, noise_dbm))
}

/// Shannon spectral efficiency `log2(1 + SINR)` capped at `max_bits_per_hz`.
pub fn spectral_efficiency(sinr_linear: f64, max_bits_per_hz: f64) -> f64 {
    (1.0 + sinr_linear.max(0.0)).log2().min(max_bits_per_hz)
}

/// Capacity-bounded throughput in Mbit/s: `BW · SE / 1e6`.
///
/// This is an upper bound from the capped Shannon capacity. It is not an
/// achievable link-layer throughput.
pub fn throughput_bound_mbps(bandwidth_hz: f64, spectral_efficiency: f64) -> f64 {
    bandwidth_hz * spectral_efficiency / 1e6
}

/// Configuration for link budget calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkBudgetConfig {
    /// Channel bandwidth (Hz).
    pub bandwidth_hz: f64,
    /// Receiver noise figure (dB).
    pub noise_figure_db: f64,
    /// Spectral efficiency ceiling (bits/s/Hz).
    pub max_spectral_efficiency: f64,
}

impl LinkBudgetConfig {
    /// Default channel bandwidth: 20 MHz.
    pub const DEFAULT_BANDWIDTH_HZ: f64 = 20e6;

    /// Default receiver noise figure.
    pub const DEFAULT_NOISE_FIGURE_DB: f64 = 5.0;

    /// Default spectral efficiency ceiling, approximating the highest practical MCS.
    pub const DEFAULT_MAX_SPECTRAL_EFFICIENCY: f64 = 7.6;

    /// Thermal noise floor for this configuration.
    pub fn noise_dbm(&self) -> f64 {
        thermal_noise_dbm(self.bandwidth_hz, self.noise_figure_db)
    }

    /// Evaluate the link budget for one received power.
    pub fn evaluate(&self, rx_power_dbm: f64, interference_dbm: Option<f64>) -> LinkBudget {
        let noise_dbm = self.noise_dbm();
        let linear = sinr_linear(rx_power_dbm, interference_dbm, noise_dbm);
        let se = spectral_efficiency(linear, self.max_spectral_efficiency);
        LinkBudget {
            noise_dbm,
            sinr_db: mw_to_dbm(linear),
            spectral_efficiency: se,
            throughput_bound_mbps: throughput_bound_mbps(self.bandwidth_hz, se),
        }
    }
}

impl Default for LinkBudgetConfig {
    fn default() -> Self {
        Self {
            bandwidth_hz: Self::DEFAULT_BANDWIDTH_HZ,
            noise_figure_db: Self::DEFAULT_NOISE_FIGURE_DB,
            max_spectral_efficiency: Self::DEFAULT_MAX_SPECTRAL_EFFICIENCY,
        }
    }
}

/// Result of a link budget evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkBudget {
    /// Thermal noise floor (dBm).
    pub noise_dbm: f64,
    /// Signal to interference plus noise ratio (dB).
    pub sinr_db: f64,
    /// Capped spectral efficiency (bits/s/Hz).
    pub spectral_efficiency: f64,
    /// Capacity-bounded throughput (Mbit/s). An upper bound, not an achievable rate.
    pub throughput_bound_mbps: f64,
}
