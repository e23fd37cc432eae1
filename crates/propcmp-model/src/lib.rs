//! # propcmp-model
//!
//! Input model for propcmp: how simulator exports and configuration files
//! become canonical, typed values.
//!
//! This crate provides:
//! - The column registry with header aliases ([`columns`])
//! - Raw tables as read from CSV ([`RawTable`])
//! - Alias resolution and row parsing ([`Normalizer`])
//! - Layered YAML configuration ([`AnalysisConfig`])
//!
//! ## Column Resolution
//!
//! Each canonical field lists the header names it may appear under. The first
//! candidate present in a file's header wins, canonical name first. Fields
//! with no matching header fall back to a documented default or a derivation
//! (distance from positions, tx power from path loss), or fail with
//! [`NormalizeError::MissingMandatoryField`].

pub mod columns;
pub mod config;
pub mod normalize;
pub mod table;

pub use columns::{column_for_header, ColumnDef, ALL_COLUMNS};
pub use config::{
    validate_link_budget, AnalysisConfig, AnalysisSettings, BuildingsFilter, NormalizeConfig, SampleFilter,
};
pub use normalize::{NormalizedFile, Normalizer, UNKNOWN_MODEL};
pub use table::RawTable;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort normalization of one table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// No alias or derivation resolved a required field.
    #[error("missing mandatory field '{field}' (tried: {})", .tried.join(", "))]
    MissingMandatoryField {
        /// Canonical field name.
        field: &'static str,
        /// Every header name that was tried.
        tried: Vec<String>,
    },

    /// A cell in a resolved column could not be parsed.
    #[error("invalid value '{value}' in column '{column}' at data row {row}")]
    InvalidValue {
        /// Header of the column.
        column: String,
        /// 1-based data row (header excluded).
        row: usize,
        /// Cell text.
        value: String,
    },

    /// The table has a header but no data rows.
    #[error("table has no data rows")]
    EmptyTable,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read config '{path}': {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted configuration key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}
