//! TOML configuration loader with validation.
//!
//! Loads [`EcuConfig`] from a single TOML file, runs the section bound
//! checks and builds both calibration tables so that a bad breakpoint set
//! is rejected at startup rather than on the first revolution.

use std::path::Path;

use ecu_common::engine::config::EcuConfig;

use crate::table::{CalibrationTable, TableError};

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug)]
pub enum ConfigError {
    /// File I/O error.
    IoError(String),
    /// TOML parse error.
    ParseError(String),
    /// Parameter validation error.
    ValidationError(String),
    /// Calibration table rejected.
    TableError { table: &'static str, source: TableError },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "config I/O error: {e}"),
            Self::ParseError(e) => write!(f, "config parse error: {e}"),
            Self::ValidationError(e) => write!(f, "config validation: {e}"),
            Self::TableError { table, source } => write!(f, "tables.{table}: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TableError { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ─── Loaded Config Bundle ───────────────────────────────────────────

/// Complete validated configuration bundle, ready for runtime use.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EcuConfig,
    /// Volumetric efficiency [%] over (rpm, map kPa).
    pub ve_table: CalibrationTable,
    /// Spark advance [deg BTDC] over (rpm, map kPa).
    pub spark_table: CalibrationTable,
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the ECU configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&content)
}

/// Load config from a TOML string (for testing).
///
/// 1. Parse → `EcuConfig`
/// 2. Section bounds and cross-field rules
/// 3. Build the VE and spark advance tables
pub fn load_config_from_str(content: &str) -> Result<LoadedConfig, ConfigError> {
    let config: EcuConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate().map_err(ConfigError::ValidationError)?;

    let ve_table = CalibrationTable::from_config(&config.tables.ve)
        .map_err(|source| ConfigError::TableError { table: "ve", source })?;
    let spark_table = CalibrationTable::from_config(&config.tables.spark_advance)
        .map_err(|source| ConfigError::TableError {
            table: "spark_advance",
            source,
        })?;

    Ok(LoadedConfig {
        config,
        ve_table,
        spark_table,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────
