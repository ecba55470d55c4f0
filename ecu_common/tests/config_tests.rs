//! Engine configuration loading tests.
//!
//! Tests for `EcuConfig` through the `ConfigLoader` trait: section defaults,
//! unknown-field rejection, bounds validation and table value parsing.

use ecu_common::config::{ConfigError, ConfigLoader, LogLevel};
use ecu_common::consts::*;
use ecu_common::engine::config::{EcuConfig, TableValues, TemperatureSource};
use std::fs;
use tempfile::TempDir;

const TABLES: &str = r#"
[tables.ve]
x_axis = [500.0, 3000.0, 6000.0]
y_axis = [20.0, 60.0, 100.0]
values = [
    [30.0, 45.0, 55.0],
    [40.0, 60.0, 75.0],
    [45.0, 65.0, 85.0],
]

[tables.spark_advance]
x_axis = [500.0, 6000.0]
y_axis = [20.0, 100.0]
values = [[10.0, 8.0], [35.0, 28.0]]
"#;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("ecu.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn tables_only_file_loads_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TABLES);

    let cfg = EcuConfig::load(&path).unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.shared.log_level, LogLevel::Info);
    assert_eq!(cfg.engine.tdc_deg, TDC_DEG);
    assert_eq!(cfg.crank.missing_tooth_factor, MISSING_TOOTH_FACTOR);
    assert_eq!(cfg.fuel.air_fuel_ratio, AIR_FUEL_RATIO);
    assert_eq!(cfg.limits.upper_rev_limit_rpm, UPPER_REV_LIMIT_RPM);
    assert_eq!(cfg.tables.ve.values.shape(), Some(vec![3, 3]));
    assert_eq!(cfg.tables.spark_advance.values.flatten(), vec![10.0, 8.0, 35.0, 28.0]);
}

#[test]
fn explicit_sections_override_defaults() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        r#"
[shared]
log_level = "debug"
service_name = "bench-ecu"

[engine]
displacement_cc = 49.9
dwell_us = 3000

[crank]
tooth_positions = 36
missing_teeth = 1
missing_tooth_factor = 1.4

[fuel]
temperature_source = "intake"

[limits]
upper_rev_limit_rpm = 9000.0
lower_rev_limit_rpm = 8500.0
{TABLES}"#
    );
    let path = write_config(&dir, &body);

    let cfg = EcuConfig::load(&path).unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.shared.service_name, "bench-ecu");
    assert_eq!(cfg.engine.dwell_us, 3000);
    assert!((cfg.engine.displacement_m3() - 49.9e-6).abs() < 1e-12);
    assert!((cfg.crank.tooth_pitch_deg() - 10.0).abs() < 1e-12);
    assert_eq!(cfg.fuel.temperature_source, TemperatureSource::Intake);
    assert_eq!(cfg.limits.upper_rev_limit_rpm, 9000.0);
}

#[test]
fn integer_table_values_are_accepted() {
    let body = r#"
[tables.ve]
x_axis = [1000, 6000]
y_axis = [20, 100]
values = [[50, 50], [50, 50]]

[tables.spark_advance]
x_axis = [1000, 6000]
y_axis = [20, 100]
values = [[20, 20], [20, 20]]
"#;
    let cfg = EcuConfig::load_str(body).unwrap();
    assert_eq!(cfg.tables.ve.values, TableValues::Grid(vec![vec![50.0; 2]; 2]));
    assert_eq!(cfg.tables.ve.x_axis, vec![1000.0, 6000.0]);
}

#[test]
fn missing_tables_is_parse_error() {
    let result = EcuConfig::load_str("[engine]\ndwell_us = 4000\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn unknown_section_field_is_parse_error() {
    let body = format!("[crank]\nteeth = 12\n{TABLES}");
    let result = EcuConfig::load_str(&body);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn out_of_bounds_values_fail_validation() {
    let cases = [
        ("[engine]\ndwell_us = 50\n", "dwell_us"),
        ("[engine]\ngrace_deg = 120.0\n", "grace_deg"),
        ("[crank]\ntooth_positions = 2\n", "tooth_positions"),
        ("[crank]\nmissing_tooth_factor = 1.0\n", "missing_tooth_factor"),
        ("[fuel]\nair_fuel_ratio = 40.0\n", "air_fuel_ratio"),
        ("[fuel]\ninjector_flow_g_per_s = 0.0\n", "injector_flow_g_per_s"),
        ("[limits]\ncranking_rpm = 50.0\n", "limits"),
        ("[scheduler]\nmin_delay_us = 0\n", "min_delay_us"),
    ];

    for (section, field) in cases {
        let cfg = EcuConfig::load_str(&format!("{section}{TABLES}")).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains(field), "expected {field} in '{err}'");
    }
}

#[test]
fn blank_service_name_fails_validation() {
    let body = format!("[shared]\nservice_name = \"\"\n{TABLES}");
    let cfg = EcuConfig::load_str(&body).unwrap();
    assert!(cfg.validate().unwrap_err().contains("service_name"));
}
