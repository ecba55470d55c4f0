//! Integration test: loading the shipped configuration and files on disk.

use std::fs;
use std::path::Path;

use ecu_common::engine::config::TemperatureSource;
use ecu_control_unit::config::{ConfigError, load_config};
use ecu_control_unit::runner::CycleRunner;
use ecu_hal::{SimSensors, SpeedProfile};
use tempfile::TempDir;

fn shipped_config() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/ecu.toml")
}

#[test]
fn shipped_config_loads() {
    let loaded = load_config(&shipped_config()).unwrap();
    assert_eq!(loaded.config.shared.service_name, "ecu-sim-01");
    assert_eq!(loaded.ve_table.dimensions(), 2);
    assert_eq!(loaded.spark_table.axis(0).unwrap().len(), 6);

    // Breakpoints return grid values exactly.
    assert_eq!(loaded.ve_table.lookup_2d(3000.0, 70.0).unwrap(), 62.0);
    assert_eq!(loaded.spark_table.lookup_2d(500.0, 30.0).unwrap(), 12.0);
}

#[test]
fn shipped_config_runs_clean() {
    let loaded = load_config(&shipped_config()).unwrap();
    let mut runner = CycleRunner::new(
        &loaded,
        SimSensors::new().with_map_kpa(60.0),
        SpeedProfile::constant(2500.0),
        50,
    )
    .unwrap();
    let report = runner.run_until(500_000);
    assert!(report.counters.sparks >= 15);
    assert!(report.counters.injections >= 7);
    assert!(report.last_fault.is_none());
    assert_eq!(report.counters.chain_failures, 0);
}

#[test]
fn intake_temperature_source_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ecu.toml");
    let body = fs::read_to_string(shipped_config())
        .unwrap()
        .replace(r#"temperature_source = "ambient""#, r#"temperature_source = "intake""#);
    fs::write(&path, body).unwrap();

    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.config.fuel.temperature_source, TemperatureSource::Intake);
}

#[test]
fn ragged_grid_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ecu.toml");
    fs::write(
        &path,
        r#"
[tables.ve]
x_axis = [1000.0, 6000.0]
y_axis = [20.0, 100.0]
values = [[50.0, 50.0], [50.0]]

[tables.spark_advance]
x_axis = [1000.0, 6000.0]
y_axis = [20.0, 100.0]
values = [[20.0, 20.0], [20.0, 20.0]]
"#,
    )
    .unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(
        matches!(err, ConfigError::TableError { table: "ve", .. }),
        "{err}"
    );
}

#[test]
fn inverted_limits_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ecu.toml");
    let body = fs::read_to_string(shipped_config())
        .unwrap()
        .replace("lower_rev_limit_rpm = 5800.0", "lower_rev_limit_rpm = 6200.0");
    fs::write(&path, body).unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("limits"));
}
