//! Integration test: one revolution from gap tooth to output edges.
//!
//! Reference point: 3000 rpm, VE 50 %, SA 20°, MAP 101.3 kPa, 293 K,
//! 35.8 cc. With TDC 360° and a 5° grace the spark discharges at 340°, the
//! injector closes at 335° and the coil starts charging at 268°.

use ecu_common::engine::error::SkipReason;
use ecu_common::engine::state::{Channel, CycleState};
use ecu_control_unit::config::load_config_from_str;
use ecu_control_unit::cycle::{ControlCycle, CycleOutcome};
use ecu_control_unit::engine::SharedEngine;
use ecu_control_unit::runner::CycleRunner;
use ecu_hal::{OutputPin, SimClock, SimOutputs, SimSensors, SimTimer, SpeedProfile};

const CONFIG: &str = r#"
[fuel]
ambient_temp_k = 293.0

[tables.ve]
x_axis = [1000.0, 6000.0]
y_axis = [20.0, 110.0]
values = [[50.0, 50.0], [50.0, 50.0]]

[tables.spark_advance]
x_axis = [1000.0, 6000.0]
y_axis = [20.0, 110.0]
values = [[20.0, 20.0], [20.0, 20.0]]
"#;

/// 101.3 kPa · 17.9e-6 m³ · 28.97 g/mol / (8.314 · 293) / 14.7 / 0.6333 g/s.
const EXPECTED_PULSE_US: f64 = 2316.4;

fn pulse_us() -> f64 {
    let air_g = 101_300.0 * 35.8e-6 * 0.5 * 28.97 / (8.314 * 293.0);
    air_g / 14.7 / 0.6333 * 1.0e6
}

#[test]
fn reference_pulse_width() {
    assert!((pulse_us() - EXPECTED_PULSE_US).abs() < 1.0, "{}", pulse_us());
}

#[test]
fn single_revolution_hits_target_angles() {
    let loaded = load_config_from_str(CONFIG).unwrap();
    let clock = SimClock::new(0);
    let engine = SharedEngine::new(
        &loaded.config,
        SimTimer::new(clock.clone()),
        SimOutputs::new(clock.clone()),
    );
    let mut cycle = ControlCycle::from_loaded(&loaded, SimSensors::new().with_map_kpa(101.3));

    // 3000 rpm: 27.69° per 1538.46 µs; the gap spans two pitches.
    let pitch_us: f64 = 360.0 / 13.0 / 0.018;
    let teeth = [0.0, pitch_us, 2.0 * pitch_us, 4.0 * pitch_us];
    for t in teeth {
        let t = t.round() as u64;
        clock.advance_to(t);
        engine.on_tooth(t);
    }
    let gap_us = (4.0 * pitch_us).round() as u64;

    let CycleOutcome::Revolution(report) = cycle.poll(&engine).unwrap() else {
        panic!("gap tooth must start a revolution");
    };
    let targets = report.targets.unwrap();
    assert!(report.skip.is_empty(), "{:?}", report.skip);
    assert!(!targets.cranking);
    assert!((targets.ve_pct - 50.0).abs() < 1e-9);
    assert!((targets.spark_advance_deg - 20.0).abs() < 1e-9);
    assert!((targets.spark_angle - 340.0).abs() < 1e-9);
    assert!((targets.fuel_end_angle - 335.0).abs() < 1e-9);
    assert!((targets.rpm - 3000.0).abs() < 0.5);
    assert!((targets.fuel_duration_us - pulse_us()).abs() < 1e-6);
    assert!((targets.spark_charge_angle - 268.0).abs() < 0.01);
    assert!((targets.fuel_start_angle - (335.0 - pulse_us() * 0.018)).abs() < 0.01);
    assert_eq!(report.current_angle, Some(30.0));

    // (268 - 30) / 0.018 and (293.3 - 30) / 0.018
    let spark_delay = report.spark_delay_us.unwrap();
    let fuel_delay = report.fuel_delay_us.unwrap();
    assert!(spark_delay.abs_diff(13_222) <= 2, "{spark_delay}");
    assert!(fuel_delay.abs_diff(14_628) <= 2, "{fuel_delay}");
    assert_eq!(
        engine.critical_section(|s| s.cycle_state()),
        CycleState::BothScheduled
    );

    // Deliver the four callbacks.
    while let Some((t, ch)) = engine.critical_section(|s| s.timer().next_expiry()) {
        clock.advance_to(t);
        if engine.critical_section(|s| s.timer_mut().expire(ch)) {
            engine.on_timer_expired(ch);
        }
    }

    let edges = engine.critical_section(|s| s.outputs().edges().to_vec());
    let at = |pin: OutputPin, level: bool| {
        edges
            .iter()
            .find(|e| e.pin == pin && e.level == level)
            .map(|e| e.time_us - gap_us)
            .unwrap()
    };
    assert_eq!(at(OutputPin::SparkCoil, true), u64::from(spark_delay));
    assert_eq!(at(OutputPin::SparkCoil, false), u64::from(spark_delay) + 4_000);
    assert_eq!(at(OutputPin::FuelInjector, true), u64::from(fuel_delay));
    let width = at(OutputPin::FuelInjector, false) - at(OutputPin::FuelInjector, true);
    assert_eq!(width, 2_316);

    // Discharge lands on the spark angle.
    let discharge_angle = 30.0 + at(OutputPin::SparkCoil, false) as f64 * 0.018;
    assert!((discharge_angle - 340.0).abs() < 0.1, "{discharge_angle}");

    engine.critical_section(|s| {
        assert_eq!(s.cycle_state(), CycleState::Idle);
        assert_eq!(s.counters().sparks, 1);
        assert_eq!(s.counters().injections, 1);
        assert!(!s.fuel_due());
        assert!(s.output_state().is_off());
    });
}

#[test]
fn cranking_start_hands_over_to_tables() {
    let loaded = load_config_from_str(CONFIG).unwrap();
    let mut runner = CycleRunner::new(
        &loaded,
        SimSensors::new(),
        SpeedProfile::ramp(200.0, 2000.0, 1_000_000),
        100,
    )
    .unwrap();
    let report = runner.run_until(1_500_000);

    let cranking: Vec<_> = report
        .revolutions
        .iter()
        .filter_map(|r| r.targets)
        .map(|t| t.cranking)
        .collect();
    assert!(cranking.first().copied().unwrap_or(false));
    assert!(!cranking.last().copied().unwrap_or(true));
    // Once off cranking values the speed only rises.
    let handover = cranking.iter().position(|c| !c).unwrap();
    assert!(cranking[handover..].iter().all(|c| !c));

    assert!(report.counters.sparks > 0);
    assert!(report.counters.injections > 0);
    assert_eq!(report.cycle_errors, 0);
    assert_eq!(report.skipped(SkipReason::NOT_RUNNING), 0);
}

#[test]
fn spin_down_stalls_and_forces_outputs_off() {
    let loaded = load_config_from_str(CONFIG).unwrap();
    let mut runner = CycleRunner::new(
        &loaded,
        SimSensors::new(),
        SpeedProfile::ramp(3000.0, 0.0, 300_000),
        100,
    )
    .unwrap();
    let report = runner.run_until(3_000_000);

    assert!(report.counters.sparks > 0);
    assert!(report.cycle_stats.stalls >= 1);
    assert_eq!(report.final_state, CycleState::Idle);
    runner.engine().critical_section(|s| {
        assert!(s.scheduler().is_idle());
        assert!(s.output_state().is_off());
        assert!(!s.outputs().spark_on());
        assert!(!s.outputs().fuel_open());
        assert!(s.scheduler().pending(Channel::Spark).is_none());
    });
}
