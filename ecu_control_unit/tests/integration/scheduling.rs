//! Integration test: channel scheduling through timer callbacks.
//!
//! Drives `SharedEngine` with the simulated timer the way the hardware
//! would: advance the clock to the earliest deadline, let the timer expire,
//! deliver the callback.

use ecu_common::engine::state::{Action, Channel, CycleState};
use ecu_control_unit::config::load_config_from_str;
use ecu_control_unit::engine::SharedEngine;
use ecu_control_unit::scheduler::{EventScheduler, SchedulerError};
use ecu_hal::{OutputPin, SimClock, SimOutputs, SimTimer};

const CONFIG: &str = r#"
[scheduler]
min_delay_us = 5

[tables.ve]
x_axis = [1000.0, 6000.0]
y_axis = [20.0, 110.0]
values = [[50.0, 50.0], [50.0, 50.0]]

[tables.spark_advance]
x_axis = [1000.0, 6000.0]
y_axis = [20.0, 110.0]
values = [[20.0, 20.0], [20.0, 20.0]]
"#;

fn engine() -> (SimClock, SharedEngine<SimTimer, SimOutputs>) {
    let loaded = load_config_from_str(CONFIG).unwrap();
    let clock = SimClock::new(0);
    let engine = SharedEngine::new(
        &loaded.config,
        SimTimer::new(clock.clone()),
        SimOutputs::new(clock.clone()),
    );
    (clock, engine)
}

/// Deliver every expiry up to `until_us`.
fn run_timers(clock: &SimClock, engine: &SharedEngine<SimTimer, SimOutputs>, until_us: u64) {
    while let Some((t, ch)) = engine.critical_section(|s| s.timer().next_expiry()) {
        if t > until_us {
            break;
        }
        clock.advance_to(t);
        if engine.critical_section(|s| s.timer_mut().expire(ch)) {
            engine.on_timer_expired(ch);
        }
    }
    clock.advance_to(until_us);
}

#[test]
fn rescheduled_spark_fires_once_at_new_deadline() {
    let (clock, engine) = engine();
    engine
        .critical_section(|s| s.arm(Channel::Spark, 500.0, Action::BeginSparkCharge))
        .unwrap();
    engine
        .critical_section(|s| s.arm(Channel::Spark, 800.0, Action::BeginSparkCharge))
        .unwrap();

    run_timers(&clock, &engine, 10_000);

    let edges = engine.critical_section(|s| s.outputs().edges().to_vec());
    let rising: Vec<_> = edges
        .iter()
        .filter(|e| e.pin == OutputPin::SparkCoil && e.level)
        .collect();
    assert_eq!(rising.len(), 1);
    assert_eq!(rising[0].time_us, 800);
    assert_eq!(engine.critical_section(|s| s.counters().sparks), 1);
    assert_eq!(
        engine.critical_section(|s| s.scheduler().stats().superseded),
        1
    );
}

#[test]
fn spark_and_fuel_chains_are_independent() {
    let (clock, engine) = engine();
    engine.critical_section(|s| {
        s.set_pending_fuel_us(3_000.0);
        s.arm(Channel::Spark, 1_000.0, Action::BeginSparkCharge).unwrap();
        s.arm(Channel::Fuel, 1_500.0, Action::OpenFuelInjector).unwrap();
    });

    run_timers(&clock, &engine, 20_000);

    let edges = engine.critical_section(|s| s.outputs().edges().to_vec());
    let times: Vec<_> = edges.iter().map(|e| (e.time_us, e.pin, e.level)).collect();
    assert_eq!(
        times,
        vec![
            (1_000, OutputPin::SparkCoil, true),
            (1_500, OutputPin::FuelInjector, true),
            (4_500, OutputPin::FuelInjector, false),
            (5_000, OutputPin::SparkCoil, false),
        ]
    );
    engine.critical_section(|s| {
        assert!(s.scheduler().is_idle());
        assert!(s.output_state().is_off());
    });
}

#[test]
fn past_due_delay_clamped_to_minimum() {
    let clock = SimClock::new(1_000);
    let mut scheduler = EventScheduler::new(SimTimer::new(clock.clone()), 5);
    let ticks = scheduler
        .schedule(Channel::Spark, -250.0, Action::BeginSparkCharge)
        .unwrap();
    assert_eq!(ticks, 5);
    assert_eq!(scheduler.pending(Channel::Spark).unwrap().due_at_us(), 1_005);
    assert_eq!(scheduler.stats().clamped, 1);
}

#[test]
fn non_finite_delay_is_not_a_defect() {
    let clock = SimClock::new(0);
    let mut scheduler = EventScheduler::new(SimTimer::new(clock), 1);
    let err = scheduler
        .schedule(Channel::Fuel, f64::NAN, Action::OpenFuelInjector)
        .unwrap_err();
    assert_eq!(err, SchedulerError::InvalidDelay { channel: Channel::Fuel });
    assert!(!err.is_defect());
    assert!(scheduler.is_idle());
}

#[test]
fn main_loop_defect_latches_fault_and_blocks_until_reset() {
    let (clock, engine) = engine();
    engine
        .critical_section(|s| s.arm(Channel::Spark, 100.0, Action::BeginSparkCharge))
        .unwrap();
    let err = engine
        .critical_section(|s| s.arm(Channel::Fuel, 100.0, Action::BeginSparkCharge))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::WrongChannel { .. }));

    engine.critical_section(|s| {
        assert_eq!(s.cycle_state(), CycleState::Fault);
        assert!(s.scheduler().is_idle());
        assert!(s.output_state().is_off());
    });
    run_timers(&clock, &engine, 1_000);
    assert!(engine.critical_section(|s| s.outputs().edges().is_empty()));

    engine.reset();
    assert_eq!(engine.critical_section(|s| s.cycle_state()), CycleState::Idle);
}

#[test]
fn cancel_all_disarms_hardware() {
    let (clock, engine) = engine();
    engine.critical_section(|s| {
        s.set_pending_fuel_us(1_000.0);
        s.arm(Channel::Spark, 300.0, Action::BeginSparkCharge).unwrap();
        s.arm(Channel::Fuel, 200.0, Action::OpenFuelInjector).unwrap();
    });
    run_timers(&clock, &engine, 250);
    assert!(engine.critical_section(|s| s.output_state().fuel_open));

    engine.critical_section(|s| s.shut_down());
    run_timers(&clock, &engine, 10_000);

    engine.critical_section(|s| {
        assert!(s.timer().next_expiry().is_none());
        assert!(!s.outputs().fuel_open());
        assert!(!s.outputs().spark_on());
        assert_eq!(s.counters().injections, 0);
        assert_eq!(s.counters().sparks, 0);
    });
}
