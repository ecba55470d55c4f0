//! Integration test: rev limiter hysteresis through the control cycle.

use ecu_common::engine::error::SkipReason;
use ecu_common::engine::state::Channel;
use ecu_control_unit::config::load_config_from_str;
use ecu_control_unit::cycle::{ControlCycle, CycleOutcome, RevolutionReport};
use ecu_control_unit::engine::SharedEngine;
use ecu_control_unit::runner::CycleRunner;
use ecu_hal::{SimClock, SimOutputs, SimSensors, SimTimer, SpeedProfile};

const CONFIG: &str = r#"
[limits]
upper_rev_limit_rpm = 6000.0
lower_rev_limit_rpm = 5800.0

[tables.ve]
x_axis = [1000.0, 7000.0]
y_axis = [20.0, 110.0]
values = [[60.0, 80.0], [60.0, 80.0]]

[tables.spark_advance]
x_axis = [1000.0, 7000.0]
y_axis = [20.0, 110.0]
values = [[15.0, 12.0], [35.0, 30.0]]
"#;

const PITCH_DEG: f64 = 360.0 / 13.0;

/// Hand-cranked wheel: teeth are fed directly, timers are never delivered.
struct Rig {
    clock: SimClock,
    engine: SharedEngine<SimTimer, SimOutputs>,
    cycle: ControlCycle<SimSensors>,
    t_us: f64,
}

impl Rig {
    fn new() -> Self {
        let loaded = load_config_from_str(CONFIG).unwrap();
        let clock = SimClock::new(0);
        let engine = SharedEngine::new(
            &loaded.config,
            SimTimer::new(clock.clone()),
            SimOutputs::new(clock.clone()),
        );
        engine.on_tooth(0);
        Self {
            clock,
            engine,
            cycle: ControlCycle::from_loaded(&loaded, SimSensors::new()),
            t_us: 0.0,
        }
    }

    fn tooth(&mut self, dt_us: f64) {
        self.t_us += dt_us;
        let t = self.t_us.round() as u64;
        self.clock.advance_to(t);
        self.engine.on_tooth(t);
    }

    /// One full revolution at `rpm` ending on the gap tooth, then a poll.
    fn revolution(&mut self, rpm: f64) -> RevolutionReport {
        let pitch_us = PITCH_DEG / (rpm * 6.0e-6);
        for _ in 0..11 {
            self.tooth(pitch_us);
        }
        self.tooth(2.0 * pitch_us);
        match self.cycle.poll(&self.engine).unwrap() {
            CycleOutcome::Revolution(report) => report,
            other => panic!("expected a revolution at {rpm} rpm, got {other:?}"),
        }
    }
}

#[test]
fn limiter_engages_above_upper_and_releases_at_lower() {
    let mut rig = Rig::new();

    let report = rig.revolution(5000.0);
    assert!(report.spark_scheduled());
    assert!(report.skip.is_empty());

    let report = rig.revolution(6100.0);
    assert_eq!(report.skip, SkipReason::REV_LIMITED);
    assert!(!report.spark_scheduled());
    assert!(!report.fuel_scheduled());
    assert!(rig.cycle.rev_limiter().is_limited());

    // Between the limits: still limited.
    let report = rig.revolution(5900.0);
    assert_eq!(report.skip, SkipReason::REV_LIMITED);

    let report = rig.revolution(5700.0);
    assert!(!report.skip.contains(SkipReason::REV_LIMITED));
    assert!(report.spark_scheduled());

    // Back between the limits from below: not limited.
    let report = rig.revolution(5950.0);
    assert!(report.spark_scheduled());

    assert_eq!(rig.cycle.rev_limiter().engagements(), 1);
    assert_eq!(rig.cycle.stats().skip_count(SkipReason::REV_LIMITED), 2);
}

#[test]
fn limited_revolution_leaves_events_in_flight() {
    let mut rig = Rig::new();
    rig.revolution(5000.0);
    let before = rig
        .engine
        .critical_section(|s| s.scheduler().pending(Channel::Spark));
    assert!(before.is_some());

    rig.revolution(6100.0);
    let after = rig
        .engine
        .critical_section(|s| s.scheduler().pending(Channel::Spark));
    assert_eq!(before, after);
}

#[test]
fn ramp_through_limit_stops_scheduling() {
    let loaded = load_config_from_str(CONFIG).unwrap();
    let mut runner = CycleRunner::new(
        &loaded,
        SimSensors::new(),
        SpeedProfile::ramp(5000.0, 7000.0, 400_000),
        100,
    )
    .unwrap();
    let report = runner.run_until(600_000);

    assert_eq!(report.rev_limit_engagements, 1);
    let first_limited = report
        .revolutions
        .iter()
        .position(|r| r.skip.contains(SkipReason::REV_LIMITED))
        .expect("limiter never engaged");
    assert!(first_limited > 0);
    assert!(report.revolutions[..first_limited].iter().all(|r| r.spark_scheduled()));
    for r in &report.revolutions[first_limited..] {
        assert!(r.skip.contains(SkipReason::REV_LIMITED), "{r:?}");
        assert!(r.rpm > 5800.0);
        assert!(!r.spark_scheduled());
    }
    assert!(report.counters.sparks > 0);
    assert!(report.last_fault.is_none());
}
