//! Integration test: gap detection, speed and angle extrapolation.

use ecu_common::consts::TDC_DEG;
use ecu_common::engine::config::CrankConfig;
use ecu_control_unit::crank::CrankTracker;
use ecu_hal::{SpeedProfile, TriggerWheelSim};

const PITCH_13: f64 = 360.0 / 13.0;

#[test]
fn fourth_tooth_closes_the_gap() {
    let mut tracker = CrankTracker::new(&CrankConfig::default(), TDC_DEG);
    for t in [0, 1_000, 2_000] {
        tracker.on_tooth(t);
        assert!(!tracker.recalc_pending());
    }
    tracker.on_tooth(3_301);

    let snap = tracker.snapshot();
    assert!(tracker.recalc_pending());
    assert!(snap.synced);
    assert_eq!(snap.tooth_count, 0);
    assert_eq!(snap.last_tooth_angle, 30.0);
    assert_eq!(snap.last_event_us, 3_301);
    assert!((snap.angular_velocity - 2.0 * PITCH_13 / 1_301.0).abs() < 1e-12);
}

#[test]
fn velocity_from_regular_interval() {
    let mut tracker = CrankTracker::new(&CrankConfig::default(), TDC_DEG);
    tracker.on_tooth(0);
    tracker.on_tooth(1_000);
    assert!((tracker.angular_velocity() - 0.02769).abs() < 1e-5);
    assert!(!tracker.snapshot().position_known());
}

#[test]
fn angle_extrapolates_from_last_tooth() {
    let mut tracker = CrankTracker::new(&CrankConfig::default(), TDC_DEG);
    for t in [0, 1_000, 2_000, 3_301, 4_301] {
        tracker.on_tooth(t);
    }
    let snap = tracker.snapshot();
    let omega = PITCH_13 / 1_000.0;
    assert_eq!(snap.tooth_count, 1);
    assert!((snap.last_tooth_angle - (30.0 + PITCH_13)).abs() < 1e-9);

    let angle = snap.estimate_angle(4_801).unwrap();
    assert!((angle - (30.0 + PITCH_13 + 500.0 * omega)).abs() < 1e-9);
}

#[test]
fn simulated_wheel_syncs_once_per_revolution() {
    let config = CrankConfig::default();
    let mut tracker = CrankTracker::new(&config, TDC_DEG);
    let wheel = TriggerWheelSim::new(
        config.tooth_positions,
        config.missing_teeth,
        SpeedProfile::constant(3000.0),
        0,
    )
    .unwrap();

    let mut gaps = 0;
    for tooth in wheel.take(12 * 10 + 1) {
        tracker.on_tooth(tooth.time_us);
        if tracker.recalc_pending() {
            gaps += 1;
            assert_eq!(tooth.position, 0, "gap must close on the first tooth");
            let rpm = tracker.snapshot().rpm();
            assert!((rpm - 3000.0).abs() < 3.0, "{rpm}");
            tracker.clear_recalc();
        }
    }
    assert_eq!(gaps, 10);
    assert_eq!(tracker.revolutions(), 10);
}

#[test]
fn thirty_six_minus_one_wheel() {
    let config = CrankConfig {
        tooth_positions: 36,
        missing_teeth: 1,
        calibration_angle_deg: 0.0,
        ..CrankConfig::default()
    };
    let mut tracker = CrankTracker::new(&config, TDC_DEG);
    let wheel = TriggerWheelSim::new(36, 1, SpeedProfile::constant(6000.0), 0).unwrap();
    for tooth in wheel.take(36) {
        tracker.on_tooth(tooth.time_us);
    }
    let snap = tracker.snapshot();
    assert!(snap.synced);
    assert_eq!(snap.last_tooth_angle, 0.0);
    assert!((snap.rpm() - 6000.0).abs() < 10.0);
}

#[test]
fn stall_drops_sync_until_next_gap() {
    let mut tracker = CrankTracker::new(&CrankConfig::default(), TDC_DEG);
    for t in [0, 1_000, 2_000, 3_301] {
        tracker.on_tooth(t);
    }
    assert!(!tracker.check_stall(100_000, 600_000));
    assert!(tracker.check_stall(700_000, 600_000));
    assert!(!tracker.snapshot().position_known());
    assert!(!tracker.recalc_pending());
    assert!(!tracker.check_stall(800_000, 600_000));

    // Restart: first tooth only records, the next gap resyncs.
    for t in [900_000, 901_000, 902_000, 903_301] {
        tracker.on_tooth(t);
    }
    assert!(tracker.snapshot().position_known());
}
