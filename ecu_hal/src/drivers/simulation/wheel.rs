//! Missing-tooth trigger wheel kinematics.
//!
//! Generates tooth-passage timestamps for a wheel with `tooth_positions`
//! evenly spaced slots of which the last `missing_teeth` are omitted.
//! Position 0 is the first tooth after the gap. Speed follows a linear
//! [`SpeedProfile`] evaluated at each emitted tooth.

use ecu_common::consts::{DEG_PER_REV, RPM_TO_DEG_PER_US};

/// Linear crank-speed ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    pub start_rpm: f64,
    pub end_rpm: f64,
    /// Ramp length [µs]; speed holds at `end_rpm` afterwards.
    pub ramp_us: u64,
}

impl SpeedProfile {
    pub fn constant(rpm: f64) -> Self {
        Self {
            start_rpm: rpm,
            end_rpm: rpm,
            ramp_us: 0,
        }
    }

    pub fn ramp(start_rpm: f64, end_rpm: f64, ramp_us: u64) -> Self {
        Self {
            start_rpm,
            end_rpm,
            ramp_us,
        }
    }

    /// Speed `t_us` after the profile start.
    pub fn rpm_at(&self, t_us: u64) -> f64 {
        if self.ramp_us == 0 || t_us >= self.ramp_us {
            return self.end_rpm;
        }
        let frac = t_us as f64 / self.ramp_us as f64;
        self.start_rpm + (self.end_rpm - self.start_rpm) * frac
    }
}

/// One physical tooth passing the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToothEvent {
    pub time_us: u64,
    /// Slot index, 0 = first tooth after the gap.
    pub position: u16,
}

/// Tooth timestamp generator.
#[derive(Debug, Clone)]
pub struct TriggerWheelSim {
    teeth_present: u16,
    missing_teeth: u16,
    pitch_deg: f64,
    profile: SpeedProfile,
    origin_us: u64,
    next: Option<(f64, u16)>,
}

impl TriggerWheelSim {
    /// First tooth (position 0) passes at `start_us`.
    ///
    /// Returns `None` if the wheel description leaves fewer than two teeth.
    pub fn new(
        tooth_positions: u16,
        missing_teeth: u16,
        profile: SpeedProfile,
        start_us: u64,
    ) -> Option<Self> {
        let teeth_present = tooth_positions.checked_sub(missing_teeth)?;
        if teeth_present < 2 {
            return None;
        }
        Some(Self {
            teeth_present,
            missing_teeth,
            pitch_deg: DEG_PER_REV / f64::from(tooth_positions),
            profile,
            origin_us: start_us,
            next: Some((start_us as f64, 0)),
        })
    }

    /// Time of the next tooth, `None` once the wheel has stopped.
    pub fn peek_time_us(&self) -> Option<u64> {
        self.next.map(|(t, _)| t.round() as u64)
    }

    /// Emit the next tooth and compute the one after it.
    pub fn next_tooth(&mut self) -> Option<ToothEvent> {
        let (time, position) = self.next?;
        let time_us = time.round() as u64;

        let rpm = self.profile.rpm_at(time_us.saturating_sub(self.origin_us));
        self.next = if rpm > 0.0 {
            let (next_position, pitches) = if position + 1 < self.teeth_present {
                (position + 1, 1)
            } else {
                (0, self.missing_teeth + 1)
            };
            let dt = f64::from(pitches) * self.pitch_deg / (rpm * RPM_TO_DEG_PER_US);
            Some((time + dt, next_position))
        } else {
            None
        };

        Some(ToothEvent { time_us, position })
    }

    /// Speed the profile commands at `t_us` (absolute virtual time).
    pub fn rpm_at(&self, t_us: u64) -> f64 {
        self.profile.rpm_at(t_us.saturating_sub(self.origin_us))
    }
}

impl Iterator for TriggerWheelSim {
    type Item = ToothEvent;

    fn next(&mut self) -> Option<ToothEvent> {
        self.next_tooth()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
