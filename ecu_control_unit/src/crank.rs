//! Crank position and speed tracking from tooth-passage timestamps.
//!
//! The trigger wheel carries evenly spaced teeth with a gap of
//! `missing_teeth` omitted slots. The gap is recognised when a tooth interval
//! exceeds the previous interval by `missing_tooth_factor`; the tooth that
//! closes the gap is placed at the calibration angle and the revolution is
//! handed to the control cycle through the `recalc` flag. Angles wrap at
//! the TDC reference.
//!
//! `on_tooth` runs in the tooth callback and does bookkeeping only.

use ecu_common::consts::DEG_PER_US_TO_RPM;
use ecu_common::engine::config::CrankConfig;
use tracing::trace;

// ─── Snapshot ───────────────────────────────────────────────────────

/// Consistent copy of the tracker fields needed to extrapolate the angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrankSnapshot {
    /// Timestamp of the last accepted tooth [µs].
    pub last_event_us: u64,
    /// Crank angle of the last accepted tooth, in `[0, tdc)` [deg].
    pub last_tooth_angle: f64,
    /// Same angle without wrapping: calibration angle plus the pitches
    /// travelled since the gap [deg].
    pub revolution_angle: f64,
    /// Angular velocity [deg/µs]; zero when undefined.
    pub angular_velocity: f64,
    /// Teeth since the gap.
    pub tooth_count: u16,
    /// A gap has been seen since the last reset or stall.
    pub synced: bool,
    /// Angle at which the crank angle wraps to zero [deg].
    pub tdc_deg: f64,
}

impl CrankSnapshot {
    /// Angle and velocity are both meaningful.
    #[inline]
    pub fn position_known(&self) -> bool {
        self.synced && self.angular_velocity.is_finite() && self.angular_velocity > 0.0
    }

    /// Linear extrapolation of the crank angle at `now_us`, in `[0, tdc)`.
    ///
    /// `None` while the position is unknown.
    #[inline]
    pub fn estimate_angle(&self, now_us: u64) -> Option<f64> {
        if !self.position_known() {
            return None;
        }
        let dt = now_us as f64 - self.last_event_us as f64;
        Some((self.last_tooth_angle + dt * self.angular_velocity).rem_euclid(self.tdc_deg))
    }

    /// Unwrapped extrapolation from the revolution's gap tooth.
    ///
    /// Targets computed for the current revolution are compared against this
    /// angle, so a crank that has already passed TDC reads as late rather
    /// than as early in the next turn.
    #[inline]
    pub fn estimate_revolution_angle(&self, now_us: u64) -> Option<f64> {
        if !self.position_known() {
            return None;
        }
        let dt = now_us as f64 - self.last_event_us as f64;
        Some(self.revolution_angle + dt * self.angular_velocity)
    }

    /// Speed in [rpm].
    #[inline]
    pub fn rpm(&self) -> f64 {
        self.angular_velocity * DEG_PER_US_TO_RPM
    }
}

// ─── Tracker ────────────────────────────────────────────────────────

/// Missing-tooth wheel decoder.
#[derive(Debug, Clone)]
pub struct CrankTracker {
    pitch_deg: f64,
    tdc_deg: f64,
    gap_pitches: f64,
    calibration_angle_deg: f64,
    missing_tooth_factor: f64,

    last_event_us: Option<u64>,
    prev_interval_us: Option<u64>,
    tooth_count: u16,
    revolution_angle: f64,
    angular_velocity: f64,
    synced: bool,
    recalc: bool,
    revolutions: u64,
}

impl CrankTracker {
    /// `tdc_deg` must be positive.
    pub fn new(config: &CrankConfig, tdc_deg: f64) -> Self {
        Self {
            pitch_deg: config.tooth_pitch_deg(),
            tdc_deg,
            gap_pitches: f64::from(config.missing_teeth) + 1.0,
            calibration_angle_deg: config.calibration_angle_deg.rem_euclid(tdc_deg),
            missing_tooth_factor: config.missing_tooth_factor,
            last_event_us: None,
            prev_interval_us: None,
            tooth_count: 0,
            revolution_angle: 0.0,
            angular_velocity: 0.0,
            synced: false,
            recalc: false,
            revolutions: 0,
        }
    }

    /// Account for one physical tooth at `timestamp_us`.
    pub fn on_tooth(&mut self, timestamp_us: u64) {
        let Some(last) = self.last_event_us else {
            self.last_event_us = Some(timestamp_us);
            trace!(timestamp_us, "first tooth recorded");
            return;
        };

        let interval = timestamp_us.saturating_sub(last);
        if interval == 0 {
            trace!(timestamp_us, "duplicate tooth ignored");
            return;
        }

        let is_gap = self
            .prev_interval_us
            .is_some_and(|prev| interval as f64 > prev as f64 * self.missing_tooth_factor);

        if is_gap {
            self.tooth_count = 0;
            self.revolution_angle = self.calibration_angle_deg;
            // The gap interval spans the omitted slots plus one pitch.
            self.angular_velocity = self.pitch_deg * self.gap_pitches / interval as f64;
            self.synced = true;
            self.recalc = true;
            self.revolutions += 1;
            trace!(timestamp_us, interval, "gap detected");
        } else {
            self.tooth_count = self.tooth_count.wrapping_add(1);
            self.revolution_angle += self.pitch_deg;
            self.angular_velocity = self.pitch_deg / interval as f64;
        }

        self.prev_interval_us = Some(interval);
        self.last_event_us = Some(timestamp_us);
    }

    /// Forget sync and velocity if no tooth arrived within `timeout_us`.
    ///
    /// Returns `true` when the tracker transitions to stalled.
    pub fn check_stall(&mut self, now_us: u64, timeout_us: u64) -> bool {
        let Some(last) = self.last_event_us else {
            return false;
        };
        if now_us.saturating_sub(last) <= timeout_us || (!self.synced && self.angular_velocity == 0.0)
        {
            return false;
        }
        self.angular_velocity = 0.0;
        self.synced = false;
        self.recalc = false;
        self.prev_interval_us = None;
        self.last_event_us = None;
        true
    }

    /// Consistent copy of the extrapolation fields.
    #[inline]
    pub fn snapshot(&self) -> CrankSnapshot {
        CrankSnapshot {
            last_event_us: self.last_event_us.unwrap_or(0),
            last_tooth_angle: self.revolution_angle.rem_euclid(self.tdc_deg),
            revolution_angle: self.revolution_angle,
            angular_velocity: self.angular_velocity,
            tooth_count: self.tooth_count,
            synced: self.synced,
            tdc_deg: self.tdc_deg,
        }
    }

    #[inline]
    pub fn estimate_current_angle(&self, now_us: u64) -> Option<f64> {
        self.snapshot().estimate_angle(now_us)
    }

    /// A completed revolution awaits recalculation.
    #[inline]
    pub fn recalc_pending(&self) -> bool {
        self.recalc
    }

    #[inline]
    pub fn clear_recalc(&mut self) {
        self.recalc = false;
    }

    /// Raise the recalculation flag outside the gap path.
    #[inline]
    pub fn request_recalc(&mut self) {
        self.recalc = true;
    }

    #[inline]
    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    #[inline]
    pub fn tooth_count(&self) -> u16 {
        self.tooth_count
    }

    /// Gaps detected since construction.
    #[inline]
    pub fn revolutions(&self) -> u64 {
        self.revolutions
    }

    #[inline]
    pub fn tooth_pitch_deg(&self) -> f64 {
        self.pitch_deg
    }

    #[inline]
    pub fn tdc_deg(&self) -> f64 {
        self.tdc_deg
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
