//! Per-revolution skip flags.
//!
//! Recoverable anomalies do not raise errors: the affected revolution's
//! actions are skipped, the reason is recorded here, and the next detected
//! revolution retries from scratch.

use bitflags::bitflags;

bitflags! {
    /// Why some or all of a revolution's actions were not scheduled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SkipReason: u16 {
        /// Speed below engage threshold; outputs forced off.
        const NOT_RUNNING      = 0x0001;
        /// Angular velocity undefined or zero.
        const POSITION_UNKNOWN = 0x0002;
        /// Rev limiter active.
        const REV_LIMITED      = 0x0004;
        /// Sensor read failed or returned a non-finite value.
        const SENSOR_FAULT     = 0x0008;
        /// Table lookup failed or derived target is non-finite.
        const TABLE_FAULT      = 0x0010;
        /// Spark charge angle already passed.
        const SPARK_LATE       = 0x0020;
        /// Fuel start angle already passed.
        const FUEL_LATE        = 0x0040;
        /// Alternate revolution, no injection due.
        const FUEL_NOT_DUE     = 0x0080;
        /// Control state latched in fault.
        const FAULTED          = 0x0100;
        /// Channel still finishing the previous revolution's follow-up action.
        const CHANNEL_BUSY     = 0x0200;
        /// Timer collaborator rejected the delay.
        const TIMER_FAULT      = 0x0400;
    }
}

impl SkipReason {
    /// Flags that suppress both channels for the revolution.
    pub const SUPPRESS_ALL: Self = Self::from_bits_truncate(
        Self::NOT_RUNNING.bits()
            | Self::POSITION_UNKNOWN.bits()
            | Self::REV_LIMITED.bits()
            | Self::SENSOR_FAULT.bits()
            | Self::TABLE_FAULT.bits()
            | Self::FAULTED.bits(),
    );

    /// Returns true if the whole revolution was abandoned.
    #[inline]
    pub const fn suppresses_all(&self) -> bool {
        self.intersects(Self::SUPPRESS_ALL)
    }
}

impl Default for SkipReason {
    fn default() -> Self {
        Self::empty()
    }
}
