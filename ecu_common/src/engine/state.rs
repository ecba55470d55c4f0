//! State enums and event tags for the engine control core.
//!
//! All enums use `#[repr(u8)]` so they can be logged, counted and stored in
//! fixed-size arrays without allocation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::consts::CHANNEL_COUNT;

// ─── Timer Channels ─────────────────────────────────────────────────

/// Logical timer slot. Each channel holds at most one pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    /// Spark coil charge/discharge.
    Spark = 0,
    /// Fuel injector open/close.
    Fuel = 1,
}

impl Channel {
    /// All channels in index order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [Channel::Spark, Channel::Fuel];

    /// Slot index for fixed-size per-channel arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Spark),
            1 => Some(Self::Fuel),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spark => f.write_str("spark"),
            Self::Fuel => f.write_str("fuel"),
        }
    }
}

// ─── Scheduled Actions ──────────────────────────────────────────────

/// Action bound to a scheduled timer event.
///
/// Dispatched by channel identity when the channel's timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    /// Energize the spark coil, then chain the discharge after the dwell time.
    BeginSparkCharge = 0,
    /// De-energize the coil; the spark fires on this edge.
    EndSparkDischarge = 1,
    /// Open the injector, then chain the close after the fuel duration.
    OpenFuelInjector = 2,
    /// Close the injector.
    CloseFuelInjector = 3,
}

impl Action {
    /// Channel this action must be scheduled on.
    #[inline]
    pub const fn channel(self) -> Channel {
        match self {
            Self::BeginSparkCharge | Self::EndSparkDischarge => Channel::Spark,
            Self::OpenFuelInjector | Self::CloseFuelInjector => Channel::Fuel,
        }
    }

    /// The only action this action's callback may chain, if any.
    #[inline]
    pub const fn successor(self) -> Option<Action> {
        match self {
            Self::BeginSparkCharge => Some(Self::EndSparkDischarge),
            Self::OpenFuelInjector => Some(Self::CloseFuelInjector),
            Self::EndSparkDischarge | Self::CloseFuelInjector => None,
        }
    }

    /// Whether this action opens a revolution's event pair.
    #[inline]
    pub const fn is_initial(self) -> bool {
        matches!(self, Self::BeginSparkCharge | Self::OpenFuelInjector)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeginSparkCharge => "begin_spark_charge",
            Self::EndSparkDischarge => "end_spark_discharge",
            Self::OpenFuelInjector => "open_fuel_injector",
            Self::CloseFuelInjector => "close_fuel_injector",
        };
        f.write_str(name)
    }
}

// ─── Control Cycle State ────────────────────────────────────────────

/// Per-revolution control state.
///
/// `Idle → Computing → {SparkScheduled | FuelScheduled | BothScheduled} → Idle`.
/// `Fault` is latched on a scheduler consistency violation and exits only
/// through an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CycleState {
    /// No targets pending.
    Idle = 0,
    /// Recalculation observed, targets being derived.
    Computing = 1,
    /// Spark channel armed for this revolution.
    SparkScheduled = 2,
    /// Fuel channel armed for this revolution.
    FuelScheduled = 3,
    /// Both channels armed for this revolution.
    BothScheduled = 4,
    /// Scheduler defect detected, outputs forced off.
    Fault = 5,
}

impl CycleState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Computing),
            2 => Some(Self::SparkScheduled),
            3 => Some(Self::FuelScheduled),
            4 => Some(Self::BothScheduled),
            5 => Some(Self::Fault),
            _ => None,
        }
    }

    /// Armed state for the given channel combination, `Idle` when none.
    #[inline]
    pub const fn armed(spark: bool, fuel: bool) -> Self {
        match (spark, fuel) {
            (true, true) => Self::BothScheduled,
            (true, false) => Self::SparkScheduled,
            (false, true) => Self::FuelScheduled,
            (false, false) => Self::Idle,
        }
    }

    /// Whether any channel is armed for the current revolution.
    #[inline]
    pub const fn is_scheduled(&self) -> bool {
        matches!(
            self,
            Self::SparkScheduled | Self::FuelScheduled | Self::BothScheduled
        )
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::Idle
    }
}

// ─── Digital Outputs ────────────────────────────────────────────────

/// Last commanded level of both digital outputs.
///
/// Mutated only inside timer callbacks (or the engine-stopped path, under
/// the critical section).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputState {
    /// Injector open.
    pub fuel_open: bool,
    /// Spark coil energized.
    pub spark_charging: bool,
}

impl OutputState {
    /// Both outputs de-energized.
    #[inline]
    pub const fn is_off(&self) -> bool {
        !self.fuel_open && !self.spark_charging
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_their_channel() {
        assert_eq!(Action::BeginSparkCharge.channel(), Channel::Spark);
        assert_eq!(Action::EndSparkDischarge.channel(), Channel::Spark);
        assert_eq!(Action::OpenFuelInjector.channel(), Channel::Fuel);
        assert_eq!(Action::CloseFuelInjector.channel(), Channel::Fuel);
    }

    #[test]
    fn successors_stay_on_the_same_channel() {
        for action in [
            Action::BeginSparkCharge,
            Action::EndSparkDischarge,
            Action::OpenFuelInjector,
            Action::CloseFuelInjector,
        ] {
            if let Some(next) = action.successor() {
                assert_eq!(next.channel(), action.channel());
                assert!(next.successor().is_none(), "{action} chains more than once");
            }
        }
    }

    #[test]
    fn channel_roundtrip_and_index() {
        for ch in Channel::ALL {
            assert_eq!(Channel::from_u8(ch as u8), Some(ch));
            assert_eq!(Channel::ALL[ch.index()], ch);
        }
        assert_eq!(Channel::from_u8(2), None);
    }

    #[test]
    fn armed_state_combinations() {
        assert_eq!(CycleState::armed(true, true), CycleState::BothScheduled);
        assert_eq!(CycleState::armed(true, false), CycleState::SparkScheduled);
        assert_eq!(CycleState::armed(false, true), CycleState::FuelScheduled);
        assert_eq!(CycleState::armed(false, false), CycleState::Idle);
        assert!(!CycleState::Fault.is_scheduled());
        assert_eq!(CycleState::from_u8(5), Some(CycleState::Fault));
    }

    #[test]
    fn outputs_default_off() {
        assert!(OutputState::default().is_off());
    }
}
