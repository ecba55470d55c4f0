//! Per-revolution control state transitions.
//!
//! `Idle → Computing → {SparkScheduled | FuelScheduled | BothScheduled} → Idle`.
//! A new revolution may start from any armed state; its events supersede the
//! previous ones channel by channel. `Fault` is entered on a scheduler defect
//! and left only through `Reset`.

use ecu_common::engine::state::{Channel, CycleState};

/// Result of a CycleState transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded with the new state.
    Ok(CycleState),
    /// Transition rejected with the reason.
    Rejected(&'static str),
}

/// Event that can trigger a CycleState transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// Main loop consumed the recalculation flag.
    RecalcObserved,
    /// Targets derived; the listed channels were armed.
    Armed { spark: bool, fuel: bool },
    /// Revolution abandoned before arming anything.
    Skipped,
    /// Final action of a channel ran.
    ChannelCompleted(Channel),
    /// Speed fell below engage or the crank stalled.
    EngineStopped,
    /// Invalid chain or wrong-channel action detected.
    SchedulerDefect,
    /// Explicit operator reset.
    Reset,
}

/// CycleState holder.
#[derive(Debug, Clone, Default)]
pub struct CycleStateMachine {
    state: CycleState,
}

impl CycleStateMachine {
    pub const fn new() -> Self {
        Self {
            state: CycleState::Idle,
        }
    }

    #[inline]
    pub const fn state(&self) -> CycleState {
        self.state
    }

    #[inline]
    pub const fn is_faulted(&self) -> bool {
        matches!(self.state, CycleState::Fault)
    }

    /// Attempt a transition given an event.
    pub fn handle_event(&mut self, event: CycleEvent) -> TransitionResult {
        use CycleEvent::*;
        use CycleState::*;

        let next = match (self.state, event) {
            // any → Fault
            (_, SchedulerDefect) => Fault,

            // Fault → Idle only on reset.
            (Fault, Reset) => Idle,
            (Fault, _) => return TransitionResult::Rejected("Fault: only Reset allowed"),
            (_, Reset) => return TransitionResult::Rejected("Reset only valid from Fault"),

            // New revolution.
            (Computing, RecalcObserved) => {
                return TransitionResult::Rejected("Computing: revolution already in progress");
            }
            (_, RecalcObserved) => Computing,

            (Computing, Armed { spark, fuel }) => CycleState::armed(spark, fuel),
            (Computing, Skipped) => Idle,
            (_, Armed { .. }) | (_, Skipped) => {
                return TransitionResult::Rejected("targets reported outside Computing");
            }

            (SparkScheduled, ChannelCompleted(Channel::Spark)) => Idle,
            (FuelScheduled, ChannelCompleted(Channel::Fuel)) => Idle,
            (BothScheduled, ChannelCompleted(Channel::Spark)) => FuelScheduled,
            (BothScheduled, ChannelCompleted(Channel::Fuel)) => SparkScheduled,
            // A previous revolution's chain finishing late changes nothing.
            (state, ChannelCompleted(_)) => state,

            (_, EngineStopped) => Idle,
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
