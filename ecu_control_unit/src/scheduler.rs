//! Single-slot event scheduling on top of the one-shot timer collaborator.
//!
//! Each [`Channel`] holds at most one pending [`Action`]. Scheduling an
//! occupied channel supersedes the pending event. When the channel expires
//! the stored action is taken out and dispatched by the engine; during that
//! dispatch the only schedule call accepted is the action's own successor
//! on the same channel.
//!
//! ## Delay guard
//! Delays are computed in floating point by the control cycle. A delay at or
//! below zero never reaches the hardware as a wrapped count: it is clamped
//! to the configured minimum and counted.

use ecu_common::consts::CHANNEL_COUNT;
use ecu_common::engine::state::{Action, Channel};
use ecu_common::hal::{HalError, TimerDriver};
use thiserror::Error;
use tracing::{trace, warn};

// ─── Errors ─────────────────────────────────────────────────────────

/// Scheduler consistency violations and timer failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// Action bound to a channel other than its own.
    #[error("{action} cannot be scheduled on the {channel} channel")]
    WrongChannel { channel: Channel, action: Action },

    /// Callback tried to arm something other than its successor.
    #[error("{from} may not chain {to}")]
    InvalidChain { from: Action, to: Action },

    /// Follow-up action armed from the main loop.
    #[error("{action} may only be chained from a timer callback")]
    ChainOutsideCallback { action: Action },

    /// Delay is NaN or infinite.
    #[error("non-finite delay on the {channel} channel")]
    InvalidDelay { channel: Channel },

    /// Timer collaborator rejected the request.
    #[error(transparent)]
    Timer(#[from] HalError),
}

impl SchedulerError {
    /// Programming defects that must latch the control state into fault.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::WrongChannel { .. } | Self::InvalidChain { .. } | Self::ChainOutsideCallback { .. }
        )
    }
}

// ─── Scheduled Event ────────────────────────────────────────────────

/// Pending event in a channel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub action: Action,
    /// Delay handed to the timer [µs].
    pub delay_us: u32,
    /// Clock reading when armed [µs].
    pub armed_at_us: u64,
}

impl ScheduledEvent {
    #[inline]
    pub fn due_at_us(&self) -> u64 {
        self.armed_at_us + u64::from(self.delay_us)
    }
}

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub superseded: u64,
    pub clamped: u64,
    pub cancelled: u64,
    pub dispatched: u64,
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// Per-channel single-slot scheduler owning the timer collaborator.
#[derive(Debug)]
pub struct EventScheduler<T> {
    timer: T,
    slots: [Option<ScheduledEvent>; CHANNEL_COUNT],
    dispatching: Option<Action>,
    min_delay_us: u32,
    stats: SchedulerStats,
}

impl<T: TimerDriver> EventScheduler<T> {
    pub fn new(timer: T, min_delay_us: u32) -> Self {
        Self {
            timer,
            slots: [None; CHANNEL_COUNT],
            dispatching: None,
            min_delay_us: min_delay_us.max(1),
            stats: SchedulerStats::default(),
        }
    }

    /// Arm `action` on `channel` after `delay_us`.
    ///
    /// Returns the delay actually handed to the timer.
    ///
    /// # Errors
    /// - `WrongChannel` if `action` belongs to the other channel
    /// - `InvalidChain` if called from a callback with anything but its successor
    /// - `ChainOutsideCallback` if a follow-up action is armed from the main loop
    /// - `InvalidDelay` / `Timer` for unusable delays
    pub fn schedule(
        &mut self,
        channel: Channel,
        delay_us: f64,
        action: Action,
    ) -> Result<u32, SchedulerError> {
        if action.channel() != channel {
            return Err(SchedulerError::WrongChannel { channel, action });
        }
        match self.dispatching {
            Some(from) if from.successor() != Some(action) => {
                return Err(SchedulerError::InvalidChain { from, to: action });
            }
            None if !action.is_initial() => {
                return Err(SchedulerError::ChainOutsideCallback { action });
            }
            _ => {}
        }
        if !delay_us.is_finite() {
            return Err(SchedulerError::InvalidDelay { channel });
        }

        let ticks = self.to_ticks(channel, delay_us);
        self.timer.start_one_shot(channel, ticks)?;

        let event = ScheduledEvent {
            action,
            delay_us: ticks,
            armed_at_us: self.timer.now_us(),
        };
        if let Some(previous) = self.slots[channel.index()].replace(event) {
            self.stats.superseded += 1;
            trace!(%channel, superseded = %previous.action, "pending event replaced");
        }
        self.stats.scheduled += 1;
        trace!(%channel, %action, delay_us = ticks, "event armed");
        Ok(ticks)
    }

    fn to_ticks(&mut self, channel: Channel, delay_us: f64) -> u32 {
        if delay_us <= 0.0 {
            self.stats.clamped += 1;
            warn!(%channel, delay_us, "past-due delay clamped to minimum");
            return self.min_delay_us;
        }
        let rounded = delay_us.round();
        if rounded >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            (rounded as u32).max(self.min_delay_us)
        }
    }

    /// Disarm `channel` without running its action.
    pub fn cancel(&mut self, channel: Channel) {
        self.timer.cancel(channel);
        if self.slots[channel.index()].take().is_some() {
            self.stats.cancelled += 1;
        }
    }

    pub fn cancel_all(&mut self) {
        for channel in Channel::ALL {
            self.cancel(channel);
        }
    }

    /// Take the action stored on an expired channel and enter dispatch.
    ///
    /// Returns `None` for a spurious expiry of an idle channel.
    pub fn begin_dispatch(&mut self, channel: Channel) -> Option<Action> {
        let event = self.slots[channel.index()].take()?;
        self.dispatching = Some(event.action);
        self.stats.dispatched += 1;
        Some(event.action)
    }

    /// Leave callback context.
    #[inline]
    pub fn end_dispatch(&mut self) {
        self.dispatching = None;
    }

    #[inline]
    pub fn pending(&self, channel: Channel) -> Option<ScheduledEvent> {
        self.slots[channel.index()]
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Time since `channel` was armed, from the timer collaborator.
    #[inline]
    pub fn elapsed_us(&self, channel: Channel) -> Option<u64> {
        self.timer.elapsed_us(channel)
    }

    #[inline]
    pub fn now_us(&self) -> u64 {
        self.timer.now_us()
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
