//! Virtual clock and one-shot channel timers.
//!
//! `SimClock` is a shared microsecond counter advanced by the simulation
//! loop. `SimTimer` implements [`TimerDriver`] against it: arming a channel
//! records a deadline, and the loop asks for the earliest deadline to decide
//! which event to deliver next.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ecu_common::engine::state::Channel;
use ecu_common::consts::CHANNEL_COUNT;
use ecu_common::hal::{HalError, TimerDriver};
use tracing::trace;

// ─── Clock ──────────────────────────────────────────────────────────

/// Shared virtual time [µs]. Clones observe the same counter.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_us: Arc<AtomicU64>,
}

impl SimClock {
    /// Clock starting at `start_us`.
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    /// Current virtual time.
    #[inline]
    pub fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }

    /// Move time forward to `t_us`. Time never runs backwards.
    pub fn advance_to(&self, t_us: u64) {
        self.now_us.fetch_max(t_us, Ordering::AcqRel);
    }

    /// Move time forward by `dt_us`.
    pub fn advance_by(&self, dt_us: u64) {
        self.now_us.fetch_add(dt_us, Ordering::AcqRel);
    }
}

// ─── Timer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed {
    armed_at_us: u64,
    deadline_us: u64,
}

/// One-shot timer per channel on virtual time.
#[derive(Debug)]
pub struct SimTimer {
    clock: SimClock,
    slots: [Option<Armed>; CHANNEL_COUNT],
    max_delay_us: u32,
    started: u64,
}

impl SimTimer {
    /// Timer accepting any non-zero `u32` delay.
    pub fn new(clock: SimClock) -> Self {
        Self::with_max_delay(clock, u32::MAX)
    }

    /// Timer rejecting delays above `max_delay_us`, like a narrow hardware counter.
    pub fn with_max_delay(clock: SimClock, max_delay_us: u32) -> Self {
        Self {
            clock,
            slots: [None; CHANNEL_COUNT],
            max_delay_us,
            started: 0,
        }
    }

    /// Shared clock handle.
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Deadline of `channel`, if armed.
    pub fn deadline_us(&self, channel: Channel) -> Option<u64> {
        self.slots[channel.index()].map(|a| a.deadline_us)
    }

    /// Earliest armed deadline across all channels. Ties go to the lower index.
    pub fn next_expiry(&self) -> Option<(u64, Channel)> {
        Channel::ALL
            .iter()
            .filter_map(|&ch| self.deadline_us(ch).map(|d| (d, ch)))
            .min_by_key(|&(d, ch)| (d, ch.index()))
    }

    /// Disarm `channel` as the hardware does on expiry.
    ///
    /// Returns `false` if the channel was not armed or its deadline lies in
    /// the future.
    pub fn expire(&mut self, channel: Channel) -> bool {
        match self.slots[channel.index()] {
            Some(armed) if armed.deadline_us <= self.clock.now_us() => {
                self.slots[channel.index()] = None;
                trace!(%channel, deadline_us = armed.deadline_us, "timer expired");
                true
            }
            _ => false,
        }
    }

    /// Number of successful `start_one_shot` calls.
    pub fn started_count(&self) -> u64 {
        self.started
    }
}

impl TimerDriver for SimTimer {
    fn start_one_shot(&mut self, channel: Channel, delay_us: u32) -> Result<(), HalError> {
        if delay_us == 0 {
            return Err(HalError::Timer {
                channel,
                reason: "zero delay",
            });
        }
        if delay_us > self.max_delay_us {
            return Err(HalError::Timer {
                channel,
                reason: "delay exceeds counter range",
            });
        }
        let now = self.clock.now_us();
        self.slots[channel.index()] = Some(Armed {
            armed_at_us: now,
            deadline_us: now + u64::from(delay_us),
        });
        self.started += 1;
        Ok(())
    }

    fn cancel(&mut self, channel: Channel) {
        self.slots[channel.index()] = None;
    }

    fn elapsed_us(&self, channel: Channel) -> Option<u64> {
        self.slots[channel.index()].map(|a| self.clock.now_us().saturating_sub(a.armed_at_us))
    }

    fn now_us(&self) -> u64 {
        self.clock.now_us()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_shared_and_monotonic() {
        let clock = SimClock::new(100);
        let other = clock.clone();
        clock.advance_to(250);
        assert_eq!(other.now_us(), 250);
        other.advance_to(200);
        assert_eq!(clock.now_us(), 250);
        other.advance_by(5);
        assert_eq!(clock.now_us(), 255);
    }

    #[test]
    fn arm_expire_and_elapsed() {
        let clock = SimClock::new(1_000);
        let mut timer = SimTimer::new(clock.clone());

        timer.start_one_shot(Channel::Spark, 400).unwrap();
        assert_eq!(timer.deadline_us(Channel::Spark), Some(1_400));
        assert_eq!(timer.elapsed_us(Channel::Fuel), None);

        clock.advance_to(1_150);
        assert_eq!(timer.elapsed_us(Channel::Spark), Some(150));
        assert!(!timer.expire(Channel::Spark));

        clock.advance_to(1_400);
        assert!(timer.expire(Channel::Spark));
        assert_eq!(timer.deadline_us(Channel::Spark), None);
        assert!(!timer.expire(Channel::Spark));
    }

    #[test]
    fn rearming_supersedes_pending_deadline() {
        let clock = SimClock::new(0);
        let mut timer = SimTimer::new(clock);
        timer.start_one_shot(Channel::Fuel, 900).unwrap();
        timer.start_one_shot(Channel::Fuel, 300).unwrap();
        assert_eq!(timer.deadline_us(Channel::Fuel), Some(300));
        assert_eq!(timer.started_count(), 2);
    }

    #[test]
    fn next_expiry_picks_earliest() {
        let clock = SimClock::new(0);
        let mut timer = SimTimer::new(clock);
        assert_eq!(timer.next_expiry(), None);
        timer.start_one_shot(Channel::Spark, 500).unwrap();
        timer.start_one_shot(Channel::Fuel, 200).unwrap();
        assert_eq!(timer.next_expiry(), Some((200, Channel::Fuel)));
        timer.cancel(Channel::Fuel);
        assert_eq!(timer.next_expiry(), Some((500, Channel::Spark)));
    }

    #[test]
    fn rejects_zero_and_oversized_delays() {
        let clock = SimClock::new(0);
        let mut timer = SimTimer::with_max_delay(clock, 65_535);
        assert!(matches!(
            timer.start_one_shot(Channel::Spark, 0),
            Err(HalError::Timer { reason: "zero delay", .. })
        ));
        assert!(timer.start_one_shot(Channel::Spark, 70_000).is_err());
        assert_eq!(timer.deadline_us(Channel::Spark), None);
    }
}
