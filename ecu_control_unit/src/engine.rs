//! Engine state shared between callbacks and the main loop.
//!
//! Everything a tooth or timer callback touches lives in one
//! [`EngineState`] behind a `parking_lot::Mutex`. Holding the lock is the
//! critical section: the main loop enters it to take consistent snapshots
//! and to arm channels, callbacks enter it for their O(1) work.
//!
//! ## Timer callback actions
//! | Action | Output | Follow-up |
//! |--------|--------|-----------|
//! | `BeginSparkCharge` | coil on | `EndSparkDischarge` after dwell |
//! | `EndSparkDischarge` | coil off, toggle fuel-due | none |
//! | `OpenFuelInjector` | injector open | `CloseFuelInjector` after pulse width |
//! | `CloseFuelInjector` | injector closed | none |

use ecu_common::engine::config::EcuConfig;
use ecu_common::engine::state::{Action, Channel, CycleState, OutputState};
use ecu_common::hal::{OutputDriver, TimerDriver};
use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::crank::{CrankSnapshot, CrankTracker};
use crate::scheduler::{EventScheduler, SchedulerError};
use crate::state::machine::{CycleEvent, CycleStateMachine, TransitionResult};

// ─── Counters ───────────────────────────────────────────────────────

/// Callback-side event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    /// Completed spark discharges.
    pub sparks: u64,
    /// Completed injections.
    pub injections: u64,
    /// Timer expiries on an idle channel.
    pub spurious_expiries: u64,
    /// Follow-up actions the timer refused; output forced off instead.
    pub chain_failures: u64,
    /// Scheduler defects latched.
    pub faults: u64,
    /// Control-state events the state machine refused.
    pub rejected_transitions: u64,
}

// ─── Engine State ───────────────────────────────────────────────────

/// Aggregate of all callback-visible state.
#[derive(Debug)]
pub struct EngineState<T, O> {
    crank: CrankTracker,
    scheduler: EventScheduler<T>,
    outputs: O,
    output_state: OutputState,
    machine: CycleStateMachine,
    fuel_due: bool,
    pending_fuel_us: f64,
    dwell_us: f64,
    counters: EngineCounters,
    last_fault: Option<SchedulerError>,
}

impl<T: TimerDriver, O: OutputDriver> EngineState<T, O> {
    /// Both outputs are driven low on construction.
    pub fn new(config: &EcuConfig, timer: T, mut outputs: O) -> Self {
        outputs.set_fuel_injector(false);
        outputs.set_spark_coil(false);
        Self {
            crank: CrankTracker::new(&config.crank, config.engine.tdc_deg),
            scheduler: EventScheduler::new(timer, config.scheduler.min_delay_us),
            outputs,
            output_state: OutputState::default(),
            machine: CycleStateMachine::new(),
            fuel_due: true,
            pending_fuel_us: 0.0,
            dwell_us: f64::from(config.engine.dwell_us),
            counters: EngineCounters::default(),
            last_fault: None,
        }
    }

    // ── Callbacks ──

    /// Tooth callback body: bookkeeping only.
    #[inline]
    pub fn on_tooth(&mut self, timestamp_us: u64) {
        self.crank.on_tooth(timestamp_us);
    }

    /// Timer callback body: run the channel's action.
    pub fn on_timer_expired(&mut self, channel: Channel) {
        let Some(action) = self.scheduler.begin_dispatch(channel) else {
            self.counters.spurious_expiries += 1;
            trace!(%channel, "expiry on idle channel");
            return;
        };
        trace!(%channel, %action, "dispatch");
        let result = self.run_action(action);
        self.scheduler.end_dispatch();

        if let Err(err) = result {
            if err.is_defect() {
                self.latch_fault(err);
            } else {
                self.counters.chain_failures += 1;
                warn!(%channel, %action, error = %err, "follow-up not armed, output forced off");
                self.force_channel_off(channel);
                self.complete(channel);
            }
        }
    }

    fn run_action(&mut self, action: Action) -> Result<(), SchedulerError> {
        match action {
            Action::BeginSparkCharge => {
                self.outputs.set_spark_coil(true);
                self.output_state.spark_charging = true;
                self.scheduler
                    .schedule(Channel::Spark, self.dwell_us, Action::EndSparkDischarge)?;
            }
            Action::EndSparkDischarge => {
                self.outputs.set_spark_coil(false);
                self.output_state.spark_charging = false;
                self.fuel_due = !self.fuel_due;
                self.counters.sparks += 1;
                self.complete(Channel::Spark);
            }
            Action::OpenFuelInjector => {
                self.outputs.set_fuel_injector(true);
                self.output_state.fuel_open = true;
                self.scheduler
                    .schedule(Channel::Fuel, self.pending_fuel_us, Action::CloseFuelInjector)?;
            }
            Action::CloseFuelInjector => {
                self.outputs.set_fuel_injector(false);
                self.output_state.fuel_open = false;
                self.counters.injections += 1;
                self.complete(Channel::Fuel);
            }
        }
        Ok(())
    }

    fn complete(&mut self, channel: Channel) {
        if !self.machine.is_faulted() {
            self.transition(CycleEvent::ChannelCompleted(channel));
        }
    }

    fn force_channel_off(&mut self, channel: Channel) {
        match channel {
            Channel::Spark => {
                self.outputs.set_spark_coil(false);
                self.output_state.spark_charging = false;
            }
            Channel::Fuel => {
                self.outputs.set_fuel_injector(false);
                self.output_state.fuel_open = false;
            }
        }
    }

    // ── Main-loop operations (call inside the critical section) ──

    /// Arm an initial action from the main loop.
    ///
    /// Scheduler defects latch the fault before the error is returned.
    pub fn arm(&mut self, channel: Channel, delay_us: f64, action: Action) -> Result<u32, SchedulerError> {
        self.scheduler.schedule(channel, delay_us, action).inspect_err(|err| {
            if err.is_defect() {
                self.latch_fault(err.clone());
            }
        })
    }

    /// Pulse width used by the next chained `CloseFuelInjector` [µs].
    #[inline]
    pub fn set_pending_fuel_us(&mut self, duration_us: f64) {
        self.pending_fuel_us = duration_us;
    }

    /// Engine-not-running path: disarm everything and drive both outputs low.
    pub fn shut_down(&mut self) {
        self.scheduler.cancel_all();
        self.force_outputs_off();
        if !self.machine.is_faulted() {
            self.transition(CycleEvent::EngineStopped);
        }
    }

    pub fn force_outputs_off(&mut self) {
        self.force_channel_off(Channel::Spark);
        self.force_channel_off(Channel::Fuel);
    }

    fn latch_fault(&mut self, err: SchedulerError) {
        error!(error = %err, "scheduler defect, outputs forced off");
        self.scheduler.end_dispatch();
        self.scheduler.cancel_all();
        self.force_outputs_off();
        self.transition(CycleEvent::SchedulerDefect);
        self.counters.faults += 1;
        self.last_fault = Some(err);
    }

    /// Leave `Fault` and start over with the fuel phase re-armed.
    pub fn reset(&mut self) -> TransitionResult {
        let result = self.machine.handle_event(CycleEvent::Reset);
        if let TransitionResult::Ok(_) = result {
            self.scheduler.cancel_all();
            self.force_outputs_off();
            self.crank.clear_recalc();
            self.fuel_due = true;
            self.last_fault = None;
        }
        result
    }

    /// Apply a control-state event; refusals are counted and logged.
    pub fn transition(&mut self, event: CycleEvent) -> TransitionResult {
        let from = self.machine.state();
        let result = self.machine.handle_event(event);
        if let TransitionResult::Rejected(reason) = result {
            self.counters.rejected_transitions += 1;
            warn!(?from, ?event, reason, "control state transition rejected");
        }
        result
    }

    // ── Accessors ──

    #[inline]
    pub fn crank(&self) -> &CrankTracker {
        &self.crank
    }

    #[inline]
    pub fn crank_mut(&mut self) -> &mut CrankTracker {
        &mut self.crank
    }

    #[inline]
    pub fn snapshot(&self) -> CrankSnapshot {
        self.crank.snapshot()
    }

    #[inline]
    pub fn scheduler(&self) -> &EventScheduler<T> {
        &self.scheduler
    }

    #[inline]
    pub fn timer(&self) -> &T {
        self.scheduler.timer()
    }

    #[inline]
    pub fn timer_mut(&mut self) -> &mut T {
        self.scheduler.timer_mut()
    }

    #[inline]
    pub fn now_us(&self) -> u64 {
        self.scheduler.now_us()
    }

    #[inline]
    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    #[inline]
    pub fn outputs_mut(&mut self) -> &mut O {
        &mut self.outputs
    }

    #[inline]
    pub fn output_state(&self) -> OutputState {
        self.output_state
    }

    #[inline]
    pub fn cycle_state(&self) -> CycleState {
        self.machine.state()
    }

    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.machine.is_faulted()
    }

    /// Fuel is injected on this revolution.
    #[inline]
    pub fn fuel_due(&self) -> bool {
        self.fuel_due
    }

    #[inline]
    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn last_fault(&self) -> Option<&SchedulerError> {
        self.last_fault.as_ref()
    }
}

// ─── Shared Handle ──────────────────────────────────────────────────

/// Lock-guarded engine state; the only way callbacks and the main loop
/// reach [`EngineState`].
#[derive(Debug)]
pub struct SharedEngine<T, O> {
    inner: Mutex<EngineState<T, O>>,
}

impl<T: TimerDriver, O: OutputDriver> SharedEngine<T, O> {
    pub fn new(config: &EcuConfig, timer: T, outputs: O) -> Self {
        Self {
            inner: Mutex::new(EngineState::new(config, timer, outputs)),
        }
    }

    /// Run `f` with callbacks excluded.
    #[inline]
    pub fn critical_section<R>(&self, f: impl FnOnce(&mut EngineState<T, O>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Tooth-passage callback entry.
    #[inline]
    pub fn on_tooth(&self, timestamp_us: u64) {
        self.critical_section(|s| s.on_tooth(timestamp_us));
    }

    /// Timer-expiry callback entry.
    #[inline]
    pub fn on_timer_expired(&self, channel: Channel) {
        self.critical_section(|s| s.on_timer_expired(channel));
    }

    /// Consistent crank snapshot plus the pending-recalc flag.
    pub fn snapshot(&self) -> (CrankSnapshot, bool) {
        self.critical_section(|s| (s.crank.snapshot(), s.crank.recalc_pending()))
    }

    pub fn reset(&self) -> TransitionResult {
        self.critical_section(|s| s.reset())
    }

    pub fn into_inner(self) -> EngineState<T, O> {
        self.inner.into_inner()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
