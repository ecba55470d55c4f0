//! Discrete-event simulation loop.
//!
//! Drives the control core against the simulation drivers on one virtual
//! clock. Three event sources are merged in time order:
//!
//! | Source | Handler |
//! |--------|---------|
//! | Timer deadline | `SimTimer::expire` → `SharedEngine::on_timer_expired` |
//! | Wheel tooth | `SharedEngine::on_tooth` |
//! | Main-loop tick | `ControlCycle::poll` |
//!
//! On equal timestamps timers run before teeth and teeth before the poll,
//! matching interrupt priority over the main loop.

use ecu_common::engine::error::SkipReason;
use ecu_common::engine::state::{Channel, CycleState};
use ecu_common::hal::SensorSource;
use ecu_hal::{OutputEdge, OutputPin, SimClock, SimOutputs, SimTimer, SpeedProfile, TriggerWheelSim};
use static_assertions::assert_impl_all;
use tracing::{debug, error, info};

use crate::config::LoadedConfig;
use crate::cycle::{ControlCycle, CycleOutcome, CycleStats, RevolutionReport};
use crate::engine::{EngineCounters, SharedEngine};
use crate::error::CycleError;
use crate::scheduler::SchedulerError;

/// Default main-loop tick [µs].
pub const DEFAULT_POLL_INTERVAL_US: u64 = 100;

assert_impl_all!(SharedEngine<SimTimer, SimOutputs>: Send, Sync);

// ─── Report ─────────────────────────────────────────────────────────

/// Everything observable after a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Virtual time the run stopped at [µs].
    pub end_us: u64,
    /// One entry per processed revolution, in order.
    pub revolutions: Vec<RevolutionReport>,
    pub counters: EngineCounters,
    pub cycle_stats: CycleStats,
    /// Output level changes, in order.
    pub edges: Vec<OutputEdge>,
    pub final_state: CycleState,
    pub rev_limit_engagements: u64,
    pub last_fault: Option<SchedulerError>,
    /// Polls that returned an error.
    pub cycle_errors: u64,
}

impl RunReport {
    /// Spark discharge times (coil falling edges) [µs].
    pub fn spark_times(&self) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|e| e.pin == OutputPin::SparkCoil && !e.level)
            .map(|e| e.time_us)
            .collect()
    }

    /// Injector open/close pairs [µs].
    pub fn injection_windows(&self) -> Vec<(u64, u64)> {
        let mut windows = Vec::new();
        let mut opened = None;
        for edge in self.edges.iter().filter(|e| e.pin == OutputPin::FuelInjector) {
            match (edge.level, opened) {
                (true, _) => opened = Some(edge.time_us),
                (false, Some(start)) => {
                    windows.push((start, edge.time_us));
                    opened = None;
                }
                (false, None) => {}
            }
        }
        windows
    }

    /// Revolutions that carried `reason`.
    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.revolutions
            .iter()
            .filter(|r| r.skip.contains(reason))
            .count()
    }
}

// ─── Runner ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum NextEvent {
    Timer(u64, Channel),
    Tooth(u64),
    Poll(u64),
}

impl NextEvent {
    fn time_us(self) -> u64 {
        match self {
            Self::Timer(t, _) | Self::Tooth(t) | Self::Poll(t) => t,
        }
    }
}

/// Control core wired to simulation drivers.
pub struct CycleRunner<S> {
    clock: SimClock,
    engine: SharedEngine<SimTimer, SimOutputs>,
    cycle: ControlCycle<S>,
    wheel: TriggerWheelSim,
    poll_interval_us: u64,
    next_poll_us: u64,
    revolutions: Vec<RevolutionReport>,
    cycle_errors: u64,
}

impl<S: SensorSource> CycleRunner<S> {
    /// Clock starts at 0; the first tooth (closing a gap) passes at 0.
    pub fn new(
        loaded: &LoadedConfig,
        sensors: S,
        profile: SpeedProfile,
        poll_interval_us: u64,
    ) -> Result<Self, CycleError> {
        if poll_interval_us == 0 {
            return Err(CycleError::Fatal("poll interval must be positive"));
        }
        let crank = &loaded.config.crank;
        let wheel = TriggerWheelSim::new(crank.tooth_positions, crank.missing_teeth, profile, 0)
            .ok_or(CycleError::Fatal("trigger wheel needs at least two teeth"))?;

        let clock = SimClock::new(0);
        let engine = SharedEngine::new(
            &loaded.config,
            SimTimer::new(clock.clone()),
            SimOutputs::new(clock.clone()),
        );
        Ok(Self {
            clock,
            engine,
            cycle: ControlCycle::from_loaded(loaded, sensors),
            wheel,
            poll_interval_us,
            next_poll_us: 0,
            revolutions: Vec::new(),
            cycle_errors: 0,
        })
    }

    fn next_event(&self) -> NextEvent {
        let mut next = NextEvent::Poll(self.next_poll_us);
        if let Some(t) = self.wheel.peek_time_us() {
            if t <= next.time_us() {
                next = NextEvent::Tooth(t);
            }
        }
        if let Some((t, channel)) = self.engine.critical_section(|s| s.timer().next_expiry()) {
            if t <= next.time_us() {
                next = NextEvent::Timer(t, channel);
            }
        }
        next
    }

    /// Process one event at or before `end_us`; `false` when none is left.
    pub fn step(&mut self, end_us: u64) -> bool {
        let event = self.next_event();
        if event.time_us() > end_us {
            return false;
        }
        self.clock.advance_to(event.time_us());

        match event {
            NextEvent::Timer(_, channel) => {
                if self.engine.critical_section(|s| s.timer_mut().expire(channel)) {
                    self.engine.on_timer_expired(channel);
                }
            }
            NextEvent::Tooth(_) => {
                if let Some(tooth) = self.wheel.next_tooth() {
                    self.engine.on_tooth(tooth.time_us);
                }
            }
            NextEvent::Poll(t) => {
                self.next_poll_us = t + self.poll_interval_us;
                match self.cycle.poll(&self.engine) {
                    Ok(CycleOutcome::Revolution(report)) => self.revolutions.push(report),
                    Ok(CycleOutcome::Stalled | CycleOutcome::NoRevolution) => {}
                    Err(e) => {
                        self.cycle_errors += 1;
                        error!(error = %e, time_us = t, "control cycle error");
                    }
                }
            }
        }
        true
    }

    /// Run until virtual time `end_us` and report.
    pub fn run_until(&mut self, end_us: u64) -> RunReport {
        info!(from_us = self.clock.now_us(), end_us, "simulation started");
        let mut events = 0u64;
        while self.step(end_us) {
            events += 1;
        }
        self.clock.advance_to(end_us);
        debug!(events, revolutions = self.revolutions.len(), "simulation stopped");
        self.report()
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> RunReport {
        let (counters, edges, final_state, last_fault) = self.engine.critical_section(|s| {
            (
                s.counters(),
                s.outputs().edges().to_vec(),
                s.cycle_state(),
                s.last_fault().cloned(),
            )
        });
        RunReport {
            end_us: self.clock.now_us(),
            revolutions: self.revolutions.clone(),
            counters,
            cycle_stats: self.cycle.stats().clone(),
            edges,
            final_state,
            rev_limit_engagements: self.cycle.rev_limiter().engagements(),
            last_fault,
            cycle_errors: self.cycle_errors,
        }
    }

    #[inline]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    #[inline]
    pub fn engine(&self) -> &SharedEngine<SimTimer, SimOutputs> {
        &self.engine
    }

    #[inline]
    pub fn cycle(&self) -> &ControlCycle<S> {
        &self.cycle
    }

    #[inline]
    pub fn cycle_mut(&mut self) -> &mut ControlCycle<S> {
        &mut self.cycle
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
