//! Per-revolution control cycle: recalc → targets → delays → arm.
//!
//! [`ControlCycle::poll`] is the main-loop body. It runs in three phases so
//! that the heavy work never holds the engine lock:
//!
//! 1. **Observe** (critical section): stall check, consume the recalc
//!    flag, take a crank snapshot.
//! 2. **Compute** (no lock): speed branches, sensor reads, table lookups,
//!    target angles and fuel pulse width.
//! 3. **Arm** (critical section): fresh snapshot, angle → delay
//!    conversion, schedule the initial action on each due channel, hand the
//!    pulse width to the fuel chain, clear recalc.
//!
//! ## Target angles
//! ```text
//! spark        = TDC - SA
//! fuel_end     = spark - GRACE
//! fuel_start   = fuel_end - pulse_us · ω
//! spark_charge = spark - dwell_us · ω
//! delay        = (target - estimate(now)) / ω     (≤ 0 → channel skipped)
//! ```

use ecu_common::engine::config::{EcuConfig, LimitsConfig, TemperatureSource};
use ecu_common::engine::error::SkipReason;
use ecu_common::engine::state::{Action, Channel, CycleState};
use ecu_common::hal::{OutputDriver, SensorSource, TimerDriver};
use tracing::{debug, warn};

use crate::config::LoadedConfig;
use crate::crank::CrankSnapshot;
use crate::engine::{EngineState, SharedEngine};
use crate::error::CycleError;
use crate::fuel::{FuelModel, angle_to_delay_us, deg_per_us_to_rpm, duration_to_angle};
use crate::scheduler::SchedulerError;
use crate::state::machine::{CycleEvent, TransitionResult};
use crate::state::rev_limit::RevLimiter;
use crate::table::CalibrationTable;

const SKIP_KINDS: usize = u16::BITS as usize;

// ─── Targets ────────────────────────────────────────────────────────

/// Everything derived for one revolution before conversion to delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTargets {
    pub rpm: f64,
    /// [deg/µs]
    pub angular_velocity: f64,
    pub map_kpa: f64,
    pub charge_temp_k: f64,
    /// Volumetric efficiency [%].
    pub ve_pct: f64,
    /// Spark advance [deg BTDC].
    pub spark_advance_deg: f64,
    /// Fixed cranking values used instead of tables.
    pub cranking: bool,
    /// Discharge angle [deg].
    pub spark_angle: f64,
    pub fuel_end_angle: f64,
    pub fuel_duration_us: f64,
    pub fuel_start_angle: f64,
    pub spark_charge_angle: f64,
}

impl CycleTargets {
    pub fn is_finite(&self) -> bool {
        [
            self.spark_angle,
            self.fuel_end_angle,
            self.fuel_duration_us,
            self.fuel_start_angle,
            self.spark_charge_angle,
        ]
        .iter()
        .all(|v| v.is_finite())
            && self.fuel_duration_us >= 0.0
    }
}

// ─── Outcome ────────────────────────────────────────────────────────

/// Decisions taken for one detected revolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevolutionReport {
    /// Clock reading when the recalc flag was consumed [µs].
    pub time_us: u64,
    pub rpm: f64,
    pub targets: Option<CycleTargets>,
    /// Estimated crank angle at arming time [deg].
    pub current_angle: Option<f64>,
    /// Delay handed to the spark timer [µs], if armed.
    pub spark_delay_us: Option<u32>,
    /// Delay handed to the fuel timer [µs], if armed.
    pub fuel_delay_us: Option<u32>,
    pub skip: SkipReason,
}

impl RevolutionReport {
    fn new(time_us: u64, rpm: f64) -> Self {
        Self {
            time_us,
            rpm,
            targets: None,
            current_angle: None,
            spark_delay_us: None,
            fuel_delay_us: None,
            skip: SkipReason::empty(),
        }
    }

    #[inline]
    pub fn spark_scheduled(&self) -> bool {
        self.spark_delay_us.is_some()
    }

    #[inline]
    pub fn fuel_scheduled(&self) -> bool {
        self.fuel_delay_us.is_some()
    }
}

/// Result of one main-loop poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// No revolution completed since the last poll.
    NoRevolution,
    /// No tooth within the stall timeout; outputs forced off.
    Stalled,
    /// A revolution was processed.
    Revolution(RevolutionReport),
}

// ─── Statistics ─────────────────────────────────────────────────────

/// O(1) per-poll counters.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub polls: u64,
    pub revolutions: u64,
    pub spark_scheduled: u64,
    pub fuel_scheduled: u64,
    pub stalls: u64,
    pub faults: u64,
    skips: [u64; SKIP_KINDS],
    pub last_rpm: f64,
    pub last_targets: Option<CycleTargets>,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            polls: 0,
            revolutions: 0,
            spark_scheduled: 0,
            fuel_scheduled: 0,
            stalls: 0,
            faults: 0,
            skips: [0; SKIP_KINDS],
            last_rpm: 0.0,
            last_targets: None,
        }
    }

    /// Record one poll outcome.
    #[inline]
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.polls += 1;
        match outcome {
            CycleOutcome::NoRevolution => {}
            CycleOutcome::Stalled => self.stalls += 1,
            CycleOutcome::Revolution(report) => {
                self.revolutions += 1;
                self.last_rpm = report.rpm;
                if report.targets.is_some() {
                    self.last_targets = report.targets;
                }
                self.spark_scheduled += u64::from(report.spark_scheduled());
                self.fuel_scheduled += u64::from(report.fuel_scheduled());
                for flag in report.skip.iter() {
                    self.skips[flag.bits().trailing_zeros() as usize] += 1;
                }
            }
        }
    }

    /// Revolutions that carried `reason` (a single flag).
    pub fn skip_count(&self, reason: SkipReason) -> u64 {
        if reason.bits().count_ones() != 1 {
            return 0;
        }
        self.skips[reason.bits().trailing_zeros() as usize]
    }
}

// ─── Control Cycle ──────────────────────────────────────────────────

enum Observed {
    Quiet,
    Stalled,
    Faulted(u64, CrankSnapshot),
    Revolution(u64, CrankSnapshot),
}

/// Main-loop side of the controller.
#[derive(Debug)]
pub struct ControlCycle<S> {
    sensors: S,
    ve_table: CalibrationTable,
    sa_table: CalibrationTable,
    fuel: FuelModel,
    limits: LimitsConfig,
    tdc_deg: f64,
    grace_deg: f64,
    dwell_us: f64,
    rev_limiter: RevLimiter,
    stall_timeout_us: u64,
    stats: CycleStats,
}

impl<S: SensorSource> ControlCycle<S> {
    pub fn new(
        config: &EcuConfig,
        ve_table: CalibrationTable,
        sa_table: CalibrationTable,
        sensors: S,
    ) -> Self {
        let limits = config.limits.clone();
        // One revolution at engage speed.
        let stall_timeout_us = (60.0e6 / limits.engage_rpm.max(1.0)).ceil() as u64;
        Self {
            sensors,
            ve_table,
            sa_table,
            fuel: FuelModel::new(&config.engine, &config.fuel),
            rev_limiter: RevLimiter::new(limits.upper_rev_limit_rpm, limits.lower_rev_limit_rpm),
            limits,
            tdc_deg: config.engine.tdc_deg,
            grace_deg: config.engine.grace_deg,
            dwell_us: f64::from(config.engine.dwell_us),
            stall_timeout_us,
            stats: CycleStats::new(),
        }
    }

    pub fn from_loaded(loaded: &LoadedConfig, sensors: S) -> Self {
        Self::new(
            &loaded.config,
            loaded.ve_table.clone(),
            loaded.spark_table.clone(),
            sensors,
        )
    }

    /// Derive the revolution's target angles.
    pub fn compute_targets(
        &self,
        angular_velocity: f64,
        map_kpa: f64,
        charge_temp_k: f64,
        ve_pct: f64,
        spark_advance_deg: f64,
        cranking: bool,
    ) -> CycleTargets {
        let spark_angle = self.tdc_deg - spark_advance_deg;
        let fuel_end_angle = spark_angle - self.grace_deg;
        let fuel_duration_us = self.fuel.pulse_us(ve_pct, map_kpa, charge_temp_k);
        CycleTargets {
            rpm: deg_per_us_to_rpm(angular_velocity),
            angular_velocity,
            map_kpa,
            charge_temp_k,
            ve_pct,
            spark_advance_deg,
            cranking,
            spark_angle,
            fuel_end_angle,
            fuel_duration_us,
            fuel_start_angle: fuel_end_angle
                - duration_to_angle(fuel_duration_us, angular_velocity),
            spark_charge_angle: spark_angle - duration_to_angle(self.dwell_us, angular_velocity),
        }
    }

    /// Main-loop body; returns what happened this poll.
    pub fn poll<T: TimerDriver, O: OutputDriver>(
        &mut self,
        engine: &SharedEngine<T, O>,
    ) -> Result<CycleOutcome, CycleError> {
        let result = self.poll_inner(engine);
        match &result {
            Ok(outcome) => self.stats.record(outcome),
            Err(_) => {
                self.stats.polls += 1;
                self.stats.faults += 1;
            }
        }
        result
    }

    fn poll_inner<T: TimerDriver, O: OutputDriver>(
        &mut self,
        engine: &SharedEngine<T, O>,
    ) -> Result<CycleOutcome, CycleError> {
        // ── Phase 1: observe ──
        let stall_timeout_us = self.stall_timeout_us;
        let observed = engine.critical_section(|s| {
            let now = s.now_us();
            if s.crank_mut().check_stall(now, stall_timeout_us) {
                s.shut_down();
                return Observed::Stalled;
            }
            if !s.crank().recalc_pending() {
                return Observed::Quiet;
            }
            if s.is_faulted() {
                s.crank_mut().clear_recalc();
                return Observed::Faulted(now, s.snapshot());
            }
            s.transition(CycleEvent::RecalcObserved);
            Observed::Revolution(now, s.snapshot())
        });

        let (now, snapshot) = match observed {
            Observed::Quiet => return Ok(CycleOutcome::NoRevolution),
            Observed::Stalled => {
                self.rev_limiter.reset();
                warn!("crank stalled, outputs forced off");
                return Ok(CycleOutcome::Stalled);
            }
            Observed::Faulted(now, snap) => {
                let mut report = RevolutionReport::new(now, snap.rpm());
                report.skip = SkipReason::FAULTED;
                return Ok(CycleOutcome::Revolution(report));
            }
            Observed::Revolution(now, snap) => (now, snap),
        };

        // ── Phase 2: compute ──
        let mut report = RevolutionReport::new(now, snapshot.rpm());
        let targets = match self.compute(engine, &snapshot) {
            Ok(targets) => targets,
            Err(skip) => {
                report.skip = skip;
                finish_skipped(engine);
                debug!(rpm = report.rpm, skip = ?skip, "revolution skipped");
                return Ok(CycleOutcome::Revolution(report));
            }
        };
        report.targets = Some(targets);

        // ── Phase 3: arm ──
        engine.critical_section(|s| arm_channels(s, &targets, &mut report))?;

        debug!(
            rpm = report.rpm,
            cranking = targets.cranking,
            spark_charge = targets.spark_charge_angle,
            fuel_start = targets.fuel_start_angle,
            fuel_us = targets.fuel_duration_us,
            spark_delay = ?report.spark_delay_us,
            fuel_delay = ?report.fuel_delay_us,
            skip = ?report.skip,
            "revolution armed"
        );
        Ok(CycleOutcome::Revolution(report))
    }

    fn compute<T: TimerDriver, O: OutputDriver>(
        &mut self,
        engine: &SharedEngine<T, O>,
        snapshot: &CrankSnapshot,
    ) -> Result<CycleTargets, SkipReason> {
        if !snapshot.position_known() {
            return Err(SkipReason::POSITION_UNKNOWN);
        }
        let rpm = snapshot.rpm();

        if rpm < self.limits.engage_rpm {
            engine.critical_section(|s| s.shut_down());
            return Err(SkipReason::NOT_RUNNING);
        }
        if self.rev_limiter.update(rpm) {
            return Err(SkipReason::REV_LIMITED);
        }

        let map_kpa = match self.sensors.manifold_pressure_kpa() {
            Ok(v) if v > 0.0 => v,
            Ok(v) => {
                warn!(map_kpa = v, "implausible manifold pressure");
                return Err(SkipReason::SENSOR_FAULT);
            }
            Err(e) => {
                warn!(error = %e, "manifold pressure read failed");
                return Err(SkipReason::SENSOR_FAULT);
            }
        };
        let intake_temp_k = match self.fuel.temperature_source() {
            TemperatureSource::Ambient => None,
            TemperatureSource::Intake => match self.sensors.intake_air_temp_k() {
                Ok(v) if v > 0.0 => Some(v),
                Ok(v) => {
                    warn!(temp_k = v, "implausible intake temperature");
                    return Err(SkipReason::SENSOR_FAULT);
                }
                Err(e) => {
                    warn!(error = %e, "intake temperature read failed");
                    return Err(SkipReason::SENSOR_FAULT);
                }
            },
        };
        let charge_temp_k = self.fuel.charge_temp_k(intake_temp_k);

        let cranking = rpm < self.limits.cranking_rpm;
        let (ve_pct, spark_advance_deg) = if cranking {
            (self.limits.crank_vol_eff_pct, self.limits.crank_spark_adv_deg)
        } else {
            let ve = self.ve_table.lookup_2d(rpm, map_kpa);
            let sa = self.sa_table.lookup_2d(rpm, map_kpa);
            match (ve, sa) {
                (Ok(ve), Ok(sa)) => (ve, sa),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, rpm, map_kpa, "table lookup failed");
                    return Err(SkipReason::TABLE_FAULT);
                }
            }
        };

        let targets = self.compute_targets(
            snapshot.angular_velocity,
            map_kpa,
            charge_temp_k,
            ve_pct,
            spark_advance_deg,
            cranking,
        );
        if !targets.is_finite() {
            warn!(?targets, "non-finite targets");
            return Err(SkipReason::TABLE_FAULT);
        }
        Ok(targets)
    }

    /// Clear a latched fault and the rev limiter.
    pub fn reset<T: TimerDriver, O: OutputDriver>(
        &mut self,
        engine: &SharedEngine<T, O>,
    ) -> TransitionResult {
        self.rev_limiter.reset();
        engine.reset()
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    #[inline]
    pub fn rev_limiter(&self) -> &RevLimiter {
        &self.rev_limiter
    }

    #[inline]
    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    #[inline]
    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    #[inline]
    pub fn stall_timeout_us(&self) -> u64 {
        self.stall_timeout_us
    }
}

// ─── Phase helpers ──────────────────────────────────────────────────

fn finish_skipped<T: TimerDriver, O: OutputDriver>(engine: &SharedEngine<T, O>) {
    engine.critical_section(|s| {
        s.crank_mut().clear_recalc();
        // The engine-stopped path has already returned to Idle.
        if s.cycle_state() == CycleState::Computing {
            s.transition(CycleEvent::Skipped);
        }
    });
}

/// Channel still finishing a follow-up action.
fn channel_busy<T: TimerDriver, O: OutputDriver>(s: &EngineState<T, O>, channel: Channel) -> bool {
    s.scheduler()
        .pending(channel)
        .is_some_and(|e| !e.action.is_initial())
}

fn arm_channels<T: TimerDriver, O: OutputDriver>(
    s: &mut EngineState<T, O>,
    targets: &CycleTargets,
    report: &mut RevolutionReport,
) -> Result<(), SchedulerError> {
    // A callback may have latched a defect while the lock was released.
    if s.is_faulted() {
        report.skip |= SkipReason::FAULTED;
        s.crank_mut().clear_recalc();
        return Ok(());
    }
    let snapshot = s.snapshot();
    let now = s.now_us();
    let Some(current) = snapshot.estimate_revolution_angle(now) else {
        report.skip |= SkipReason::POSITION_UNKNOWN;
        s.crank_mut().clear_recalc();
        s.transition(CycleEvent::Skipped);
        return Ok(());
    };
    let omega = snapshot.angular_velocity;
    report.current_angle = Some(current);

    // Spark
    let spark_delay = angle_to_delay_us(targets.spark_charge_angle, current, omega);
    if channel_busy(s, Channel::Spark) {
        report.skip |= SkipReason::CHANNEL_BUSY;
    } else if spark_delay <= 0.0 {
        report.skip |= SkipReason::SPARK_LATE;
    } else {
        match s.arm(Channel::Spark, spark_delay, Action::BeginSparkCharge) {
            Ok(ticks) => report.spark_delay_us = Some(ticks),
            Err(e) if e.is_defect() => {
                s.crank_mut().clear_recalc();
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "spark not armed");
                report.skip |= SkipReason::TIMER_FAULT;
            }
        }
    }

    // Fuel, every other revolution
    if !s.fuel_due() {
        report.skip |= SkipReason::FUEL_NOT_DUE;
    } else {
        let fuel_delay = angle_to_delay_us(targets.fuel_start_angle, current, omega);
        if channel_busy(s, Channel::Fuel) {
            report.skip |= SkipReason::CHANNEL_BUSY;
        } else if fuel_delay <= 0.0 {
            report.skip |= SkipReason::FUEL_LATE;
        } else {
            s.set_pending_fuel_us(targets.fuel_duration_us);
            match s.arm(Channel::Fuel, fuel_delay, Action::OpenFuelInjector) {
                Ok(ticks) => report.fuel_delay_us = Some(ticks),
                Err(e) if e.is_defect() => {
                    s.crank_mut().clear_recalc();
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "fuel not armed");
                    report.skip |= SkipReason::TIMER_FAULT;
                }
            }
        }
    }

    s.crank_mut().clear_recalc();
    s.transition(CycleEvent::Armed {
        spark: report.spark_scheduled(),
        fuel: report.fuel_scheduled(),
    });
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
