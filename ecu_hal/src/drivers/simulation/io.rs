//! Simulated digital outputs and calibrated sensors.
//!
//! `SimOutputs` keeps the current pin levels and an edge log stamped with
//! virtual time. `SimSensors` returns settable readings and can be told to
//! fail, which exercises the per-revolution sensor-fault path.

use ecu_common::consts::AMBIENT_TEMP_K;
use ecu_common::hal::{HalError, OutputDriver, SensorSource};
use serde::Serialize;
use std::fmt;
use tracing::trace;

use super::timer::SimClock;

// ─── Outputs ────────────────────────────────────────────────────────

/// Digital output pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPin {
    FuelInjector,
    SparkCoil,
}

impl fmt::Display for OutputPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FuelInjector => f.write_str("fuel_injector"),
            Self::SparkCoil => f.write_str("spark_coil"),
        }
    }
}

/// Level change on an output pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputEdge {
    /// Virtual time of the write [µs].
    pub time_us: u64,
    pub pin: OutputPin,
    /// New level.
    pub level: bool,
}

/// Output pins with an edge log.
#[derive(Debug)]
pub struct SimOutputs {
    clock: SimClock,
    fuel_open: bool,
    spark_on: bool,
    edges: Vec<OutputEdge>,
}

impl SimOutputs {
    /// Both pins low.
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            fuel_open: false,
            spark_on: false,
            edges: Vec::new(),
        }
    }

    pub fn fuel_open(&self) -> bool {
        self.fuel_open
    }

    pub fn spark_on(&self) -> bool {
        self.spark_on
    }

    /// Every level change so far, in write order.
    pub fn edges(&self) -> &[OutputEdge] {
        &self.edges
    }

    /// Rising edges on `pin`.
    pub fn rising_edges(&self, pin: OutputPin) -> impl Iterator<Item = &OutputEdge> + '_ {
        self.edges.iter().filter(move |e| e.pin == pin && e.level)
    }

    /// Drain the edge log.
    pub fn take_edges(&mut self) -> Vec<OutputEdge> {
        std::mem::take(&mut self.edges)
    }

    fn write(&mut self, pin: OutputPin, level: bool) {
        let current = match pin {
            OutputPin::FuelInjector => &mut self.fuel_open,
            OutputPin::SparkCoil => &mut self.spark_on,
        };
        if *current == level {
            return;
        }
        *current = level;
        let time_us = self.clock.now_us();
        trace!(%pin, level, time_us, "output edge");
        self.edges.push(OutputEdge {
            time_us,
            pin,
            level,
        });
    }
}

impl OutputDriver for SimOutputs {
    fn set_fuel_injector(&mut self, open: bool) {
        self.write(OutputPin::FuelInjector, open);
    }

    fn set_spark_coil(&mut self, on: bool) {
        self.write(OutputPin::SparkCoil, on);
    }
}

// ─── Sensors ────────────────────────────────────────────────────────

/// Settable calibrated sensor readings.
#[derive(Debug, Clone)]
pub struct SimSensors {
    map_kpa: f64,
    throttle_pct: f64,
    intake_temp_k: f64,
    oxygen_v: f64,
    map_failed: bool,
}

impl Default for SimSensors {
    fn default() -> Self {
        Self {
            map_kpa: 101.3,
            throttle_pct: 0.0,
            intake_temp_k: AMBIENT_TEMP_K,
            oxygen_v: 0.45,
            map_failed: false,
        }
    }
}

impl SimSensors {
    /// Sensors reading atmospheric pressure at ambient temperature.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map_kpa(mut self, kpa: f64) -> Self {
        self.map_kpa = kpa;
        self
    }

    pub fn with_intake_temp_k(mut self, k: f64) -> Self {
        self.intake_temp_k = k;
        self
    }

    pub fn set_map_kpa(&mut self, kpa: f64) {
        self.map_kpa = kpa;
    }

    pub fn set_throttle_pct(&mut self, pct: f64) {
        self.throttle_pct = pct;
    }

    pub fn set_intake_temp_k(&mut self, k: f64) {
        self.intake_temp_k = k;
    }

    /// Make the manifold pressure sensor unavailable until cleared.
    pub fn set_map_failed(&mut self, failed: bool) {
        self.map_failed = failed;
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, HalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(HalError::SensorOutOfRange { name, value })
    }
}

impl SensorSource for SimSensors {
    fn manifold_pressure_kpa(&self) -> Result<f64, HalError> {
        if self.map_failed {
            return Err(HalError::SensorUnavailable("manifold_pressure"));
        }
        finite("manifold_pressure", self.map_kpa)
    }

    fn throttle_position_pct(&self) -> Result<f64, HalError> {
        finite("throttle_position", self.throttle_pct)
    }

    fn intake_air_temp_k(&self) -> Result<f64, HalError> {
        finite("intake_air_temp", self.intake_temp_k)
    }

    fn oxygen_sensor_v(&self) -> Result<f64, HalError> {
        finite("oxygen", self.oxygen_v)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
