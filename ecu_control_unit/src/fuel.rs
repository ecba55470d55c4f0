//! Unit conversions, injector pulse width and angle/time helpers.
//!
//! Air mass per intake stroke comes from the ideal gas law
//! `m = P·V·M / (R·T)` with the trapped volume scaled by volumetric
//! efficiency. Fuel mass follows from the air-fuel ratio and the pulse
//! width from the injector's mass flow.

use ecu_common::consts::{DEG_PER_US_TO_RPM, RPM_TO_DEG_PER_US};
use ecu_common::engine::config::{EngineConfig, FuelConfig, TemperatureSource};

// ─── Speed Units ────────────────────────────────────────────────────

/// [deg/µs] → [rpm].
#[inline]
pub fn deg_per_us_to_rpm(angular_velocity: f64) -> f64 {
    angular_velocity * DEG_PER_US_TO_RPM
}

/// [rpm] → [deg/µs].
#[inline]
pub fn rpm_to_deg_per_us(rpm: f64) -> f64 {
    rpm * RPM_TO_DEG_PER_US
}

// ─── Angle / Time ───────────────────────────────────────────────────

/// Time until the crank reaches `target_deg` from `current_deg` [µs].
///
/// Negative when the target already passed. Callers guarantee a positive
/// `angular_velocity`.
#[inline]
pub fn angle_to_delay_us(target_deg: f64, current_deg: f64, angular_velocity: f64) -> f64 {
    (target_deg - current_deg) / angular_velocity
}

/// Crank angle swept during `duration_us` [deg].
#[inline]
pub fn duration_to_angle(duration_us: f64, angular_velocity: f64) -> f64 {
    duration_us * angular_velocity
}

// ─── Fuel Model ─────────────────────────────────────────────────────

/// Injector pulse width for a trapped air charge [µs].
pub fn injector_pulse_us(air_volume_m3: f64, map_kpa: f64, temp_k: f64, fuel: &FuelConfig) -> f64 {
    let pressure_pa = map_kpa * 1_000.0;
    let air_mass_g = pressure_pa * air_volume_m3 * fuel.molar_mass_air / (fuel.gas_constant * temp_k);
    let fuel_mass_g = air_mass_g / fuel.air_fuel_ratio;
    fuel_mass_g / fuel.injector_flow_g_per_s * 1.0e6
}

/// Engine-specific fuel computation.
#[derive(Debug, Clone)]
pub struct FuelModel {
    displacement_m3: f64,
    fuel: FuelConfig,
}

impl FuelModel {
    pub fn new(engine: &EngineConfig, fuel: &FuelConfig) -> Self {
        Self {
            displacement_m3: engine.displacement_m3(),
            fuel: fuel.clone(),
        }
    }

    /// Air volume trapped at `ve_pct` volumetric efficiency [m³].
    #[inline]
    pub fn air_volume_m3(&self, ve_pct: f64) -> f64 {
        self.displacement_m3 * ve_pct / 100.0
    }

    /// Temperature feeding the air mass estimate, given the intake reading.
    #[inline]
    pub fn charge_temp_k(&self, intake_temp_k: Option<f64>) -> f64 {
        match (self.fuel.temperature_source, intake_temp_k) {
            (TemperatureSource::Intake, Some(t)) => t,
            _ => self.fuel.ambient_temp_k,
        }
    }

    #[inline]
    pub fn temperature_source(&self) -> TemperatureSource {
        self.fuel.temperature_source
    }

    /// Pulse width for `ve_pct` at `map_kpa` and `temp_k` [µs].
    #[inline]
    pub fn pulse_us(&self, ve_pct: f64, map_kpa: f64, temp_k: f64) -> f64 {
        injector_pulse_us(self.air_volume_m3(ve_pct), map_kpa, temp_k, &self.fuel)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
