//! Workspace-wide constants for the ECU.
//!
//! Single source of truth for physical constants, calibration defaults and
//! the MIN/MAX bounds enforced by configuration validation.

use static_assertions::const_assert;

// ─── Units ──────────────────────────────────────────────────────────

/// [deg/µs] → [rev/min]: (1 rev / 360 deg) × (60e6 µs / 1 min).
pub const DEG_PER_US_TO_RPM: f64 = 60.0e6 / 360.0;

/// [rev/min] → [deg/µs]: (360 deg / 1 rev) × (1 min / 60e6 µs).
pub const RPM_TO_DEG_PER_US: f64 = 360.0 / 60.0e6;

/// Degrees in one crank revolution.
pub const DEG_PER_REV: f64 = 360.0;

// ─── Scientific Constants ───────────────────────────────────────────

/// Stoichiometric air-fuel ratio for gasoline [kg/kg].
pub const AIR_FUEL_RATIO: f64 = 14.7;

/// Molar mass of dry air [g/mol].
pub const MOLAR_MASS_AIR: f64 = 28.97;

/// Ideal gas constant [J/(mol·K)].
pub const GAS_CONSTANT: f64 = 8.314;

/// Default ambient temperature [K].
pub const AMBIENT_TEMP_K: f64 = 298.0;

// ─── Engine Defaults ────────────────────────────────────────────────

/// Top dead center [deg].
pub const TDC_DEG: f64 = 360.0;

/// Degrees between closing the injector and discharging the spark [deg].
pub const GRACE_DEG: f64 = 5.0;

/// Coil charge time before discharge [µs].
pub const DWELL_TIME_US: u32 = 4000;

/// Engine displacement [cc].
pub const ENGINE_DISPLACEMENT_CC: f64 = 35.8;

/// Injector fueling rate [g/s].
pub const INJECTOR_FLOW_G_PER_S: f64 = 0.6333;

// ─── Trigger Wheel Defaults ─────────────────────────────────────────

/// Tooth positions on the trigger wheel, including the missing one.
pub const TOOTH_POSITIONS: u16 = 13;

/// Intentionally omitted teeth.
pub const MISSING_TEETH: u16 = 1;

/// Crank angle reported at the first tooth after the gap [deg].
pub const CALIBRATION_ANGLE_DEG: f64 = 30.0;

/// Gap ratio above which an interval is classified as the missing tooth.
pub const MISSING_TOOTH_FACTOR: f64 = 1.3;

// ─── Operating Limits ───────────────────────────────────────────────

/// Below this speed the engine is considered stopped [rpm].
pub const ENGAGE_SPEED_RPM: f64 = 100.0;

/// Below this speed fixed cranking values are used [rpm].
pub const CRANKING_SPEED_RPM: f64 = 500.0;

/// Rev limiter trips above this speed [rpm].
pub const UPPER_REV_LIMIT_RPM: f64 = 6000.0;

/// Rev limiter releases at or below this speed [rpm].
pub const LOWER_REV_LIMIT_RPM: f64 = 5800.0;

/// Volumetric efficiency used while cranking [%].
pub const CRANK_VOL_EFF_PCT: f64 = 30.0;

/// Spark advance used while cranking [deg BTDC].
pub const CRANK_SPARK_ADV_DEG: f64 = 10.0;

// ─── Scheduler ──────────────────────────────────────────────────────

/// Smallest delay a timer channel can be armed with [µs].
pub const MIN_SCHEDULABLE_US: u32 = 1;

/// Number of logical timer channels (spark, fuel).
pub const CHANNEL_COUNT: usize = 2;

// ─── Calibration Tables ─────────────────────────────────────────────

/// Maximum breakpoints per table axis.
pub const MAX_BREAKPOINTS: usize = 32;

/// Maximum number of axes per table (linear, bilinear, trilinear).
pub const MAX_TABLE_AXES: usize = 3;

// ─── Parameter Bounds ───────────────────────────────────────────────

pub const MISSING_TOOTH_FACTOR_MIN: f64 = 1.1;
pub const MISSING_TOOTH_FACTOR_MAX: f64 = 2.0;
pub const TOOTH_POSITIONS_MIN: u16 = 3;
pub const TOOTH_POSITIONS_MAX: u16 = 360;
pub const DWELL_TIME_US_MIN: u32 = 100;
pub const DWELL_TIME_US_MAX: u32 = 20_000;
pub const DISPLACEMENT_CC_MIN: f64 = 1.0;
pub const DISPLACEMENT_CC_MAX: f64 = 10_000.0;
pub const GRACE_DEG_MIN: f64 = 0.0;
pub const GRACE_DEG_MAX: f64 = 90.0;
pub const AFR_MIN: f64 = 6.0;
pub const AFR_MAX: f64 = 25.0;
pub const TEMP_K_MIN: f64 = 200.0;
pub const TEMP_K_MAX: f64 = 400.0;
pub const RPM_LIMIT_MAX: f64 = 30_000.0;

const_assert!(MAX_BREAKPOINTS >= 2);
const_assert!(CHANNEL_COUNT == 2);
const_assert!(TOOTH_POSITIONS > MISSING_TEETH);
