//! Configuration structures for the engine control core.
//!
//! All config types use `serde::Deserialize` for TOML loading. Numeric
//! parameters are bounded by the `*_MIN`/`*_MAX` constants in
//! [`crate::consts`]. Optional sections fall back to the defaults in the same
//! module so a file only has to carry the calibration tables.

use serde::{Deserialize, Serialize};

use crate::config::SharedConfig;
use crate::consts::*;

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete ECU configuration, immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcuConfig {
    /// Logging and instance naming.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Engine geometry and ignition timing constants.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Trigger wheel description.
    #[serde(default)]
    pub crank: CrankConfig,

    /// Fuel mass-flow constants.
    #[serde(default)]
    pub fuel: FuelConfig,

    /// Engage, cranking and rev-limit thresholds.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Timer channel parameters.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Volumetric-efficiency and spark-advance tables.
    pub tables: TablesConfig,
}

impl EcuConfig {
    /// Validate every section and the cross-section constraints.
    pub fn validate(&self) -> Result<(), String> {
        self.shared.validate().map_err(|e| e.to_string())?;
        self.engine.validate()?;
        self.crank.validate()?;
        self.fuel.validate()?;
        self.limits.validate()?;
        self.scheduler.validate()?;
        self.tables.validate()?;

        if self.engine.dwell_us < self.scheduler.min_delay_us {
            return Err(format!(
                "engine.dwell_us {} below scheduler.min_delay_us {}",
                self.engine.dwell_us, self.scheduler.min_delay_us
            ));
        }

        // The gap tooth must precede the earliest injector-close angle, or
        // every target of the revolution has passed when it is computed.
        let max_advance = self
            .tables
            .spark_advance
            .values
            .flatten()
            .into_iter()
            .fold(self.limits.crank_spark_adv_deg, f64::max);
        let latest = (self.engine.tdc_deg - self.engine.grace_deg - max_advance)
            .min(self.engine.tdc_deg);
        if self.crank.calibration_angle_deg >= latest {
            return Err(format!(
                "crank.calibration_angle_deg {} must be below {latest} \
                 (tdc_deg - grace_deg - max spark advance)",
                self.crank.calibration_angle_deg
            ));
        }
        Ok(())
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// Engine geometry and ignition timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Swept volume [cc].
    #[serde(default = "default_displacement")]
    pub displacement_cc: f64,

    /// Top dead center on the crank-angle scale [deg].
    #[serde(default = "default_tdc")]
    pub tdc_deg: f64,

    /// Angle between injector close and spark discharge [deg].
    #[serde(default = "default_grace")]
    pub grace_deg: f64,

    /// Coil charge time [µs].
    #[serde(default = "default_dwell")]
    pub dwell_us: u32,
}

fn default_displacement() -> f64 {
    ENGINE_DISPLACEMENT_CC
}
fn default_tdc() -> f64 {
    TDC_DEG
}
fn default_grace() -> f64 {
    GRACE_DEG
}
fn default_dwell() -> u32 {
    DWELL_TIME_US
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            displacement_cc: ENGINE_DISPLACEMENT_CC,
            tdc_deg: TDC_DEG,
            grace_deg: GRACE_DEG,
            dwell_us: DWELL_TIME_US,
        }
    }
}

impl EngineConfig {
    /// Displacement in [m³].
    #[inline]
    pub fn displacement_m3(&self) -> f64 {
        self.displacement_cc * 1.0e-6
    }

    pub fn validate(&self) -> Result<(), String> {
        check_range(
            "engine.displacement_cc",
            self.displacement_cc,
            DISPLACEMENT_CC_MIN,
            DISPLACEMENT_CC_MAX,
        )?;
        check_positive("engine.tdc_deg", self.tdc_deg)?;
        check_range("engine.tdc_deg", self.tdc_deg, 0.0, 2.0 * DEG_PER_REV)?;
        check_range("engine.grace_deg", self.grace_deg, GRACE_DEG_MIN, GRACE_DEG_MAX)?;
        if self.dwell_us < DWELL_TIME_US_MIN || self.dwell_us > DWELL_TIME_US_MAX {
            return Err(format!(
                "engine.dwell_us {} out of range [{}, {}]",
                self.dwell_us, DWELL_TIME_US_MIN, DWELL_TIME_US_MAX
            ));
        }
        Ok(())
    }
}

// ─── Trigger Wheel ──────────────────────────────────────────────────

/// Missing-tooth trigger wheel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrankConfig {
    /// Evenly spaced tooth positions, including the omitted ones.
    #[serde(default = "default_tooth_positions")]
    pub tooth_positions: u16,

    /// Omitted teeth forming the reference gap.
    #[serde(default = "default_missing_teeth")]
    pub missing_teeth: u16,

    /// Crank angle of the first tooth after the gap [deg].
    #[serde(default = "default_calibration_angle")]
    pub calibration_angle_deg: f64,

    /// Interval ratio above which a gap is detected.
    #[serde(default = "default_missing_tooth_factor")]
    pub missing_tooth_factor: f64,
}

fn default_tooth_positions() -> u16 {
    TOOTH_POSITIONS
}
fn default_missing_teeth() -> u16 {
    MISSING_TEETH
}
fn default_calibration_angle() -> f64 {
    CALIBRATION_ANGLE_DEG
}
fn default_missing_tooth_factor() -> f64 {
    MISSING_TOOTH_FACTOR
}

impl Default for CrankConfig {
    fn default() -> Self {
        Self {
            tooth_positions: TOOTH_POSITIONS,
            missing_teeth: MISSING_TEETH,
            calibration_angle_deg: CALIBRATION_ANGLE_DEG,
            missing_tooth_factor: MISSING_TOOTH_FACTOR,
        }
    }
}

impl CrankConfig {
    /// Angular distance between adjacent tooth positions [deg].
    #[inline]
    pub fn tooth_pitch_deg(&self) -> f64 {
        DEG_PER_REV / f64::from(self.tooth_positions)
    }

    /// Physical teeth actually present on the wheel.
    #[inline]
    pub fn teeth_present(&self) -> u16 {
        self.tooth_positions.saturating_sub(self.missing_teeth)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tooth_positions < TOOTH_POSITIONS_MIN || self.tooth_positions > TOOTH_POSITIONS_MAX
        {
            return Err(format!(
                "crank.tooth_positions {} out of range [{}, {}]",
                self.tooth_positions, TOOTH_POSITIONS_MIN, TOOTH_POSITIONS_MAX
            ));
        }
        if self.missing_teeth == 0 || self.missing_teeth >= self.tooth_positions - 1 {
            return Err(format!(
                "crank.missing_teeth {} must leave at least two teeth on a {}-position wheel",
                self.missing_teeth, self.tooth_positions
            ));
        }
        check_range(
            "crank.calibration_angle_deg",
            self.calibration_angle_deg,
            0.0,
            DEG_PER_REV,
        )?;
        if self.calibration_angle_deg >= DEG_PER_REV {
            return Err("crank.calibration_angle_deg must be below 360".to_string());
        }
        check_range(
            "crank.missing_tooth_factor",
            self.missing_tooth_factor,
            MISSING_TOOTH_FACTOR_MIN,
            MISSING_TOOTH_FACTOR_MAX,
        )?;
        // The real gap ratio is missing_teeth + 1; a factor at or above it never detects.
        let gap_ratio = f64::from(self.missing_teeth) + 1.0;
        if self.missing_tooth_factor >= gap_ratio {
            return Err(format!(
                "crank.missing_tooth_factor {} cannot detect a {}x gap",
                self.missing_tooth_factor, gap_ratio
            ));
        }
        Ok(())
    }
}

// ─── Fuel ───────────────────────────────────────────────────────────

/// Which temperature feeds the ideal-gas air mass estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureSource {
    /// Fixed `fuel.ambient_temp_k`.
    #[default]
    Ambient,
    /// Intake air temperature sensor.
    Intake,
}

/// Mass-flow constants for the injector pulse computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuelConfig {
    /// Target air-fuel ratio [kg/kg].
    #[serde(default = "default_afr")]
    pub air_fuel_ratio: f64,

    /// Injector fueling rate [g/s].
    #[serde(default = "default_injector_flow")]
    pub injector_flow_g_per_s: f64,

    /// Ambient air temperature [K].
    #[serde(default = "default_ambient")]
    pub ambient_temp_k: f64,

    /// Molar mass of air [g/mol].
    #[serde(default = "default_molar_mass")]
    pub molar_mass_air: f64,

    /// Ideal gas constant [J/(mol·K)].
    #[serde(default = "default_gas_constant")]
    pub gas_constant: f64,

    /// Temperature used for the air mass estimate.
    #[serde(default)]
    pub temperature_source: TemperatureSource,
}

fn default_afr() -> f64 {
    AIR_FUEL_RATIO
}
fn default_injector_flow() -> f64 {
    INJECTOR_FLOW_G_PER_S
}
fn default_ambient() -> f64 {
    AMBIENT_TEMP_K
}
fn default_molar_mass() -> f64 {
    MOLAR_MASS_AIR
}
fn default_gas_constant() -> f64 {
    GAS_CONSTANT
}

impl Default for FuelConfig {
    fn default() -> Self {
        Self {
            air_fuel_ratio: AIR_FUEL_RATIO,
            injector_flow_g_per_s: INJECTOR_FLOW_G_PER_S,
            ambient_temp_k: AMBIENT_TEMP_K,
            molar_mass_air: MOLAR_MASS_AIR,
            gas_constant: GAS_CONSTANT,
            temperature_source: TemperatureSource::Ambient,
        }
    }
}

impl FuelConfig {
    pub fn validate(&self) -> Result<(), String> {
        check_range("fuel.air_fuel_ratio", self.air_fuel_ratio, AFR_MIN, AFR_MAX)?;
        check_positive("fuel.injector_flow_g_per_s", self.injector_flow_g_per_s)?;
        check_range("fuel.ambient_temp_k", self.ambient_temp_k, TEMP_K_MIN, TEMP_K_MAX)?;
        check_positive("fuel.molar_mass_air", self.molar_mass_air)?;
        check_positive("fuel.gas_constant", self.gas_constant)?;
        Ok(())
    }
}

// ─── Operating Limits ───────────────────────────────────────────────

/// Speed thresholds and cranking fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default = "default_engage")]
    pub engage_rpm: f64,
    #[serde(default = "default_cranking")]
    pub cranking_rpm: f64,
    #[serde(default = "default_upper_rev")]
    pub upper_rev_limit_rpm: f64,
    #[serde(default = "default_lower_rev")]
    pub lower_rev_limit_rpm: f64,
    /// Volumetric efficiency while cranking [%].
    #[serde(default = "default_crank_ve")]
    pub crank_vol_eff_pct: f64,
    /// Spark advance while cranking [deg BTDC].
    #[serde(default = "default_crank_sa")]
    pub crank_spark_adv_deg: f64,
}

fn default_engage() -> f64 {
    ENGAGE_SPEED_RPM
}
fn default_cranking() -> f64 {
    CRANKING_SPEED_RPM
}
fn default_upper_rev() -> f64 {
    UPPER_REV_LIMIT_RPM
}
fn default_lower_rev() -> f64 {
    LOWER_REV_LIMIT_RPM
}
fn default_crank_ve() -> f64 {
    CRANK_VOL_EFF_PCT
}
fn default_crank_sa() -> f64 {
    CRANK_SPARK_ADV_DEG
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            engage_rpm: ENGAGE_SPEED_RPM,
            cranking_rpm: CRANKING_SPEED_RPM,
            upper_rev_limit_rpm: UPPER_REV_LIMIT_RPM,
            lower_rev_limit_rpm: LOWER_REV_LIMIT_RPM,
            crank_vol_eff_pct: CRANK_VOL_EFF_PCT,
            crank_spark_adv_deg: CRANK_SPARK_ADV_DEG,
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> Result<(), String> {
        check_range("limits.engage_rpm", self.engage_rpm, 0.0, RPM_LIMIT_MAX)?;
        check_range("limits.cranking_rpm", self.cranking_rpm, 0.0, RPM_LIMIT_MAX)?;
        check_range("limits.lower_rev_limit_rpm", self.lower_rev_limit_rpm, 0.0, RPM_LIMIT_MAX)?;
        check_range("limits.upper_rev_limit_rpm", self.upper_rev_limit_rpm, 0.0, RPM_LIMIT_MAX)?;
        if !(self.engage_rpm <= self.cranking_rpm
            && self.cranking_rpm < self.lower_rev_limit_rpm
            && self.lower_rev_limit_rpm < self.upper_rev_limit_rpm)
        {
            return Err(format!(
                "limits must satisfy engage ({}) <= cranking ({}) < lower ({}) < upper ({})",
                self.engage_rpm,
                self.cranking_rpm,
                self.lower_rev_limit_rpm,
                self.upper_rev_limit_rpm
            ));
        }
        check_range("limits.crank_vol_eff_pct", self.crank_vol_eff_pct, 0.0, 200.0)?;
        check_range("limits.crank_spark_adv_deg", self.crank_spark_adv_deg, -30.0, 90.0)?;
        Ok(())
    }
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// Timer channel parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Floor applied to past-due delays [µs].
    #[serde(default = "default_min_delay")]
    pub min_delay_us: u32,
}

fn default_min_delay() -> u32 {
    MIN_SCHEDULABLE_US
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_delay_us: MIN_SCHEDULABLE_US,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_delay_us == 0 {
            return Err("scheduler.min_delay_us must be at least 1".to_string());
        }
        Ok(())
    }
}

// ─── Calibration Tables ─────────────────────────────────────────────

/// The two calibration surfaces consumed by the control cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablesConfig {
    /// Volumetric efficiency [%] by (rpm, kPa).
    pub ve: TableConfig,
    /// Spark advance [deg BTDC] by (rpm, kPa).
    pub spark_advance: TableConfig,
}

impl TablesConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, table) in [("ve", &self.ve), ("spark_advance", &self.spark_advance)] {
            if table.dimensions() != 2 {
                return Err(format!(
                    "tables.{name} must be indexed by speed and manifold pressure, got {} axes",
                    table.dimensions()
                ));
            }
        }
        Ok(())
    }
}

/// Raw table description as written in TOML.
///
/// Breakpoint and grid validity is checked when the runtime table is
/// constructed from this description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// First axis breakpoints.
    pub x_axis: Vec<f64>,
    /// Second axis breakpoints.
    #[serde(default)]
    pub y_axis: Option<Vec<f64>>,
    /// Third axis breakpoints.
    #[serde(default)]
    pub z_axis: Option<Vec<f64>>,
    /// Grid values; nesting depth matches the axis count, outermost = x.
    pub values: TableValues,
}

impl TableConfig {
    /// Number of axes described.
    pub fn dimensions(&self) -> usize {
        1 + usize::from(self.y_axis.is_some()) + usize::from(self.z_axis.is_some())
    }

    /// Axes in x, y, z order.
    pub fn axes(&self) -> Vec<&[f64]> {
        let mut axes: Vec<&[f64]> = vec![self.x_axis.as_slice()];
        if let Some(y) = &self.y_axis {
            axes.push(y.as_slice());
        }
        if let Some(z) = &self.z_axis {
            axes.push(z.as_slice());
        }
        axes
    }
}

/// Grid values at nesting depth 1, 2 or 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValues {
    Line(Vec<f64>),
    Grid(Vec<Vec<f64>>),
    Cube(Vec<Vec<Vec<f64>>>),
}

impl TableValues {
    /// Nesting depth.
    pub fn depth(&self) -> usize {
        match self {
            Self::Line(_) => 1,
            Self::Grid(_) => 2,
            Self::Cube(_) => 3,
        }
    }

    /// Shape along each nesting level, `None` if rows are ragged.
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Self::Line(v) => Some(vec![v.len()]),
            Self::Grid(rows) => {
                let inner = rows.first().map_or(0, Vec::len);
                rows.iter()
                    .all(|r| r.len() == inner)
                    .then(|| vec![rows.len(), inner])
            }
            Self::Cube(planes) => {
                let rows = planes.first().map_or(0, Vec::len);
                let inner = planes
                    .first()
                    .and_then(|p| p.first())
                    .map_or(0, Vec::len);
                planes
                    .iter()
                    .all(|p| p.len() == rows && p.iter().all(|r| r.len() == inner))
                    .then(|| vec![planes.len(), rows, inner])
            }
        }
    }

    /// Row-major flattening (outermost index varies slowest).
    pub fn flatten(&self) -> Vec<f64> {
        match self {
            Self::Line(v) => v.clone(),
            Self::Grid(rows) => rows.iter().flatten().copied().collect(),
            Self::Cube(planes) => planes.iter().flatten().flatten().copied().collect(),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), String> {
    if !value.is_finite() || value < min || value > max {
        return Err(format!("{name} {value} out of range [{min}, {max}]"));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("{name} {value} must be positive"));
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
