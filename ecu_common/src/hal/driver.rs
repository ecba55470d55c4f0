//! Collaborator traits and error types.
//!
//! This module defines:
//! - `SensorSource` - calibrated sensor readings
//! - `OutputDriver` - injector and coil pin writes
//! - `TimerDriver` - per-channel one-shot timers and the free-running clock
//! - `HalError` - error types for collaborator calls

use thiserror::Error;

use crate::engine::state::Channel;

/// Error types for collaborator calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// Sensor could not deliver a reading.
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(&'static str),

    /// Sensor delivered a non-finite or implausible value.
    #[error("Sensor {name} out of range: {value}")]
    SensorOutOfRange { name: &'static str, value: f64 },

    /// Timer hardware rejected a request.
    #[error("Timer error on {channel} channel: {reason}")]
    Timer {
        channel: Channel,
        reason: &'static str,
    },
}

/// Calibrated sensor readings.
///
/// Conversion from raw ADC counts happens behind this trait. All calls are
/// synchronous and cheap; they are made from the main loop, never from a
/// callback.
pub trait SensorSource: Send {
    /// Manifold absolute pressure [kPa].
    fn manifold_pressure_kpa(&self) -> Result<f64, HalError>;

    /// Throttle opening [%].
    fn throttle_position_pct(&self) -> Result<f64, HalError>;

    /// Intake air temperature [K].
    fn intake_air_temp_k(&self) -> Result<f64, HalError>;

    /// Oxygen sensor reading [V].
    fn oxygen_sensor_v(&self) -> Result<f64, HalError>;
}

/// Digital outputs driving the injector and the ignition coil.
///
/// Pin writes cannot fail once the board is configured.
pub trait OutputDriver: Send {
    /// Open (`true`) or close the fuel injector.
    fn set_fuel_injector(&mut self, open: bool);

    /// Energize (`true`) or de-energize the spark coil.
    fn set_spark_coil(&mut self, on: bool);
}

/// One-shot timers, one per logical [`Channel`], plus a microsecond clock.
///
/// Expiry is reported by the board calling back into the control core with
/// the channel identity; the timer itself carries no action.
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `start_one_shot()` | callable from callbacks, O(1) |
/// | `cancel()` | callable from callbacks, O(1) |
/// | `now_us()` | monotonic, never wraps in practice |
pub trait TimerDriver: Send {
    /// Arm `channel` to expire `delay_us` from now, replacing any pending expiry.
    ///
    /// # Errors
    /// `HalError::Timer` if the hardware cannot represent the delay.
    fn start_one_shot(&mut self, channel: Channel, delay_us: u32) -> Result<(), HalError>;

    /// Disarm `channel` without reporting an expiry.
    fn cancel(&mut self, channel: Channel);

    /// Microseconds since `channel` was last armed, `None` if idle.
    fn elapsed_us(&self, channel: Channel) -> Option<u64>;

    /// Free-running clock [µs].
    fn now_us(&self) -> u64;
}
