//! Hardware collaborator interfaces.
//!
//! The control core never touches registers. Calibrated sensor readings,
//! digital output writes and one-shot timers are reached only through the
//! traits in [`driver`], implemented by real boards or by the simulation
//! drivers in `ecu_hal`.

pub mod driver;

pub use driver::{HalError, OutputDriver, SensorSource, TimerDriver};
