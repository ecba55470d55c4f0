//! HAL driver implementations.
//!
//! - [`simulation`] - Virtual-time drivers for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `SensorSource`, `OutputDriver` and `TimerDriver` from
//!    `ecu_common::hal`
//! 3. Report timer expiries and tooth edges to the control unit's
//!    `SharedEngine`

pub mod simulation;
