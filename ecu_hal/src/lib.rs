//! # ECU HAL Library
//!
//! Driver implementations of the collaborator traits defined in
//! `ecu_common::hal`.
//!
//! # Module Structure
//!
//! - [`drivers`] - Driver implementations (simulation only for now)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ecu_hal                              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────────────────┐  │
//! │  │  SimClock   │◄──┤  SimTimer   │   │  TriggerWheelSim   │  │
//! │  │ (µs, Arc)   │◄──┤  SimOutputs │   │  (tooth timestamps)│  │
//! │  └─────────────┘   └──────┬──────┘   └─────────┬──────────┘  │
//! │                           │                    │             │
//! │                           ▼                    ▼             │
//! │              TimerDriver / OutputDriver   on_tooth(t)        │
//! │                 (ecu_common::hal)        (control unit)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod drivers;

pub use crate::drivers::simulation::{
    OutputEdge, OutputPin, SimClock, SimOutputs, SimSensors, SimTimer, SpeedProfile, ToothEvent,
    TriggerWheelSim,
};
