//! Simulation driver module.
//!
//! Drivers sharing one virtual microsecond clock so that a discrete-event
//! loop can run the control core without physical hardware.

mod io;
mod timer;
mod wheel;

pub use io::{OutputEdge, OutputPin, SimOutputs, SimSensors};
pub use timer::{SimClock, SimTimer};
pub use wheel::{SpeedProfile, ToothEvent, TriggerWheelSim};
