//! Prelude module for common re-exports.
//!
//! Consumers can do `use ecu_common::prelude::*;` and get the most
//! important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use ecu_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::engine::config::{EcuConfig, TemperatureSource};

// ─── Engine State ───────────────────────────────────────────────────
pub use crate::engine::error::SkipReason;
pub use crate::engine::state::{Action, Channel, CycleState, OutputState};

// ─── Collaborators ──────────────────────────────────────────────────
pub use crate::hal::{HalError, OutputDriver, SensorSource, TimerDriver};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{CHANNEL_COUNT, MAX_BREAKPOINTS, MAX_TABLE_AXES};
