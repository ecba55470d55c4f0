//! ECU Common Library
//!
//! Shared constants, configuration loading and collaborator interfaces for
//! all ECU workspace crates.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading trait and shared config types
//! - [`consts`] - Physical constants, defaults and parameter bounds
//! - [`engine`] - Engine configuration, state enums and skip/fault flags
//! - [`hal`] - Sensor, output and timer collaborator traits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecu_common::prelude::*;
//! use ecu_common::engine::config::EcuConfig;
//! ```

pub mod config;
pub mod consts;
pub mod engine;
pub mod hal;
pub mod prelude;
