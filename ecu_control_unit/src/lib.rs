//! # ECU Control Unit Library
//!
//! Real-time control core for a single-cylinder spark-ignition engine.
//! Tracks crank position from a missing-tooth trigger wheel, derives spark
//! and injection targets once per revolution from calibration tables and a
//! fuel model, and arms one-shot timer channels that drive the coil and
//! injector outputs.
//!
//! ## Execution Contexts
//!
//! ```text
//!  tooth callback ──► CrankTracker ──recalc──┐
//!                                            ▼
//!  main loop ─────────────────────────► ControlCycle::poll
//!                                            │ arm
//!                                            ▼
//!  timer callback ◄── EventScheduler ◄── Spark / Fuel channels
//!        │
//!        └──► OutputDriver (coil, injector)
//! ```
//!
//! Callbacks and the main loop meet only inside
//! [`engine::SharedEngine::critical_section`].

pub mod config;
pub mod crank;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod fuel;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod table;
