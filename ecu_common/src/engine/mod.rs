//! Engine control shared types.
//!
//! Everything the control unit shares with drivers, tools and tests lives
//! here: configuration structs, channel/action tags, control state enums and
//! the per-revolution skip flags.

pub mod config;
pub mod error;
pub mod state;
