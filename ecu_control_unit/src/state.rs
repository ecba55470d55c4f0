//! State machine module root.
//!
//! - [`machine`] - per-revolution control state (Idle → Computing → armed → Idle, Fault)
//! - [`rev_limit`] - hysteresis rev limiter

pub mod machine;
pub mod rev_limit;
