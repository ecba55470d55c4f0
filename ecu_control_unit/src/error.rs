//! Control cycle error type.
//!
//! Per-revolution anomalies are not errors; they are reported as
//! `SkipReason` flags on the cycle outcome. `CycleError` covers what the
//! caller must act on: scheduler defects (already latched into fault by the
//! time the error is returned) and unusable simulation setups.

use thiserror::Error;

use crate::scheduler::SchedulerError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    /// Scheduler consistency violation; the control state is now `Fault`.
    #[error("scheduler defect: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Setup that cannot run at all.
    #[error("fatal: {0}")]
    Fatal(&'static str),
}
