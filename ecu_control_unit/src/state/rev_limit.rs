//! Rev limiter with hysteresis.
//!
//! Engages when speed rises above the upper limit and stays engaged until
//! speed falls to or below the lower limit. While engaged the control cycle
//! arms nothing new; events already in flight complete normally.

use tracing::debug;

#[derive(Debug, Clone)]
pub struct RevLimiter {
    upper_rpm: f64,
    lower_rpm: f64,
    limited: bool,
    engagements: u64,
}

impl RevLimiter {
    pub fn new(upper_rpm: f64, lower_rpm: f64) -> Self {
        Self {
            upper_rpm,
            lower_rpm,
            limited: false,
            engagements: 0,
        }
    }

    /// Feed the latest speed; returns whether scheduling is suppressed.
    pub fn update(&mut self, rpm: f64) -> bool {
        if !self.limited && rpm > self.upper_rpm {
            self.limited = true;
            self.engagements += 1;
            debug!(rpm, upper = self.upper_rpm, "rev limiter engaged");
        } else if self.limited && rpm <= self.lower_rpm {
            self.limited = false;
            debug!(rpm, lower = self.lower_rpm, "rev limiter released");
        }
        self.limited
    }

    #[inline]
    pub fn is_limited(&self) -> bool {
        self.limited
    }

    /// Times the limiter has engaged.
    #[inline]
    pub fn engagements(&self) -> u64 {
        self.engagements
    }

    pub fn reset(&mut self) {
        self.limited = false;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
