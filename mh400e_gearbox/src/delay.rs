//! Shared countdown used by every shift stage.
//!
//! Only one stage runs at a time, so a single counter serves the whole
//! cascade. A stage schedules a re-check by arming the counter and returning;
//! each following tick subtracts the elapsed period until it runs out.

/// Signed countdown in nanoseconds. Positive means "still waiting".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayTimer {
    remaining_ns: i64,
}

impl DelayTimer {
    /// Create an elapsed timer.
    pub const fn new() -> Self {
        Self { remaining_ns: 0 }
    }

    /// Start a new countdown, replacing any pending one.
    #[inline]
    pub fn arm(&mut self, duration_ns: i64) {
        self.remaining_ns = duration_ns;
    }

    /// Time left [ns]; may be negative right after the last decrement.
    #[inline]
    pub const fn remaining_ns(&self) -> i64 {
        self.remaining_ns
    }

    /// Account for one elapsed period.
    ///
    /// Returns `true` while the countdown was still running before this call.
    /// Otherwise clamps it to zero and returns `false`. A zero period never
    /// counts as elapsed time.
    pub fn wait(&mut self, period_ns: i64) -> bool {
        if period_ns > 0 && self.remaining_ns > 0 {
            self.remaining_ns -= period_ns;
            return true;
        }
        self.remaining_ns = 0;
        false
    }
}
