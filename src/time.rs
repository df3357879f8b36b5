//! Monotonic millisecond timestamps.
//!
//! The tick source is a free-running 32-bit millisecond counter that wraps
//! after ~49.7 days. Every elapsed-time computation goes through
//! [`Instant::millis_since`], which subtracts with wrap-around, so a roll-over
//! between two readings still yields the true distance.

/// A point on the monotonic millisecond clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant(u32);

impl Instant {
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds from `earlier` to `self`.
    pub const fn millis_since(self, earlier: Instant) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// `true` once at least `budget_ms` have passed since `earlier`.
    pub const fn has_elapsed(self, earlier: Instant, budget_ms: u32) -> bool {
        self.millis_since(earlier) >= budget_ms
    }

    pub const fn add_millis(self, millis: u32) -> Self {
        Self(self.0.wrapping_add(millis))
    }
}
