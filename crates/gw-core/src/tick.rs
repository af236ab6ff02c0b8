//! Simulation time model.
//!
//! Time is a monotonically increasing `Tick` counter; there is no wall-clock
//! mapping.  Using an integer tick as the canonical time unit keeps event
//! schedules and truncation arithmetic exact, and comparisons O(1).

use std::fmt;

/// An absolute simulation step counter.
///
/// Stored as `u32`: episodes are bounded by `max_steps` and never approach
/// four billion steps.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub u32);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Return the tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u32) -> Tick {
        Tick(self.0 + n)
    }

    /// Advance by one step.
    #[inline]
    pub fn advance(&mut self) {
        self.0 += 1;
    }

    /// Ticks elapsed from `earlier` to `self`.
    ///
    /// # Panics
    /// Panics in debug mode if `earlier > self`.
    #[inline]
    pub fn since(self, earlier: Tick) -> u32 {
        self.0 - earlier.0
    }
}

impl std::ops::Add<u32> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u32) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl std::ops::Sub for Tick {
    type Output = u32;
    #[inline]
    fn sub(self, rhs: Tick) -> u32 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}
