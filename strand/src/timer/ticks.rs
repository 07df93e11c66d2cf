//! Tick clocks.

use std::fmt;

/// Midpoint of the tick range. Crossing from at-or-above it to below it
/// between two observations means the counter wrapped.
pub const HALF_RANGE: u32 = 1 << 31;

/// Longest the scheduler sleeps without re-reading the clock, so that every
/// wrap is observed from both halves.
pub const MAX_SLEEP_TICKS: u32 = u32::MAX / 4;

/// Source of wrapping millisecond ticks.
pub trait TickSource: Send + Sync {
    fn ticks(&self) -> u32;
}

/// Monotonic millisecond ticks counted from construction.
pub struct MonotonicTicks {
    anchor: minstant::Instant,
    offset: u32,
}

impl MonotonicTicks {
    /// Ticks starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Ticks starting at `offset`; placing it just below `u32::MAX` makes the
    /// counter wrap shortly after start.
    #[must_use]
    pub fn starting_at(offset: u32) -> Self {
        Self {
            anchor: minstant::Instant::now(),
            offset,
        }
    }
}

impl Default for MonotonicTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicTicks {
    fn ticks(&self) -> u32 {
        // Truncation is the wrap.
        let elapsed = self.anchor.elapsed().as_millis() as u32;
        self.offset.wrapping_add(elapsed)
    }
}

impl fmt::Debug for MonotonicTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonotonicTicks")
            .field("offset", &self.offset)
            .field("now", &self.ticks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn advances_in_milliseconds() {
        let clock = MonotonicTicks::new();
        let t0 = clock.ticks();
        std::thread::sleep(Duration::from_millis(20));
        let dt = clock.ticks().wrapping_sub(t0);
        assert!((20..1000).contains(&dt), "advanced {dt} ticks");
    }

    #[test]
    fn offset_wraps() {
        let clock = MonotonicTicks::starting_at(u32::MAX - 5);
        std::thread::sleep(Duration::from_millis(20));
        assert!(clock.ticks() < HALF_RANGE);
    }
}
