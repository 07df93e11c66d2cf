//! Wrap-aware list of armed timers.

use super::ticks::{HALF_RANGE, MAX_SLEEP_TICKS};

struct Armed<T> {
    payload: T,
    end: u32,
    /// `end` lies in the next tick period: `now + timeout` overflowed.
    warp: bool,
}

/// Unordered set of armed timers over a wrapping `u32` tick counter.
///
/// Each timer stores `end = now + timeout` (wrapping) and a `warp` flag set
/// when that sum overflowed. A warped timer never fires in the current period.
/// When the counter itself is seen to wrap, warped timers lose the flag and
/// every other timer is already past due and expires immediately.
///
/// The wrap is detected by the counter moving from the upper half of its range
/// to the lower half between observations, so callers must observe at least
/// every [`MAX_SLEEP_TICKS`].
pub struct TimerList<T> {
    entries: Vec<Armed<T>>,
    upper_half: bool,
}

impl<T> TimerList<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            upper_half: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Notes `now`, applying a counter wrap if one happened since the last
    /// observation. Returns whether it did.
    fn observe(&mut self, now: u32) -> bool {
        let upper = now >= HALF_RANGE;
        let wrapped = self.upper_half && !upper;
        self.upper_half = upper;
        if wrapped {
            for entry in &mut self.entries {
                if entry.warp {
                    entry.warp = false;
                } else {
                    entry.end = 0;
                }
            }
        }
        wrapped
    }

    /// Arms `payload` to fire `timeout` ticks after `now`.
    ///
    /// Returns whether a counter wrap was applied first.
    pub fn insert(&mut self, now: u32, timeout: u32, payload: T) -> bool {
        let wrapped = self.observe(now);
        let end = now.wrapping_add(timeout);
        self.entries.push(Armed {
            payload,
            end,
            warp: end < now,
        });
        wrapped
    }

    /// Disarms and returns the first timer matching `pred`.
    pub fn remove(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let pos = self.entries.iter().position(|e| pred(&e.payload))?;
        Some(self.entries.remove(pos).payload)
    }

    pub fn contains(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.entries.iter().any(|e| pred(&e.payload))
    }

    /// Moves every timer due at `now` into `due`, in arming order.
    ///
    /// Returns whether a counter wrap was detected.
    pub fn take_due(&mut self, now: u32, due: &mut Vec<T>) -> bool {
        let wrapped = self.observe(now);
        let mut i = 0;
        while i < self.entries.len() {
            let entry = &self.entries[i];
            if !entry.warp && entry.end <= now {
                due.push(self.entries.remove(i).payload);
            } else {
                i += 1;
            }
        }
        wrapped
    }

    /// How long to sleep before the next check, `None` with no timers armed.
    ///
    /// Never more than [`MAX_SLEEP_TICKS`].
    pub fn sleep_bound(&self, now: u32) -> Option<u32> {
        if self.entries.is_empty() {
            return None;
        }
        let nearest = self
            .entries
            .iter()
            .map(|e| {
                if e.warp {
                    // Due in the next period.
                    e.end.wrapping_sub(now)
                } else {
                    e.end.saturating_sub(now)
                }
            })
            .min()
            .unwrap_or(MAX_SLEEP_TICKS);
        Some(nearest.min(MAX_SLEEP_TICKS))
    }

    /// Disarms everything.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain(..).map(|e| e.payload)
    }
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}
