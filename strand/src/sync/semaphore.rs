//! Counting semaphore.

use std::time::Instant;

use super::{Mutex, NativeCondVar, Timeout};

/// An unsigned counter with blocking decrement and non-blocking increment.
///
/// Always built on [`NativeCondVar`]; the emulated condition variable is itself
/// made of semaphores.
///
/// [`signal`](Self::signal) wakes exactly one blocked waiter, if there is one.
/// Timed waits are measured against the OS monotonic clock and never return
/// `false` before the full timeout has elapsed.
pub struct Semaphore {
    count: Mutex<u32>,
    available: NativeCondVar,
}

impl Semaphore {
    /// Creates a semaphore holding `initial` permits.
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            available: NativeCondVar::new(),
        }
    }

    /// Takes one permit, blocking for up to `timeout` until one is available.
    ///
    /// Returns `false` if the timeout expired first. `Timeout::ZERO` polls.
    pub fn wait(&self, timeout: impl Into<Timeout>) -> bool {
        let mut count = self.count.lock();
        match timeout.into() {
            Timeout::Infinite => {
                while *count == 0 {
                    self.available.wait(&mut count);
                }
            }
            Timeout::Duration(d) => {
                let deadline = Instant::now().checked_add(d);
                while *count == 0 {
                    let Some(deadline) = deadline else {
                        // Unrepresentable deadline: treat as infinite.
                        self.available.wait(&mut count);
                        continue;
                    };
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.available.wait_timeout(&mut count, deadline - now);
                }
            }
        }
        *count -= 1;
        true
    }

    /// Takes one permit if one is available right now.
    pub fn try_wait(&self) -> bool {
        self.wait(Timeout::ZERO)
    }

    /// Returns one permit and wakes one waiter.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count < u32::MAX, "semaphore count overflow");
        *count = count.saturating_add(1);
        drop(count);
        self.available.notify();
    }

    /// Current number of permits. Stale as soon as it is returned.
    #[must_use]
    pub fn count(&self) -> u32 {
        *self.count.lock()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
