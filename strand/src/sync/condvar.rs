//! Condition variables.
//!
//! Both implementations share one interface: `wait` atomically releases the
//! caller's held [`Mutex`](super::Mutex) guard and blocks, reacquiring the lock
//! before returning; `notify` wakes at most one waiter. Callers re-check their
//! predicate in a loop, as with any condition variable.

use std::time::Duration;

use super::{Mutex, MutexGuard, Semaphore, Timeout};

/// Condition variable backed by the platform's native primitive.
#[derive(Default)]
pub struct NativeCondVar {
    inner: parking_lot::Condvar,
}

impl NativeCondVar {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::Condvar::new(),
        }
    }

    /// Releases `guard`, blocks until notified, then reacquires.
    pub fn wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>) {
        self.inner.wait(guard);
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` if woken before the timeout.
    pub fn wait_timeout<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        !self.inner.wait_for(guard, timeout).timed_out()
    }

    /// Wakes one waiter, if any.
    pub fn notify(&self) {
        self.inner.notify_one();
    }
}

#[derive(Default)]
struct HandoffCounts {
    waiters: u32,
    signals: u32,
}

/// Condition variable built only from a mutex and two semaphores.
///
/// `notify` does not return until the woken waiter has acknowledged the wake
/// on the `done` semaphore, so a notification can never be lost between a
/// waiter registering and actually blocking.
pub struct HandoffCondVar {
    counts: Mutex<HandoffCounts>,
    wake: Semaphore,
    done: Semaphore,
}

impl HandoffCondVar {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HandoffCounts::default()),
            wake: Semaphore::new(0),
            done: Semaphore::new(0),
        }
    }

    /// Releases `guard`, blocks until notified, then reacquires.
    pub fn wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>) {
        self.counts.lock().waiters += 1;
        MutexGuard::unlocked(guard, || {
            self.wake.wait(Timeout::Infinite);
            self.acknowledge(true);
        });
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` if woken before the timeout.
    pub fn wait_timeout<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        self.counts.lock().waiters += 1;
        MutexGuard::unlocked(guard, || {
            let woken = self.wake.wait(timeout);
            self.acknowledge(woken)
        })
    }

    fn acknowledge(&self, woken: bool) -> bool {
        let mut counts = self.counts.lock();
        // A notifier may have posted between our timeout and taking the lock.
        let woken = woken || (counts.signals > 0 && self.wake.try_wait());
        if woken && counts.signals > 0 {
            counts.signals -= 1;
            self.done.signal();
        }
        counts.waiters -= 1;
        woken
    }

    /// Wakes one waiter, if any, and blocks until it has been handed the wake.
    pub fn notify(&self) {
        let mut counts = self.counts.lock();
        if counts.waiters > counts.signals {
            counts.signals += 1;
            self.wake.signal();
            drop(counts);
            self.done.wait(Timeout::Infinite);
        }
    }
}

impl Default for HandoffCondVar {
    fn default() -> Self {
        Self::new()
    }
}
