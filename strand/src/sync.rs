//! Blocking synchronization primitives.
//!
//! - [`Mutex`]: non-reentrant lock; the guard releases on every exit path.
//! - [`Semaphore`]: counting semaphore with optionally bounded waits.
//! - [`CondVar`]: condition variable paired with a [`Mutex`]. Resolves to
//!   [`NativeCondVar`] unless the `emulated-condvar` feature selects the
//!   semaphore hand-off [`HandoffCondVar`].

mod condvar;
mod mutex;
mod semaphore;

use std::time::Duration;

pub use condvar::{HandoffCondVar, NativeCondVar};
pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;

#[cfg(not(feature = "emulated-condvar"))]
pub type CondVar = NativeCondVar;

#[cfg(feature = "emulated-condvar")]
pub type CondVar = HandoffCondVar;

/// How long a blocking operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at least the specified duration.
    Duration(Duration),
}

impl Timeout {
    /// Never blocks.
    pub const ZERO: Self = Self::Duration(Duration::ZERO);

    /// Convenience constructor for millisecond timeouts.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self::Duration(Duration::from_millis(ms))
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Infinite, Self::Duration)
    }
}
