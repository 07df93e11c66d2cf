//! Non-reentrant mutual exclusion lock.

use std::fmt;

/// Scoped lock guard.
///
/// Unlocks when dropped, whatever path leaves the scope. The guard is not
/// `Send`, so the lock is always released by the thread that took it.
/// [`MutexGuard::unlocked`] releases it for the duration of a closure.
pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

/// A mutex protecting a value of type `T`.
///
/// Locking twice from the same thread deadlocks; there is no recursion count.
/// Unlike `std::sync::Mutex` there is no poisoning: a panic while the lock is
/// held simply releases it.
pub struct Mutex<T: ?Sized> {
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex. Usable in `static` initializers.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            inner: parking_lot::const_mutex(value),
        }
    }

    /// Consumes the mutex, returning the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Blocks until the lock is acquired.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Acquires the lock only if it is free right now.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Mutable access without locking; the borrow checker proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}
