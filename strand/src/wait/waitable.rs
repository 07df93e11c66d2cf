//! The readiness capability shared by queues, sockets and any other
//! descriptor-backed source.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::os::fd::BorrowedFd;

/// Readiness bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ready(u8);

impl Ready {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(0b01);
    pub const WRITE: Self = Self(0b10);
    pub const READ_AND_WRITE: Self = Self(0b11);

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::READ_AND_WRITE.0)
    }
}

impl BitOr for Ready {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Ready {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Ready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Self::READ), self.contains(Self::WRITE)) {
            (false, false) => f.write_str("NONE"),
            (true, false) => f.write_str("READ"),
            (false, true) => f.write_str("WRITE"),
            (true, true) => f.write_str("READ | WRITE"),
        }
    }
}

/// Per-object bookkeeping every [`Waitable`] embeds.
///
/// Holds the claim taken by the wait set the object is registered with, the
/// interest it was registered for, the sticky readiness flags, and an opaque
/// user tag.
#[derive(Default)]
pub struct WaitableState {
    registered: AtomicBool,
    interest: AtomicU8,
    ready: AtomicU8,
    key: AtomicU64,
    user_data: AtomicU64,
}

impl WaitableState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            interest: AtomicU8::new(0),
            ready: AtomicU8::new(0),
            key: AtomicU64::new(0),
            user_data: AtomicU64::new(0),
        }
    }

    /// Readiness flags observed so far. They stay set until cleared.
    pub fn ready(&self) -> Ready {
        Ready::from_bits_truncate(self.ready.load(Ordering::Acquire))
    }

    pub fn set_ready(&self, ready: Ready) {
        self.ready.fetch_or(ready.bits(), Ordering::AcqRel);
    }

    pub fn clear_ready(&self, ready: Ready) {
        self.ready.fetch_and(!ready.bits(), Ordering::AcqRel);
    }

    /// Interest the owning wait set registered, `NONE` when unregistered.
    pub fn interest(&self) -> Ready {
        Ready::from_bits_truncate(self.interest.load(Ordering::Acquire))
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn user_data(&self) -> u64 {
        self.user_data.load(Ordering::Relaxed)
    }

    pub fn set_user_data(&self, data: u64) {
        self.user_data.store(data, Ordering::Relaxed);
    }

    /// Takes the registration claim. Fails if another set already holds it.
    pub(crate) fn claim(&self) -> bool {
        self.registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn bind(&self, key: u64, interest: Ready) {
        self.key.store(key, Ordering::Release);
        self.set_interest(interest);
    }

    pub(crate) fn set_interest(&self, interest: Ready) {
        self.interest.store(interest.bits(), Ordering::Release);
    }

    pub(crate) fn key(&self) -> u64 {
        self.key.load(Ordering::Acquire)
    }

    pub(crate) fn release(&self) {
        self.interest.store(0, Ordering::Release);
        self.registered.store(false, Ordering::Release);
    }
}

/// An object a [`WaitSet`](super::WaitSet) can wait on.
///
/// Implementors expose a pollable descriptor and embed a [`WaitableState`].
/// Readiness flags are set by the wait set when the descriptor triggers,
/// through [`note_ready`](Self::note_ready). Implementors that keep the flags
/// in step with their own contents (such as [`Queue`](crate::thread::Queue))
/// override it.
pub trait Waitable: Send + Sync {
    fn wait_handle(&self) -> BorrowedFd<'_>;

    fn waitable_state(&self) -> &WaitableState;

    /// Records readiness the wait set observed on the descriptor.
    fn note_ready(&self, ready: Ready) {
        self.waitable_state().set_ready(ready);
    }

    fn can_read(&self) -> bool {
        self.waitable_state().ready().contains(Ready::READ)
    }

    fn can_write(&self) -> bool {
        self.waitable_state().ready().contains(Ready::WRITE)
    }

    fn clear_can_read(&self) {
        self.waitable_state().clear_ready(Ready::READ);
    }

    fn clear_can_write(&self) {
        self.waitable_state().clear_ready(Ready::WRITE);
    }

    fn clear_ready(&self) {
        self.waitable_state().clear_ready(Ready::READ_AND_WRITE);
    }

    fn user_data(&self) -> u64 {
        self.waitable_state().user_data()
    }

    fn set_user_data(&self, data: u64) {
        self.waitable_state().set_user_data(data);
    }
}

/// Identity comparison for waitables.
pub fn same_waitable(a: &dyn Waitable, b: &dyn Waitable) -> bool {
    core::ptr::from_ref(a).cast::<()>() == core::ptr::from_ref(b).cast::<()>()
}
