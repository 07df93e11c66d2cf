//! OS readiness backends.

use std::os::fd::BorrowedFd;
use std::time::Duration;

use rustix::event::Timespec;
use rustix::io::Errno;

use super::Ready;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(not(target_os = "linux"))]
mod poll;

#[cfg(target_os = "linux")]
pub(crate) type Backend = epoll::Epoll;
#[cfg(not(target_os = "linux"))]
pub(crate) type Backend = poll::Poll;

/// Level-triggered readiness multiplexer keyed by opaque `u64` tokens.
pub(crate) trait Multiplexer: Sized {
    fn new(capacity: usize) -> Result<Self, Errno>;

    fn register(&mut self, fd: BorrowedFd<'_>, key: u64, interest: Ready) -> Result<(), Errno>;

    fn reregister(&mut self, fd: BorrowedFd<'_>, key: u64, interest: Ready) -> Result<(), Errno>;

    fn deregister(&mut self, fd: BorrowedFd<'_>, key: u64) -> Result<(), Errno>;

    /// Blocks until at least one source is ready or `timeout` passes (`None`
    /// waits forever), appending `(key, readiness)` pairs to `out`.
    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<(u64, Ready)>) -> Result<(), Errno>;
}

fn timespec(d: Duration) -> Timespec {
    Timespec {
        tv_sec: d.as_secs().try_into().unwrap_or(i64::MAX),
        tv_nsec: d.subsec_nanos().into(),
    }
}
