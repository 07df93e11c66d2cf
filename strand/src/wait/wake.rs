//! Level-style wake descriptor: readable while set, drained when cleared.
//!
//! An `eventfd` on Linux, a non-blocking pipe elsewhere.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use rustix::io::Errno;

#[cfg(target_os = "linux")]
pub(crate) struct WakeHandle {
    fd: OwnedFd,
}

#[cfg(target_os = "linux")]
impl WakeHandle {
    pub(crate) fn new() -> Result<Self, Errno> {
        use rustix::event::{EventfdFlags, eventfd};

        let fd = eventfd(0, EventfdFlags::CLOEXEC | EventfdFlags::NONBLOCK)?;
        Ok(Self { fd })
    }

    /// Makes the descriptor readable.
    pub(crate) fn set(&self) -> Result<(), Errno> {
        match rustix::io::write(&self.fd, &1u64.to_ne_bytes()) {
            Ok(_) => Ok(()),
            // Counter saturated: already readable.
            Err(Errno::AGAIN) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drains the descriptor so it is no longer readable.
    pub(crate) fn clear(&self) -> Result<(), Errno> {
        let mut buf = [0u8; 8];
        match rustix::io::read(&self.fd, &mut buf[..]) {
            Ok(_) | Err(Errno::AGAIN) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) struct WakeHandle {
    reader: OwnedFd,
    writer: OwnedFd,
}

#[cfg(not(target_os = "linux"))]
impl WakeHandle {
    pub(crate) fn new() -> Result<Self, Errno> {
        use rustix::io::{FdFlags, fcntl_setfd, ioctl_fionbio};

        let (reader, writer) = rustix::pipe::pipe()?;
        for fd in [&reader, &writer] {
            ioctl_fionbio(fd, true)?;
            fcntl_setfd(fd, FdFlags::CLOEXEC)?;
        }
        Ok(Self { reader, writer })
    }

    pub(crate) fn set(&self) -> Result<(), Errno> {
        match rustix::io::write(&self.writer, &[1u8]) {
            Ok(_) | Err(Errno::AGAIN) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn clear(&self) -> Result<(), Errno> {
        let mut buf = [0u8; 64];
        loop {
            match rustix::io::read(&self.reader, &mut buf[..]) {
                Ok(0) | Err(Errno::AGAIN) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    }

    pub(crate) fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}
