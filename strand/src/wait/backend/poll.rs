//! `poll(2)` backend for Unix systems without epoll.

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

use rustix::event::{PollFd, PollFlags};
use rustix::io::Errno;

use super::{Multiplexer, timespec};
use crate::wait::Ready;

struct Registration {
    fd: RawFd,
    key: u64,
    flags: PollFlags,
}

pub(crate) struct Poll {
    registrations: Vec<Registration>,
}

fn flags_for(interest: Ready) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.contains(Ready::READ) {
        flags |= PollFlags::IN | PollFlags::PRI;
    }
    if interest.contains(Ready::WRITE) {
        flags |= PollFlags::OUT;
    }
    flags
}

fn ready_from(flags: PollFlags) -> Ready {
    let mut ready = Ready::NONE;
    if flags.intersects(PollFlags::IN | PollFlags::PRI | PollFlags::ERR | PollFlags::HUP) {
        ready |= Ready::READ;
    }
    if flags.contains(PollFlags::OUT) {
        ready |= Ready::WRITE;
    }
    ready
}

impl Multiplexer for Poll {
    fn new(capacity: usize) -> Result<Self, Errno> {
        Ok(Self {
            registrations: Vec::with_capacity(capacity),
        })
    }

    fn register(&mut self, fd: BorrowedFd<'_>, key: u64, interest: Ready) -> Result<(), Errno> {
        self.registrations.push(Registration {
            fd: fd.as_raw_fd(),
            key,
            flags: flags_for(interest),
        });
        Ok(())
    }

    fn reregister(&mut self, _fd: BorrowedFd<'_>, key: u64, interest: Ready) -> Result<(), Errno> {
        let reg = self
            .registrations
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or(Errno::NOENT)?;
        reg.flags = flags_for(interest);
        Ok(())
    }

    fn deregister(&mut self, _fd: BorrowedFd<'_>, key: u64) -> Result<(), Errno> {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.key != key);
        if self.registrations.len() == before {
            return Err(Errno::NOENT);
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<(u64, Ready)>) -> Result<(), Errno> {
        let mut fds: Vec<PollFd<'_>> = self
            .registrations
            .iter()
            .map(|r| {
                // SAFETY: the wait set holds an `Arc` to every registered
                // waitable, keeping its descriptor open until deregistered.
                let fd = unsafe { BorrowedFd::borrow_raw(r.fd) };
                PollFd::from_borrowed_fd(fd, r.flags)
            })
            .collect();
        let timeout = timeout.map(timespec);
        rustix::event::poll(&mut fds, timeout.as_ref())?;
        out.extend(
            fds.iter()
                .zip(&self.registrations)
                .filter(|(fd, _)| !fd.revents().is_empty())
                .map(|(fd, r)| (r.key, ready_from(fd.revents()))),
        );
        Ok(())
    }
}
