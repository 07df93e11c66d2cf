//! `epoll(7)` backend.

use std::os::fd::{BorrowedFd, OwnedFd};
use std::time::Duration;

use rustix::buffer::spare_capacity;
use rustix::event::epoll::{self, CreateFlags, Event, EventData, EventFlags};
use rustix::io::Errno;

use super::{Multiplexer, timespec};
use crate::wait::Ready;

pub(crate) struct Epoll {
    fd: OwnedFd,
    events: Vec<Event>,
}

fn flags_for(interest: Ready) -> EventFlags {
    let mut flags = EventFlags::ERR;
    if interest.contains(Ready::READ) {
        flags |= EventFlags::IN | EventFlags::PRI;
    }
    if interest.contains(Ready::WRITE) {
        flags |= EventFlags::OUT;
    }
    flags
}

fn ready_from(flags: EventFlags) -> Ready {
    let mut ready = Ready::NONE;
    if flags.intersects(EventFlags::IN | EventFlags::PRI | EventFlags::ERR | EventFlags::HUP) {
        ready |= Ready::READ;
    }
    if flags.contains(EventFlags::OUT) {
        ready |= Ready::WRITE;
    }
    ready
}

impl Multiplexer for Epoll {
    fn new(capacity: usize) -> Result<Self, Errno> {
        Ok(Self {
            fd: epoll::create(CreateFlags::CLOEXEC)?,
            events: Vec::with_capacity(capacity.max(1)),
        })
    }

    fn register(&mut self, fd: BorrowedFd<'_>, key: u64, interest: Ready) -> Result<(), Errno> {
        epoll::add(&self.fd, fd, EventData::new_u64(key), flags_for(interest))
    }

    fn reregister(&mut self, fd: BorrowedFd<'_>, key: u64, interest: Ready) -> Result<(), Errno> {
        epoll::modify(&self.fd, fd, EventData::new_u64(key), flags_for(interest))
    }

    fn deregister(&mut self, fd: BorrowedFd<'_>, _key: u64) -> Result<(), Errno> {
        epoll::delete(&self.fd, fd)
    }

    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<(u64, Ready)>) -> Result<(), Errno> {
        self.events.clear();
        let timeout = timeout.map(timespec);
        epoll::wait(&self.fd, spare_capacity(&mut self.events), timeout.as_ref())?;
        out.extend(
            self.events
                .iter()
                .map(|event| (event.data.u64(), ready_from(event.flags))),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_maps_to_level_triggered_flags() {
        let read = flags_for(Ready::READ);
        assert!(read.contains(EventFlags::IN | EventFlags::PRI | EventFlags::ERR));
        assert!(!read.contains(EventFlags::OUT));
        assert!(!read.contains(EventFlags::ET));
        assert!(flags_for(Ready::WRITE).contains(EventFlags::OUT | EventFlags::ERR));
    }

    #[test]
    fn errors_and_hangups_read_as_readable() {
        assert_eq!(ready_from(EventFlags::ERR), Ready::READ);
        assert_eq!(ready_from(EventFlags::HUP | EventFlags::OUT), Ready::READ_AND_WRITE);
        assert_eq!(ready_from(EventFlags::OUT), Ready::WRITE);
    }
}
