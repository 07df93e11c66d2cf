//! FIFO message queue that can also be waited on.

use std::collections::VecDeque;
use std::os::fd::BorrowedFd;

use rustix::io::Errno;

use super::Message;
use crate::sync::{Mutex, Semaphore, Timeout};
use crate::wait::wake::WakeHandle;
use crate::wait::{Ready, Waitable, WaitableState};

/// Queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("{op} on queue wake handle failed: {source}")]
    Wake {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("queue holds the maximum of {max} messages")]
    Full { max: u32 },
}

/// Multi-producer FIFO of boxed [`Message`]s.
///
/// The queue's descriptor is readable exactly while the queue is non-empty,
/// so a queue can sit in a [`WaitSet`](crate::wait::WaitSet) next to sockets.
/// It only ever reports READ readiness. A counting semaphore mirrors the
/// depth and backs the blocking pop.
///
/// Messages still queued when the queue is dropped are dropped unhandled.
pub struct Queue {
    messages: Mutex<VecDeque<Box<dyn Message>>>,
    depth: Semaphore,
    wake: WakeHandle,
    waitable: WaitableState,
}

impl Queue {
    /// # Errors
    ///
    /// [`QueueError::Wake`] if the wake descriptor cannot be created.
    pub fn new() -> Result<Self, QueueError> {
        let wake = WakeHandle::new().map_err(|source| QueueError::Wake { op: "create", source })?;
        Ok(Self {
            messages: Mutex::new(VecDeque::new()),
            depth: Semaphore::new(0),
            wake,
            waitable: WaitableState::new(),
        })
    }

    /// Appends `msg`.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] at `u32::MAX` pending messages;
    /// [`QueueError::Wake`] if the descriptor cannot be signalled, in which
    /// case nothing was enqueued.
    pub fn push<M: Message + 'static>(&self, msg: M) -> Result<(), QueueError> {
        self.push_boxed(Box::new(msg))
    }

    /// [`push`](Self::push) for an already boxed message.
    ///
    /// # Errors
    ///
    /// As for [`push`](Self::push).
    pub fn push_boxed(&self, msg: Box<dyn Message>) -> Result<(), QueueError> {
        let mut messages = self.messages.lock();
        if messages.len() >= u32::MAX as usize {
            return Err(QueueError::Full { max: u32::MAX });
        }
        if messages.is_empty() {
            self.wake
                .set()
                .map_err(|source| QueueError::Wake { op: "set", source })?;
            self.waitable.set_ready(Ready::READ);
        }
        messages.push_back(msg);
        drop(messages);
        self.depth.signal();
        Ok(())
    }

    /// Removes the oldest message, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// [`QueueError::Wake`] if the descriptor cannot be drained; the message
    /// stays queued.
    pub fn pop_blocking(&self) -> Result<Box<dyn Message>, QueueError> {
        self.depth.wait(Timeout::Infinite);
        self.take_front()
    }

    /// Removes the oldest message if there is one.
    ///
    /// # Errors
    ///
    /// As for [`pop_blocking`](Self::pop_blocking).
    pub fn pop_nonblocking(&self) -> Result<Option<Box<dyn Message>>, QueueError> {
        if !self.depth.try_wait() {
            return Ok(None);
        }
        self.take_front().map(Some)
    }

    /// Pops after a depth permit was taken.
    fn take_front(&self) -> Result<Box<dyn Message>, QueueError> {
        let mut messages = self.messages.lock();
        if messages.len() == 1 {
            if let Err(source) = self.wake.clear() {
                drop(messages);
                self.depth.signal();
                return Err(QueueError::Wake { op: "clear", source });
            }
            self.waitable.clear_ready(Ready::READ);
        }
        let Some(msg) = messages.pop_front() else {
            unreachable!("queue depth permit taken on an empty queue");
        };
        Ok(msg)
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether no message is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Waitable for Queue {
    fn wait_handle(&self) -> BorrowedFd<'_> {
        self.wake.as_fd()
    }

    fn waitable_state(&self) -> &WaitableState {
        &self.waitable
    }

    // READ is set and cleared under the message lock by push and pop. A
    // descriptor event can be stale by the time the wait set reports it.
    fn note_ready(&self, _ready: Ready) {}
}
