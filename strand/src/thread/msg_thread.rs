//! A thread that owns a message queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    Message, NopMessage, Queue, QueueError, QuitMessage, Thread, ThreadConfig, ThreadError,
    ThreadState,
};
use crate::trace::{debug, error};

struct Shared {
    queue: Arc<Queue>,
    quit: Arc<AtomicBool>,
}

/// A [`Thread`] paired with a [`Queue`] other threads post work to.
///
/// The body receives a [`MsgContext`] and typically runs
/// [`MsgContext::run_message_loop`], which handles messages in order until a
/// [`QuitMessage`] is handled.
pub struct MsgThread {
    thread: Thread,
    shared: Arc<Shared>,
}

impl MsgThread {
    /// # Errors
    ///
    /// [`QueueError::Wake`] if the queue cannot be created.
    pub fn new() -> Result<Self, QueueError> {
        Self::with_config(ThreadConfig::default())
    }

    /// # Errors
    ///
    /// [`QueueError::Wake`] if the queue cannot be created.
    pub fn with_config(config: ThreadConfig) -> Result<Self, QueueError> {
        Ok(Self {
            thread: Thread::with_config(config),
            shared: Arc::new(Shared {
                queue: Arc::new(Queue::new()?),
                quit: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    /// Spawns the thread running `body`.
    ///
    /// # Errors
    ///
    /// As for [`Thread::start`].
    pub fn start<F>(&self, body: F) -> Result<(), ThreadError>
    where
        F: FnOnce(MsgContext) + Send + 'static,
    {
        let ctx = MsgContext {
            shared: Arc::clone(&self.shared),
        };
        self.thread.start(move || body(ctx))
    }

    /// Spawns the thread running the plain message loop.
    ///
    /// # Errors
    ///
    /// As for [`Thread::start`].
    pub fn start_message_loop(&self) -> Result<(), ThreadError> {
        self.start(|ctx| {
            if let Err(e) = ctx.run_message_loop() {
                error!(error = %e, "message loop aborted");
            }
        })
    }

    /// Posts `msg` to the thread's queue.
    ///
    /// # Errors
    ///
    /// As for [`Queue::push`].
    pub fn push_message<M: Message + 'static>(&self, msg: M) -> Result<(), QueueError> {
        self.shared.queue.push(msg)
    }

    /// Posts a message that ends the message loop once handled.
    ///
    /// # Errors
    ///
    /// As for [`Queue::push`].
    pub fn push_quit(&self) -> Result<(), QueueError> {
        self.shared
            .queue
            .push(QuitMessage::new(Arc::clone(&self.shared.quit)))
    }

    /// Posts a message that does nothing, waking the thread.
    ///
    /// # Errors
    ///
    /// As for [`Queue::push`].
    pub fn push_nop(&self) -> Result<(), QueueError> {
        self.shared.queue.push(NopMessage)
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.shared.queue
    }

    /// # Errors
    ///
    /// As for [`Thread::join`].
    pub fn join(&self) -> Result<(), ThreadError> {
        self.thread.join()
    }

    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }
}

/// Handle given to a [`MsgThread`] body.
pub struct MsgContext {
    shared: Arc<Shared>,
}

impl MsgContext {
    pub fn queue(&self) -> &Arc<Queue> {
        &self.shared.queue
    }

    /// Whether a [`QuitMessage`] has been handled.
    pub fn quit_requested(&self) -> bool {
        self.shared.quit.load(Ordering::Acquire)
    }

    /// Handles messages in FIFO order until a quit message is handled.
    ///
    /// # Errors
    ///
    /// Propagates queue failures.
    pub fn run_message_loop(&self) -> Result<(), QueueError> {
        debug!("message loop running");
        while !self.quit_requested() {
            self.shared.queue.pop_blocking()?.handle();
        }
        debug!("message loop quit");
        Ok(())
    }
}
