//! Units of work carried by a [`Queue`](super::Queue).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A message handled on the receiving thread.
///
/// Closures are messages too: any `FnOnce() + Send + 'static` can be pushed.
pub trait Message: Send {
    fn handle(self: Box<Self>);
}

impl<F: FnOnce() + Send> Message for F {
    fn handle(self: Box<Self>) {
        (*self)();
    }
}

/// Does nothing. Useful for waking a blocked receiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopMessage;

impl Message for NopMessage {
    fn handle(self: Box<Self>) {}
}

/// Raises the quit flag of the message thread it was built for.
#[derive(Debug)]
pub struct QuitMessage {
    flag: Arc<AtomicBool>,
}

impl QuitMessage {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }
}

impl Message for QuitMessage {
    fn handle(self: Box<Self>) {
        self.flag.store(true, Ordering::Release);
    }
}
