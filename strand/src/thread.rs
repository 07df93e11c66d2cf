//! Joinable threads with an explicit lifecycle, plus message queues.
//!
//! A [`Thread`] moves through `New → Running → Stopped → Joined`. Starting is
//! allowed once; joining a thread that never started is a no-op. Every started
//! thread must be joined before it is dropped.

mod message;
mod msg_thread;
mod queue;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self as std_thread, JoinHandle, ThreadId};
use std::time::Duration;

pub use message::{Message, NopMessage, QuitMessage};
pub use msg_thread::{MsgContext, MsgThread};
pub use queue::{Queue, QueueError};

use crate::sync::Mutex;
use crate::trace::{debug, error};

/// Lifecycle position of a [`Thread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Running,
    /// The body has returned (or panicked) but nobody has joined yet.
    Stopped,
    Joined,
}

/// Spawn options.
#[derive(Debug, Clone, Default)]
pub struct ThreadConfig {
    /// OS thread name; shows up in debuggers and log output.
    pub name: Option<String>,
    /// Stack size in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl ThreadConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// Thread lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("thread was already started")]
    AlreadyStarted,

    #[error("thread was already joined")]
    AlreadyJoined,

    #[error("thread body panicked: {0}")]
    Panicked(String),
}

type Outcome = Result<(), String>;

/// A joinable OS thread.
pub struct Thread {
    config: ThreadConfig,
    state: Arc<Mutex<ThreadState>>,
    handle: Mutex<Option<JoinHandle<Outcome>>>,
}

impl Thread {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ThreadConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ThreadConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ThreadState::New)),
            handle: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Name given in the config, if any.
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// Spawns the OS thread running `body`.
    ///
    /// # Errors
    ///
    /// [`ThreadError::AlreadyStarted`] unless the thread is `New`;
    /// [`ThreadError::Spawn`] if the OS refuses, leaving it `New`.
    pub fn start<F>(&self, body: F) -> Result<(), ThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut handle = self.handle.lock();
        let mut state = self.state.lock();
        if *state != ThreadState::New {
            return Err(ThreadError::AlreadyStarted);
        }

        let mut builder = std_thread::Builder::new();
        if let Some(name) = &self.config.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let shared = Arc::clone(&self.state);
        let spawned = builder
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(body)).map_err(panic_message);
                if let Err(msg) = &outcome {
                    error!(panic = %msg, "thread body panicked");
                }
                *shared.lock() = ThreadState::Stopped;
                debug!("thread stopped");
                outcome
            })
            .map_err(ThreadError::Spawn)?;

        // Still holding `state`, so the body cannot mark itself stopped first.
        *state = ThreadState::Running;
        *handle = Some(spawned);
        debug!(name = ?self.config.name, "thread started");
        Ok(())
    }

    /// Waits for the body to finish.
    ///
    /// A no-op on a thread that was never started.
    ///
    /// # Errors
    ///
    /// [`ThreadError::AlreadyJoined`] on a second join;
    /// [`ThreadError::Panicked`] if the body panicked.
    pub fn join(&self) -> Result<(), ThreadError> {
        let mut handle = self.handle.lock();
        match *self.state.lock() {
            ThreadState::New => return Ok(()),
            ThreadState::Joined => return Err(ThreadError::AlreadyJoined),
            ThreadState::Running | ThreadState::Stopped => {}
        }
        let Some(joining) = handle.take() else {
            return Err(ThreadError::AlreadyJoined);
        };
        debug_assert_ne!(
            joining.thread().id(),
            std_thread::current().id(),
            "thread joined from itself"
        );

        let outcome = joining.join().unwrap_or_else(|payload| Err(panic_message(payload)));
        *self.state.lock() = ThreadState::Joined;
        debug!(name = ?self.config.name, "thread joined");
        outcome.map_err(ThreadError::Panicked)
    }

    /// Suspends the calling thread. A zero duration yields instead.
    pub fn sleep(duration: Duration) {
        if duration.is_zero() {
            std_thread::yield_now();
        } else {
            std_thread::sleep(duration);
        }
    }

    /// Identifier of the calling thread.
    pub fn current_id() -> ThreadId {
        std_thread::current().id()
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if !std_thread::panicking() {
            let state = *self.state.lock();
            debug_assert!(
                matches!(state, ThreadState::New | ThreadState::Joined),
                "thread dropped while {state:?}; join it first"
            );
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn lifecycle_runs_body_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let thread = Thread::with_config(ThreadConfig::new().with_name("lifecycle"));
        assert_eq!(thread.state(), ThreadState::New);
        assert_eq!(thread.name(), Some("lifecycle"));

        let flag = Arc::clone(&ran);
        thread
            .start(move || {
                assert_eq!(std::thread::current().name(), Some("lifecycle"));
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        assert!(matches!(thread.start(|| {}), Err(ThreadError::AlreadyStarted)));

        thread.join().unwrap();
        assert_eq!(thread.state(), ThreadState::Joined);
        assert!(ran.load(Ordering::SeqCst));
        assert!(matches!(thread.join(), Err(ThreadError::AlreadyJoined)));
        assert!(matches!(thread.start(|| {}), Err(ThreadError::AlreadyStarted)));
    }

    #[test]
    fn join_before_start_is_noop() {
        let thread = Thread::new();
        thread.join().unwrap();
        assert_eq!(thread.state(), ThreadState::New);
    }

    #[test]
    fn stopped_after_body_returns() {
        let thread = Thread::new();
        thread.start(|| {}).unwrap();
        while thread.state() != ThreadState::Stopped {
            Thread::sleep(Duration::ZERO);
        }
        thread.join().unwrap();
    }

    #[test]
    fn panic_is_reported_to_joiner() {
        let thread = Thread::new();
        thread.start(|| panic!("boom")).unwrap();
        match thread.join() {
            Err(ThreadError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected join result: {other:?}"),
        }
        assert_eq!(thread.state(), ThreadState::Joined);
    }

    #[test]
    fn stack_size_is_honoured() {
        let thread = Thread::with_config(ThreadConfig::new().with_stack_size(4 * 1024 * 1024));
        thread
            .start(|| {
                let buf = std::hint::black_box([1u8; 512 * 1024]);
                let sum: usize = buf.iter().map(|&b| usize::from(b)).sum();
                assert_eq!(sum, buf.len());
            })
            .unwrap();
        thread.join().unwrap();
    }
}
