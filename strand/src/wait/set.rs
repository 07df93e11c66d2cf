//! The wait set: block until any registered waitable is ready.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustix::io::Errno;

use super::backend::{Backend, Multiplexer};
use super::registry::{Key, Registry};
use super::{Ready, Waitable, same_waitable};
use crate::sync::Timeout;
use crate::trace::trace;

/// Errors returned by [`WaitSet`] operations.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("wait set is full ({capacity} entries)")]
    Full { capacity: usize },

    #[error("waitable is already registered with a wait set")]
    AlreadyRegistered,

    #[error("waitable is not registered with this wait set")]
    NotRegistered,
}

fn os(op: &'static str) -> impl FnOnce(Errno) -> WaitError {
    move |source| WaitError::Os { op, source }
}

/// A fixed-capacity set of [`Waitable`]s with a blocking wait.
///
/// The set holds an `Arc` to each registered object, so a waitable stays alive
/// at least until it is removed. Dropping the set releases every registration.
pub struct WaitSet {
    registry: Registry<Arc<dyn Waitable>>,
    backend: Backend,
    events: Vec<(u64, Ready)>,
}

impl WaitSet {
    /// Creates an empty set able to hold `capacity` waitables.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Os`] if the OS multiplexer cannot be created.
    pub fn new(capacity: NonZeroUsize) -> Result<Self, WaitError> {
        let backend = Backend::new(capacity.get()).map_err(os("create"))?;
        Ok(Self {
            registry: Registry::with_capacity(capacity),
            backend,
            events: Vec::with_capacity(capacity.get()),
        })
    }

    /// Most waitables the set can hold.
    pub fn capacity(&self) -> usize {
        self.registry.capacity()
    }

    /// Number of registered waitables.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    /// Registers `waitable` for the readiness kinds in `interest`.
    ///
    /// # Errors
    ///
    /// [`WaitError::AlreadyRegistered`] if it is in a set already,
    /// [`WaitError::Full`] at capacity, [`WaitError::Os`] if the OS refuses.
    pub fn add(&mut self, waitable: Arc<dyn Waitable>, interest: Ready) -> Result<(), WaitError> {
        let state = waitable.waitable_state();
        if !state.claim() {
            return Err(WaitError::AlreadyRegistered);
        }
        let key = match self.registry.insert(Arc::clone(&waitable)) {
            Ok(key) => key,
            Err(_) => {
                state.release();
                return Err(WaitError::Full {
                    capacity: self.capacity(),
                });
            }
        };
        if let Err(source) = self
            .backend
            .register(waitable.wait_handle(), key.raw(), interest)
        {
            self.registry.remove(key);
            state.release();
            return Err(WaitError::Os { op: "add", source });
        }
        state.bind(key.raw(), interest);
        trace!(key = key.raw(), ?interest, len = self.len(), "waitable added");
        Ok(())
    }

    /// Changes the readiness kinds `waitable` is watched for.
    ///
    /// # Errors
    ///
    /// [`WaitError::NotRegistered`] if it is not in this set.
    pub fn modify(&mut self, waitable: &dyn Waitable, interest: Ready) -> Result<(), WaitError> {
        let key = self.key_of(waitable)?;
        self.backend
            .reregister(waitable.wait_handle(), key.raw(), interest)
            .map_err(os("modify"))?;
        waitable.waitable_state().set_interest(interest);
        trace!(key = key.raw(), ?interest, "waitable modified");
        Ok(())
    }

    /// Unregisters `waitable`, returning the set's handle to it.
    ///
    /// # Errors
    ///
    /// [`WaitError::NotRegistered`] if it is not in this set,
    /// [`WaitError::Os`] if the OS refuses, in which case it stays registered.
    pub fn remove(&mut self, waitable: &dyn Waitable) -> Result<Arc<dyn Waitable>, WaitError> {
        let key = self.key_of(waitable)?;
        self.backend
            .deregister(waitable.wait_handle(), key.raw())
            .map_err(os("remove"))?;
        let Some(entry) = self.registry.remove(key) else {
            return Err(WaitError::NotRegistered);
        };
        entry.waitable_state().release();
        trace!(key = key.raw(), len = self.len(), "waitable removed");
        Ok(entry)
    }

    fn key_of(&self, waitable: &dyn Waitable) -> Result<Key, WaitError> {
        let state = waitable.waitable_state();
        if !state.is_registered() {
            return Err(WaitError::NotRegistered);
        }
        let key = Key::from_raw(state.key());
        match self.registry.get(key) {
            Some(entry) if same_waitable(entry.as_ref(), waitable) => Ok(key),
            _ => Err(WaitError::NotRegistered),
        }
    }

    /// Blocks until at least one waitable is ready or `timeout` elapses.
    ///
    /// Returns the triggered waitables, each with its readiness flags updated.
    /// An empty result means the full timeout passed with nothing ready.
    ///
    /// # Errors
    ///
    /// [`WaitError::Os`] on a multiplexer failure other than an interrupt.
    pub fn wait(&mut self, timeout: impl Into<Timeout>) -> Result<Vec<Arc<dyn Waitable>>, WaitError> {
        let mut triggered = Vec::new();
        self.wait_into(timeout, &mut triggered)?;
        Ok(triggered)
    }

    /// Like [`wait`](Self::wait) but appends to `out`, returning how many
    /// waitables were added.
    ///
    /// # Errors
    ///
    /// [`WaitError::Os`] on a multiplexer failure other than an interrupt.
    pub fn wait_into(
        &mut self,
        timeout: impl Into<Timeout>,
        out: &mut Vec<Arc<dyn Waitable>>,
    ) -> Result<usize, WaitError> {
        let deadline = match timeout.into() {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Instant::now().checked_add(d),
        };
        let before = out.len();
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            self.events.clear();
            match self.backend.poll(remaining, &mut self.events) {
                Ok(()) => {}
                Err(Errno::INTR) => {
                    trace!("wait interrupted, retrying");
                    continue;
                }
                Err(source) => return Err(WaitError::Os { op: "wait", source }),
            }

            for &(raw, ready) in &self.events {
                // Stale keys belong to entries removed since the kernel queued
                // the event.
                if let Some(entry) = self.registry.get(Key::from_raw(raw)) {
                    entry.note_ready(ready);
                    out.push(Arc::clone(entry));
                }
            }

            let triggered = out.len() - before;
            if triggered > 0 || remaining.is_some_and(|r| r == Duration::ZERO) {
                return Ok(triggered);
            }
            if let Some(d) = deadline
                && Instant::now() >= d
            {
                return Ok(0);
            }
        }
    }
}

impl Drop for WaitSet {
    fn drop(&mut self) {
        // The multiplexer closes with the set; only the claims need releasing.
        for entry in self.registry.values() {
            entry.waitable_state().release();
        }
    }
}
