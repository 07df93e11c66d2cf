//! Readiness waiting across heterogeneous sources.
//!
//! Anything exposing a pollable descriptor can implement [`Waitable`] and be
//! registered with a [`WaitSet`] for READ and/or WRITE readiness. Waiting is
//! level-triggered: a source stays reported for as long as its condition holds.
//! Linux uses `epoll`; other Unix systems fall back to `poll`.

mod backend;
mod registry;
mod set;
mod waitable;
pub(crate) mod wake;

pub use set::{WaitError, WaitSet};
pub use waitable::{Ready, Waitable, WaitableState, same_waitable};
