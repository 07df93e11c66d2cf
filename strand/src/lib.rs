//! Concurrency and object-lifetime runtime.
//!
//! The crate is organised leaves-first:
//!
//! - [`pool`]: fixed-size chunk arena for small, frequently recycled objects.
//! - [`refs`]: counted strong/weak handles whose counting blocks live in a pool.
//! - [`sync`]: mutex, semaphore and condition variables.
//! - [`thread`]: joinable threads, the message [`Queue`](thread::Queue) and
//!   threads that own one.
//! - [`wait`]: the [`Waitable`](wait::Waitable) capability and the
//!   [`WaitSet`](wait::WaitSet) readiness multiplexer.
//! - [`timer`]: a scheduler thread firing callback timers on a wrapping
//!   millisecond tick counter.
//! - [`net`]: a UDP socket that plugs into a wait set.

#[cfg(not(unix))]
compile_error!("strand only has readiness backends for unix targets");

pub mod net;
pub mod pool;
pub mod refs;
pub mod sync;
pub mod thread;
pub mod timer;
pub mod wait;

mod trace;

pub use trace::init_tracing;
