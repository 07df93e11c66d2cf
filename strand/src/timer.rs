//! Callback timers driven by one scheduler thread.
//!
//! Time is a wrapping `u32` millisecond tick count (about 49.7 days per
//! period). [`TimerList`] holds the wrap-safe scheduling arithmetic and is pure,
//! so it can be exercised with synthetic tick values; [`TimerScheduler`] runs it
//! on a dedicated thread against a [`TickSource`].

mod list;
mod scheduler;
mod ticks;

pub use list::TimerList;
pub use scheduler::{OnExpire, SchedulerConfig, Timer, TimerError, TimerScheduler};
pub use ticks::{HALF_RANGE, MAX_SLEEP_TICKS, MonotonicTicks, TickSource};
