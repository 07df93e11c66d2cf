//! The timer thread and its handles.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::list::TimerList;
use super::ticks::{MonotonicTicks, TickSource};
use crate::sync::{Mutex, MutexGuard, Semaphore, Timeout};
use crate::thread::{Thread, ThreadConfig, ThreadError, ThreadState};
use crate::trace::{debug, error, info, warn};

/// Timer expiry callback.
///
/// Returns the number of milliseconds until the timer should fire again, or
/// `0` to leave it stopped. Closures returning `u32` implement it.
pub trait OnExpire: Send {
    fn on_expire(&mut self) -> u32;
}

impl<F: FnMut() -> u32 + Send> OnExpire for F {
    fn on_expire(&mut self) -> u32 {
        self()
    }
}

/// Timer scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("timer scheduler has shut down")]
    Stopped,

    #[error("timer thread: {0}")]
    Thread(#[from] ThreadError),
}

/// Scheduler setup.
pub struct SchedulerConfig {
    pub thread: ThreadConfig,
    pub clock: Arc<dyn TickSource>,
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_thread(mut self, thread: ThreadConfig) -> Self {
        self.thread = thread;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TickSource>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread: ThreadConfig::new().with_name("strand-timer"),
            clock: Arc::new(MonotonicTicks::new()),
        }
    }
}

struct TimerCore {
    /// Bumped by every start and stop; a fired timer is only re-armed by its
    /// callback if nobody touched it meanwhile.
    epoch: AtomicU64,
    callback: Mutex<Box<dyn OnExpire>>,
}

struct Armed {
    core: Arc<TimerCore>,
    epoch: u64,
}

/// Ticks to arm for a `timeout_ms` requested now.
///
/// A tick read truncates, so up to a whole tick may already have passed since
/// the one returned. Counting from the next tick keeps expiry at or after the
/// requested time.
fn arm_ticks(timeout_ms: u32) -> u32 {
    timeout_ms.saturating_add(1)
}

struct SchedState {
    timers: TimerList<Armed>,
    quit: bool,
}

struct Shared {
    state: Mutex<SchedState>,
    wake: Semaphore,
    clock: Arc<dyn TickSource>,
}

/// Owner of the timer thread.
///
/// Create one with [`init`](Self::init), hand out [`Timer`]s with
/// [`timer`](Self::timer), and [`shutdown`](Self::shutdown) when done (dropping
/// the scheduler also shuts it down). Callbacks run on the timer thread, one
/// at a time, without any scheduler lock held.
pub struct TimerScheduler {
    shared: Arc<Shared>,
    thread: Thread,
}

impl TimerScheduler {
    /// Spawns the timer thread.
    ///
    /// # Errors
    ///
    /// [`TimerError::Thread`] if the thread cannot be spawned.
    pub fn init(config: SchedulerConfig) -> Result<Self, TimerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedState {
                timers: TimerList::new(),
                quit: false,
            }),
            wake: Semaphore::new(0),
            clock: config.clock,
        });
        let thread = Thread::with_config(config.thread);
        let worker = Arc::clone(&shared);
        thread.start(move || run(&worker))?;
        info!("timer scheduler started");
        Ok(Self { shared, thread })
    }

    /// Creates a stopped timer that runs `callback` on expiry.
    pub fn timer<C: OnExpire + 'static>(&self, callback: C) -> Timer {
        Timer {
            core: Arc::new(TimerCore {
                epoch: AtomicU64::new(0),
                callback: Mutex::new(Box::new(callback)),
            }),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of armed timers.
    pub fn active_timers(&self) -> usize {
        self.shared.state.lock().timers.len()
    }

    /// Current tick count of the scheduler's clock.
    pub fn now(&self) -> u32 {
        self.shared.clock.ticks()
    }

    /// Stops the timer thread and disarms every timer.
    ///
    /// Idempotent. Afterwards [`Timer::start`] fails with
    /// [`TimerError::Stopped`].
    ///
    /// # Errors
    ///
    /// [`TimerError::Thread`] if the timer thread panicked.
    pub fn shutdown(&self) -> Result<(), TimerError> {
        if self.thread.state() == ThreadState::Joined {
            return Ok(());
        }
        let pending: Vec<Armed> = {
            let mut state = self.shared.state.lock();
            state.quit = true;
            state.timers.drain().collect()
        };
        if !pending.is_empty() {
            warn!(armed = pending.len(), "timers still armed at shutdown");
        }
        self.shared.wake.signal();
        self.thread.join()?;
        drop(pending);
        info!("timer scheduler shut down");
        Ok(())
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "timer scheduler shutdown failed");
        }
    }
}

/// A restartable one-shot or periodic timer.
///
/// Dropping a timer stops it.
pub struct Timer {
    core: Arc<TimerCore>,
    shared: Arc<Shared>,
}

impl Timer {
    /// Arms the timer to fire `timeout_ms` milliseconds from now. A running
    /// timer is restarted.
    ///
    /// # Errors
    ///
    /// [`TimerError::Stopped`] once the scheduler has shut down.
    pub fn start(&self, timeout_ms: u32) -> Result<(), TimerError> {
        let mut state = self.shared.state.lock();
        if state.quit {
            return Err(TimerError::Stopped);
        }
        let epoch = self.core.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        state.timers.remove(|armed| Arc::ptr_eq(&armed.core, &self.core));
        let now = self.shared.clock.ticks();
        state.timers.insert(
            now,
            arm_ticks(timeout_ms),
            Armed {
                core: Arc::clone(&self.core),
                epoch,
            },
        );
        drop(state);
        self.shared.wake.signal();
        Ok(())
    }

    /// Disarms the timer. Returns whether it was armed.
    ///
    /// Stopping a timer whose callback is running returns `false` and keeps
    /// the callback from re-arming it.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.state.lock();
        self.core.epoch.fetch_add(1, Ordering::Relaxed);
        state
            .timers
            .remove(|armed| Arc::ptr_eq(&armed.core, &self.core))
            .is_some()
    }

    /// Whether the timer is armed.
    pub fn is_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .timers
            .contains(|armed| Arc::ptr_eq(&armed.core, &self.core))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared) {
    let mut due = Vec::new();
    let mut rearm = Vec::new();
    let mut state = shared.state.lock();
    while !state.quit {
        let now = shared.clock.ticks();
        if state.timers.take_due(now, &mut due) {
            debug!(now, "tick counter wrapped");
        }

        if !due.is_empty() {
            MutexGuard::unlocked(&mut state, || {
                for armed in due.drain(..) {
                    let next = fire(&armed);
                    if next != 0 {
                        rearm.push((armed, next));
                    }
                }
            });
            let now = shared.clock.ticks();
            for (armed, next) in rearm.drain(..) {
                // Started or stopped while the callback ran.
                if armed.core.epoch.load(Ordering::Relaxed) != armed.epoch || state.quit {
                    continue;
                }
                state.timers.insert(now, arm_ticks(next), armed);
            }
            continue;
        }

        let timeout = match state.timers.sleep_bound(now) {
            Some(ticks) => Timeout::from_millis(u64::from(ticks)),
            None => Timeout::Infinite,
        };
        MutexGuard::unlocked(&mut state, || {
            shared.wake.wait(timeout);
            // Collapse wake-ups from a burst of starts into one pass.
            while shared.wake.try_wait() {}
        });
    }
    debug!("timer thread exiting");
}

fn fire(armed: &Armed) -> u32 {
    let mut callback = armed.core.callback.lock();
    match panic::catch_unwind(AssertUnwindSafe(|| callback.on_expire())) {
        Ok(next) => next,
        Err(_) => {
            error!("timer callback panicked; timer stopped");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Clock that only moves when told to.
    struct ManualClock(AtomicU32);

    impl TickSource for ManualClock {
        fn ticks(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn manual(start: u32) -> (TimerScheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock(AtomicU32::new(start)));
        let config = SchedulerConfig::default().with_clock(Arc::clone(&clock) as Arc<dyn TickSource>);
        (TimerScheduler::init(config).unwrap(), clock)
    }

    fn eventually(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn fires_once_clock_passes_end() {
        let (sched, clock) = manual(100);
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let timer = sched.timer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });
        timer.start(50).unwrap();
        assert!(timer.is_running());

        clock.0.store(149, Ordering::SeqCst);
        timer.start(1).unwrap(); // restart: now due at 151
        clock.0.store(150, Ordering::SeqCst);
        sched.shared.wake.signal();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        clock.0.store(151, Ordering::SeqCst);
        sched.shared.wake.signal();
        assert!(eventually(|| fired.load(Ordering::SeqCst) == 1));
        assert!(!timer.is_running());
        assert!(!timer.stop());
        sched.shutdown().unwrap();
    }

    #[test]
    fn partial_start_tick_is_not_counted() {
        let (sched, clock) = manual(10);
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let timer = sched.timer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });
        // Started late in tick 10: tick 15 can be less than 5 ms away.
        timer.start(5).unwrap();
        clock.0.store(15, Ordering::SeqCst);
        sched.shared.wake.signal();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_running());

        clock.0.store(16, Ordering::SeqCst);
        sched.shared.wake.signal();
        assert!(eventually(|| fired.load(Ordering::SeqCst) == 1));
        sched.shutdown().unwrap();
    }

    #[test]
    fn stop_before_expiry_reports_running() {
        let (sched, _clock) = manual(0);
        let timer = sched.timer(|| 0);
        assert!(!timer.stop());
        timer.start(10).unwrap();
        assert_eq!(sched.active_timers(), 1);
        assert!(timer.stop());
        assert_eq!(sched.active_timers(), 0);
    }

    #[test]
    fn start_after_shutdown_fails() {
        let (sched, _clock) = manual(0);
        let timer = sched.timer(|| 0);
        timer.start(1000).unwrap();
        sched.shutdown().unwrap();
        sched.shutdown().unwrap();
        assert!(matches!(timer.start(1), Err(TimerError::Stopped)));
        assert!(!timer.is_running());
    }

    #[test]
    fn panicking_callback_does_not_kill_thread() {
        let (sched, clock) = manual(0);
        let bad = sched.timer(|| -> u32 { panic!("callback failure") });
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let good = sched.timer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });
        bad.start(0).unwrap();
        clock.0.store(1, Ordering::SeqCst);
        assert!(eventually(|| !bad.is_running()));
        good.start(0).unwrap();
        clock.0.store(2, Ordering::SeqCst);
        assert!(eventually(|| hits.load(Ordering::SeqCst) == 1));
        sched.shutdown().unwrap();
    }
}
